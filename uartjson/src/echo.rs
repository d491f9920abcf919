// SPDX-License-Identifier: Apache-2.0

//! Line echo over the transport.
//!
//! Arms a receive session, waits for it to close, then sends the bytes back.
//! A line fault is acknowledged with [`Transport::reset_error`] and reception
//! carries on. Like the report pipeline, [`Echo::advance`] does a bounded
//! amount of work per call and never waits.

use crate::transport::{
    LineError, SessionState, Transport, TransportError, UartHw, RX_BUFFER_SIZE, TX_BUFFER_SIZE,
};

/// What one call to [`Echo::advance`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoEvent {
    /// Waiting on the receiver or the transmitter.
    Pending,
    /// A receive session was started.
    Armed,
    /// A received line of this many bytes went out.
    Echoed(usize),
    /// The transport refused the line; it is not retried.
    Dropped(TransportError),
    /// A line fault was cleared and reception resumed.
    Recovered(LineError),
}

pub struct Echo<'a, H, const RX: usize = RX_BUFFER_SIZE, const TX: usize = TX_BUFFER_SIZE> {
    uart: &'a Transport<H, RX, TX>,
    line: heapless::Vec<u8, RX>,
    armed: bool,
    echoed: usize,
    recovered: usize,
}

impl<'a, H: UartHw, const RX: usize, const TX: usize> Echo<'a, H, RX, TX> {
    pub fn new(uart: &'a Transport<H, RX, TX>) -> Self {
        Self {
            uart,
            line: heapless::Vec::new(),
            armed: false,
            echoed: 0,
            recovered: 0,
        }
    }

    /// Lines sent back so far.
    pub fn echoed(&self) -> usize {
        self.echoed
    }

    /// Line faults cleared so far.
    pub fn recovered(&self) -> usize {
        self.recovered
    }

    /// Run one step.
    pub fn advance(&mut self) -> EchoEvent {
        match self.uart.rx_state() {
            SessionState::Busy => EchoEvent::Pending,
            SessionState::Error => self.recover(),
            SessionState::Idle if !self.armed => self.arm(),
            SessionState::Idle => self.echo(),
        }
    }

    fn arm(&mut self) -> EchoEvent {
        match self.uart.start_receive() {
            Ok(()) => {
                self.armed = true;
                EchoEvent::Armed
            }
            Err(e) => {
                log::debug!("receive not started: {e}");
                EchoEvent::Pending
            }
        }
    }

    fn recover(&mut self) -> EchoEvent {
        let error = self.uart.last_error();
        self.uart.reset_error();
        match error {
            Some(error) => {
                log::warn!("receive fault: {error}");
                self.recovered += 1;
                EchoEvent::Recovered(error)
            }
            None => EchoEvent::Pending,
        }
    }

    fn echo(&mut self) -> EchoEvent {
        if self.uart.tx_state() != SessionState::Idle {
            return EchoEvent::Pending;
        }

        // Copy out first: the transport lock is held inside `with_received`.
        let line = &mut self.line;
        line.clear();
        self.uart.with_received(|bytes| {
            let _ = line.extend_from_slice(bytes);
        });

        let event = match self.uart.start_transmit(&self.line) {
            Ok(()) => {
                self.echoed += 1;
                EchoEvent::Echoed(self.line.len())
            }
            Err(TransportError::Busy) => return EchoEvent::Pending,
            Err(e) => {
                log::warn!("echo dropped: {e}");
                EchoEvent::Dropped(e)
            }
        };
        self.armed = false;
        event
    }
}
