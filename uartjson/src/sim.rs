// SPDX-License-Identifier: Apache-2.0

//! In-memory stand-ins for the UART peripheral and the tick timer.
//!
//! [`SimUart`] behaves like a data-register UART: one byte in, one byte out,
//! sticky fault flags and interrupt enable bits. [`ManualClock`] is a clock
//! that only moves when told to. Both are `no_std` and are what the tests
//! and the host demo run against.

use core::cell::Cell;

use crate::tick::{Clock, Tick};
use crate::transport::{HwError, LineError, SessionState, Status, Transport, UartHw};

/// Capacity of the captured transmit log.
pub const SENT_LOG_SIZE: usize = 1024;

/// Simulated UART peripheral.
#[derive(Debug)]
pub struct SimUart {
    initialized: bool,
    fail_init: bool,
    tx_irq: bool,
    rx_irq: bool,
    tx_ready: bool,
    rx_data: Option<u8>,
    overrun: bool,
    framing: bool,
    parity: bool,
    noise: bool,
    sent: heapless::Vec<u8, SENT_LOG_SIZE>,
    dropped: usize,
}

impl SimUart {
    pub const fn new() -> Self {
        Self {
            initialized: false,
            fail_init: false,
            tx_irq: false,
            rx_irq: false,
            tx_ready: true,
            rx_data: None,
            overrun: false,
            framing: false,
            parity: false,
            noise: false,
            sent: heapless::Vec::new(),
            dropped: 0,
        }
    }

    /// A peripheral whose bring-up fails.
    pub const fn failing_init() -> Self {
        let mut uart = Self::new();
        uart.fail_init = true;
        uart
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Hold or release the transmit data register.
    pub fn set_tx_ready(&mut self, ready: bool) {
        self.tx_ready = ready;
    }

    /// Latch a byte into the receive data register.
    pub fn inject(&mut self, byte: u8) {
        self.rx_data = Some(byte);
    }

    /// Raise a fault flag together with a pending receive.
    pub fn raise(&mut self, error: LineError) {
        match error {
            LineError::Overrun => self.overrun = true,
            LineError::Framing => self.framing = true,
            LineError::Parity => self.parity = true,
            LineError::Noise => self.noise = true,
        }
        self.rx_data.get_or_insert(0xFF);
    }

    /// Everything written to the transmit data register so far.
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// Hand over the captured output and start a fresh log.
    pub fn take_sent(&mut self) -> heapless::Vec<u8, SENT_LOG_SIZE> {
        core::mem::take(&mut self.sent)
    }

    /// Bytes lost because the log was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Default for SimUart {
    fn default() -> Self {
        Self::new()
    }
}

impl UartHw for SimUart {
    fn init(&mut self) -> Result<(), HwError> {
        if self.fail_init {
            return Err(HwError::NotPresent);
        }
        self.initialized = true;
        self.tx_irq = false;
        self.rx_irq = false;
        Ok(())
    }

    fn status(&self) -> Status {
        Status {
            tx_empty: self.tx_ready,
            rx_not_empty: self.rx_data.is_some(),
            overrun: self.overrun,
            framing: self.framing,
            parity: self.parity,
            noise: self.noise,
        }
    }

    fn write_byte(&mut self, byte: u8) {
        if self.sent.push(byte).is_err() {
            self.dropped += 1;
        }
    }

    fn read_byte(&mut self) -> u8 {
        self.rx_data.take().unwrap_or(0)
    }

    fn set_tx_interrupt(&mut self, enabled: bool) {
        self.tx_irq = enabled;
    }

    fn set_rx_interrupt(&mut self, enabled: bool) {
        self.rx_irq = enabled;
    }

    fn tx_interrupt_enabled(&self) -> bool {
        self.tx_irq
    }

    fn rx_interrupt_enabled(&self) -> bool {
        self.rx_irq
    }

    fn clear_error(&mut self, error: LineError) {
        match error {
            LineError::Overrun => self.overrun = false,
            LineError::Framing => self.framing = false,
            LineError::Parity => self.parity = false,
            LineError::Noise => self.noise = false,
        }
        // The faulty byte goes with its flag.
        self.rx_data = None;
    }
}

/// Drive a transport over [`SimUart`] the way the interrupt controller would.
impl<const RX: usize, const TX: usize> Transport<SimUart, RX, TX> {
    /// Fire the interrupt until the transmit session goes idle. Returns the
    /// number of interrupts taken; gives up after one pass over the buffer if
    /// the data register never frees up.
    pub fn drain_tx(&self) -> usize {
        let mut fired = 0;
        while self.tx_state() == SessionState::Busy && fired <= TX + 1 {
            self.on_interrupt();
            fired += 1;
        }
        fired
    }

    /// Deliver bytes one interrupt at a time while the receive session is
    /// busy. Returns how many bytes were accepted.
    pub fn feed(&self, bytes: &[u8]) -> usize {
        let mut accepted = 0;
        for &byte in bytes {
            if self.rx_state() != SessionState::Busy {
                break;
            }
            self.with_hw(|hw| hw.inject(byte));
            self.on_interrupt();
            accepted += 1;
        }
        accepted
    }

    /// Raise fault flags on the line and take the resulting interrupt.
    pub fn raise(&self, errors: &[LineError]) {
        self.with_hw(|hw| errors.iter().for_each(|&e| hw.raise(e)));
        self.on_interrupt();
    }
}

/// A clock that moves only when told to.
///
/// With a non-zero step every read also advances it, which stands in for the
/// timer interrupt during blocking waits.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Tick>,
    step: Tick,
}

impl ManualClock {
    pub const fn new() -> Self {
        Self {
            now: Cell::new(0),
            step: 0,
        }
    }

    pub const fn auto_advancing(step: Tick) -> Self {
        Self {
            now: Cell::new(0),
            step,
        }
    }

    pub fn set(&self, value: Tick) {
        self.now.set(value);
    }

    pub fn advance(&self, ms: Tick) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Tick {
        let now = self.now.get();
        self.now.set(now.wrapping_add(self.step));
        now
    }
}
