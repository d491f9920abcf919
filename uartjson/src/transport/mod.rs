// SPDX-License-Identifier: Apache-2.0

//! Interrupt-driven UART sessions.
//!
//! A [`Transport`] owns one transmit and one receive session plus the
//! peripheral itself, all behind a single critical-section mutex. The
//! foreground starts sessions; [`Transport::on_interrupt`] moves bytes and
//! finishes them.
//!
//! ```text
//!            start_*            ISR: done
//!   Idle ─────────────► Busy ─────────────► Idle
//!                        │
//!                        │ ISR: line fault (RX only)
//!                        ▼
//!                      Error ── reset_error ──► Busy
//! ```

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};

mod hw;
pub use hw::{HwError, LineError, Status, UartHw};

/// Default receive buffer size, terminator byte included.
pub const RX_BUFFER_SIZE: usize = 100;
/// Default transmit buffer size.
pub const TX_BUFFER_SIZE: usize = 200;

/// State of one direction of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Busy,
    Error,
}

/// Errors returned to the foreground by the start operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Nothing to transmit.
    EmptyBuffer,
    /// Payload larger than the transmit buffer.
    TooLong,
    /// The session is not idle.
    Busy,
    /// Peripheral bring-up failed.
    Hardware(HwError),
}

impl From<HwError> for TransportError {
    fn from(err: HwError) -> Self {
        TransportError::Hardware(err)
    }
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TransportError::EmptyBuffer => write!(f, "empty buffer"),
            TransportError::TooLong => write!(f, "buffer exceeds transmit capacity"),
            TransportError::Busy => write!(f, "session busy"),
            TransportError::Hardware(e) => write!(f, "hardware: {e}"),
        }
    }
}

/// The foreground half of the transmit path, as seen by the pipeline.
pub trait SerialTx {
    fn tx_state(&self) -> SessionState;
    fn start_transmit(&self, bytes: &[u8]) -> Result<(), TransportError>;
}

impl<T: SerialTx + ?Sized> SerialTx for &T {
    fn tx_state(&self) -> SessionState {
        (**self).tx_state()
    }
    fn start_transmit(&self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).start_transmit(bytes)
    }
}

struct TxSession<const N: usize> {
    state: SessionState,
    buf: heapless::Vec<u8, N>,
    cursor: usize,
}

struct RxSession<const N: usize> {
    state: SessionState,
    buf: [u8; N],
    cursor: usize,
    error: Option<LineError>,
}

impl<const N: usize> RxSession<N> {
    /// Bytes that fit before the terminator slot.
    const LIMIT: usize = N.saturating_sub(1);

    fn terminate(&mut self) {
        if let Some(slot) = self.buf.get_mut(self.cursor) {
            *slot = 0;
        }
    }
}

struct Shared<H, const RX: usize, const TX: usize> {
    hw: H,
    tx: TxSession<TX>,
    rx: RxSession<RX>,
}

impl<H: UartHw, const RX: usize, const TX: usize> Shared<H, RX, TX> {
    fn service_tx(&mut self, status: &Status) {
        let tx = &mut self.tx;
        if tx.state != SessionState::Busy || !self.hw.tx_interrupt_enabled() || !status.tx_empty {
            return;
        }
        match tx.buf.get(tx.cursor) {
            Some(&byte) => {
                self.hw.write_byte(byte);
                tx.cursor += 1;
            }
            None => {
                self.hw.set_tx_interrupt(false);
                tx.buf.clear();
                tx.cursor = 0;
                tx.state = SessionState::Idle;
            }
        }
    }

    fn service_rx(&mut self, status: &Status) {
        let rx = &mut self.rx;
        if rx.state != SessionState::Busy || !self.hw.rx_interrupt_enabled() || !status.rx_not_empty
        {
            return;
        }

        if let Some(error) = status.line_error() {
            self.hw.set_rx_interrupt(false);
            rx.state = SessionState::Error;
            rx.error = Some(error);
            self.hw.clear_error(error);
            return;
        }

        let byte = self.hw.read_byte();
        let limit = RxSession::<RX>::LIMIT;
        if rx.cursor >= limit {
            // Full before this byte arrived: drop it and close.
            rx.terminate();
            self.hw.set_rx_interrupt(false);
            rx.state = SessionState::Idle;
            return;
        }

        if let Some(slot) = rx.buf.get_mut(rx.cursor) {
            *slot = byte;
            rx.cursor += 1;
        }

        if byte == b'\n' || byte == b'\r' || rx.cursor >= limit {
            rx.terminate();
            self.hw.set_rx_interrupt(false);
            rx.state = SessionState::Idle;
        }
    }
}

/// UART transport shared between the foreground and the UART interrupt.
///
/// `RX` is the receive buffer size including the terminator byte, `TX` the
/// largest payload a single [`start_transmit`](Transport::start_transmit)
/// accepts. Place it in a `static` and call
/// [`on_interrupt`](Transport::on_interrupt) from the UART vector(s).
pub struct Transport<H, const RX: usize = RX_BUFFER_SIZE, const TX: usize = TX_BUFFER_SIZE> {
    shared: Mutex<RefCell<Shared<H, RX, TX>>>,
}

impl<H: UartHw> Transport<H> {
    /// Transport with the default buffer sizes.
    pub const fn new(hw: H) -> Self {
        Self::with_buffers(hw)
    }
}

impl<H: UartHw, const RX: usize, const TX: usize> Transport<H, RX, TX> {
    pub const fn with_buffers(hw: H) -> Self {
        Self {
            shared: Mutex::new(RefCell::new(Shared {
                hw,
                tx: TxSession {
                    state: SessionState::Idle,
                    buf: heapless::Vec::new(),
                    cursor: 0,
                },
                rx: RxSession {
                    state: SessionState::Idle,
                    buf: [0; RX],
                    cursor: 0,
                    error: None,
                },
            })),
        }
    }

    fn with_shared<R>(&self, f: impl FnOnce(&mut Shared<H, RX, TX>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.shared.borrow_ref_mut(cs)))
    }

    /// Bring up the peripheral and put both sessions back to idle.
    pub fn init(&self) -> Result<(), TransportError> {
        self.with_shared(|s| {
            s.hw.set_tx_interrupt(false);
            s.hw.set_rx_interrupt(false);
            s.tx.state = SessionState::Idle;
            s.tx.buf.clear();
            s.tx.cursor = 0;
            s.rx.state = SessionState::Idle;
            s.rx.cursor = 0;
            s.rx.error = None;
            s.hw.init()
        })
        .inspect_err(|e| log::warn!("UART init failed: {e}"))?;
        log::debug!("UART ready, rx capacity {RX}, tx capacity {TX}");
        Ok(())
    }

    /// Claim the transmit session and queue `bytes` for the interrupt.
    pub fn start_transmit(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if bytes.is_empty() {
            return Err(TransportError::EmptyBuffer);
        }
        if bytes.len() > TX {
            log::warn!("transmit of {} bytes exceeds capacity {TX}", bytes.len());
            return Err(TransportError::TooLong);
        }

        critical_section::with(|cs| self.claim_tx(cs)).inspect_err(|_| {
            log::trace!("transmit rejected, session busy");
        })?;

        // The interrupt ignores the session until the TX interrupt is
        // enabled, so loading can happen in a separate section.
        self.with_shared(|s| {
            s.tx.buf.clear();
            if s.tx.buf.extend_from_slice(bytes).is_err() {
                s.tx.state = SessionState::Idle;
                return Err(TransportError::TooLong);
            }
            s.tx.cursor = 0;
            s.hw.set_tx_interrupt(true);
            Ok(())
        })?;
        log::trace!("transmit started, {} bytes", bytes.len());
        Ok(())
    }

    fn claim_tx(&self, cs: CriticalSection<'_>) -> Result<(), TransportError> {
        let mut s = self.shared.borrow_ref_mut(cs);
        if s.tx.state != SessionState::Idle {
            return Err(TransportError::Busy);
        }
        s.tx.state = SessionState::Busy;
        Ok(())
    }

    /// Arm the receive session. Completes on CR/LF, a full buffer, or a
    /// line fault.
    pub fn start_receive(&self) -> Result<(), TransportError> {
        critical_section::with(|cs| {
            let mut s = self.shared.borrow_ref_mut(cs);
            if s.rx.state != SessionState::Idle {
                return Err(TransportError::Busy);
            }
            s.rx.state = SessionState::Busy;
            Ok(())
        })
        .inspect_err(|_| log::trace!("receive rejected, session not idle"))?;

        self.with_shared(|s| {
            s.rx.cursor = 0;
            s.rx.error = None;
            s.rx.terminate();
            s.hw.set_rx_interrupt(true);
        });
        Ok(())
    }

    /// Leave the receive error state and resume reception from an empty
    /// buffer. Does nothing unless the receive session is in `Error`.
    pub fn reset_error(&self) {
        let resumed = self.with_shared(|s| {
            if s.rx.state != SessionState::Error {
                return false;
            }
            s.rx.error = None;
            s.rx.cursor = 0;
            s.rx.terminate();
            s.hw.set_rx_interrupt(true);
            s.rx.state = SessionState::Busy;
            true
        });
        if resumed {
            log::debug!("receive error cleared, reception resumed");
        }
    }

    /// Interrupt entry point. Runs the transmit path, then the receive path.
    ///
    /// Does bounded work, never blocks and never logs.
    pub fn on_interrupt(&self) {
        self.with_shared(|s| {
            let status = s.hw.status();
            s.service_tx(&status);
            s.service_rx(&status);
        });
    }

    pub fn tx_state(&self) -> SessionState {
        self.with_shared(|s| s.tx.state)
    }

    pub fn rx_state(&self) -> SessionState {
        self.with_shared(|s| s.rx.state)
    }

    /// The fault that put the receive session into `Error`, if any.
    pub fn last_error(&self) -> Option<LineError> {
        self.with_shared(|s| s.rx.error)
    }

    /// Number of bytes received in the current or last receive session.
    pub fn received_len(&self) -> usize {
        self.with_shared(|s| s.rx.cursor)
    }

    /// Receive buffer size, terminator byte included. A session closed by
    /// overflow holds `rx_capacity() - 1` bytes.
    pub const fn rx_capacity(&self) -> usize {
        RX
    }

    /// Copy received bytes (terminator excluded) into `out`, returning how
    /// many were copied.
    pub fn received(&self, out: &mut [u8]) -> usize {
        self.with_received(|bytes| {
            let n = bytes.len().min(out.len());
            if let (Some(dst), Some(src)) = (out.get_mut(..n), bytes.get(..n)) {
                dst.copy_from_slice(src);
            }
            n
        })
    }

    /// Borrow the received bytes inside a critical section.
    pub fn with_received<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.with_shared(|s| f(s.rx.buf.get(..s.rx.cursor).unwrap_or(&[])))
    }

    /// Run `f` against the peripheral with the transport locked.
    pub fn with_hw<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        self.with_shared(|s| f(&mut s.hw))
    }
}

impl<H: UartHw, const RX: usize, const TX: usize> SerialTx for Transport<H, RX, TX> {
    fn tx_state(&self) -> SessionState {
        Transport::<H, RX, TX>::tx_state(self)
    }
    fn start_transmit(&self, bytes: &[u8]) -> Result<(), TransportError> {
        Transport::<H, RX, TX>::start_transmit(self, bytes)
    }
}
