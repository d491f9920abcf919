// SPDX-License-Identifier: Apache-2.0

//! Serial-line JSON reporting for small microcontrollers.
//!
//! The crate is split the same way the firmware is wired:
//!
//! - [`tick`] keeps the millisecond counter driven by a timer interrupt,
//! - [`delay`] answers "has N ms passed" without blocking,
//! - [`transport`] runs the interrupt-driven UART transmit/receive sessions,
//! - [`tokenizer`] splits a JSON buffer into a flat, caller-owned token array,
//! - [`pipeline`] walks the tokens and paces formatted lines out of the UART,
//!   one bounded step per call,
//! - [`echo`] sends each received line back, recovering from line faults.
//!
//! [`sim`] provides an in-memory UART and a manual clock for host tests and
//! the desktop demo.
//!
//! ```rust
//! use uartjson::sim::{ManualClock, SimUart};
//! use uartjson::{Phase, Pipeline, Transport};
//!
//! let uart: Transport<SimUart> = Transport::new(SimUart::new());
//! uart.init().unwrap();
//! let clock = ManualClock::new();
//! let mut pipeline = Pipeline::new(br#"{"user":"johndoe"}"#, &uart, &clock);
//!
//! while pipeline.phase() != Phase::Complete {
//!     pipeline.advance();
//!     uart.drain_tx();
//!     clock.advance(10);
//! }
//! ```

#![cfg_attr(not(test), no_std)]

pub mod delay;
pub mod echo;
pub mod pipeline;
pub mod sim;
pub mod tick;
pub mod tokenizer;
pub mod transport;

pub use delay::Timer;
pub use echo::{Echo, EchoEvent};
pub use pipeline::{Phase, Pipeline, PipelineConfig};
pub use tick::{Clock, Tick, TickSource};
pub use tokenizer::{ErrKind, Error, Mode, Parser, Token, TokenKind};
pub use transport::{
    HwError, LineError, SerialTx, SessionState, Status, Transport, TransportError, UartHw,
};
