// SPDX-License-Identifier: Apache-2.0

//! Monotonic millisecond counter.
//!
//! A [`TickSource`] lives in a `static` and is bumped by the periodic timer
//! interrupt. Everything else reads time through the [`Clock`] trait, so the
//! delay and pipeline code can be driven by a manual clock on the host.

use core::cell::Cell;

use critical_section::Mutex;

/// One millisecond of the free-running counter. Wraps after ~49.7 days.
pub type Tick = u32;

/// Read access to a monotonic tick counter.
pub trait Clock {
    /// Current tick count.
    fn now(&self) -> Tick;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Tick {
        (**self).now()
    }
}

/// Free-running counter written only by the timer interrupt.
///
/// The value is kept behind a critical section because a 32-bit load is not
/// a single instruction on 8-bit cores.
pub struct TickSource {
    ticks: Mutex<Cell<Tick>>,
}

impl TickSource {
    pub const fn new() -> Self {
        Self {
            ticks: Mutex::new(Cell::new(0)),
        }
    }

    /// Advance the counter by one tick. Call this from the timer ISR only.
    pub fn on_tick(&self) {
        critical_section::with(|cs| {
            let ticks = self.ticks.borrow(cs);
            ticks.set(ticks.get().wrapping_add(1));
        });
    }

    /// Seed the counter. Intended for bring-up and tests; normal operation
    /// never resets the count.
    pub fn set(&self, value: Tick) {
        critical_section::with(|cs| self.ticks.borrow(cs).set(value));
    }
}

impl Default for TickSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TickSource {
    fn now(&self) -> Tick {
        critical_section::with(|cs| self.ticks.borrow(cs).get())
    }
}
