// SPDX-License-Identifier: Apache-2.0

//! Wraparound-safe delays on top of a [`Clock`].
//!
//! Only [`elapsed`] and [`Timer`] may be used from the cooperative loop.
//! [`block_ms`] spins and exists for bring-up code outside steady state.

use crate::tick::{Clock, Tick};

/// True once `duration` ticks have passed between `start` and `now`.
///
/// Unsigned subtraction keeps this correct across one wrap of the counter.
#[inline]
pub const fn ticks_elapsed(now: Tick, start: Tick, duration: Tick) -> bool {
    now.wrapping_sub(start) >= duration
}

/// Mark the start of a delay. Pair with [`elapsed`].
#[inline]
pub fn start_timer<C: Clock + ?Sized>(clock: &C) -> Tick {
    clock.now()
}

/// Non-blocking check that `duration` ms have passed since `start`.
#[inline]
pub fn elapsed<C: Clock + ?Sized>(clock: &C, start: Tick, duration: Tick) -> bool {
    ticks_elapsed(clock.now(), start, duration)
}

/// Busy-wait for `ms` milliseconds.
///
/// Never call this from an interrupt handler: the tick only advances while
/// interrupts are serviced.
pub fn block_ms<C: Clock + ?Sized>(clock: &C, ms: Tick) {
    let start = clock.now();
    while !elapsed(clock, start, ms) {
        core::hint::spin_loop();
    }
}

/// A start mark plus a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    start: Tick,
    duration: Tick,
}

impl Timer {
    pub fn start<C: Clock + ?Sized>(clock: &C, duration: Tick) -> Self {
        Self {
            start: clock.now(),
            duration,
        }
    }

    pub fn is_expired<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        elapsed(clock, self.start, self.duration)
    }

    /// Ticks left until expiry, zero once expired.
    pub fn remaining<C: Clock + ?Sized>(&self, clock: &C) -> Tick {
        let spent = clock.now().wrapping_sub(self.start);
        self.duration.saturating_sub(spent)
    }

    pub fn restart<C: Clock + ?Sized>(&mut self, clock: &C) {
        self.start = clock.now();
    }

    pub fn started_at(&self) -> Tick {
        self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ManualClock;
    use test_log::test;

    #[test]
    fn test_not_elapsed_right_after_start() {
        let clock = ManualClock::new();
        clock.set(1234);
        let t = start_timer(&clock);
        assert!(!elapsed(&clock, t, 1));
        assert!(!elapsed(&clock, t, 500));
    }

    #[test]
    fn test_zero_duration_is_always_elapsed() {
        let clock = ManualClock::new();
        let t = start_timer(&clock);
        assert!(elapsed(&clock, t, 0));
    }

    #[test]
    fn test_elapsed_after_duration() {
        let clock = ManualClock::new();
        let t = start_timer(&clock);
        clock.advance(499);
        assert!(!elapsed(&clock, t, 500));
        clock.advance(1);
        assert!(elapsed(&clock, t, 500));
        clock.advance(10_000);
        assert!(elapsed(&clock, t, 500));
    }

    #[test]
    fn test_elapsed_across_wraparound() {
        let clock = ManualClock::new();
        clock.set(u32::MAX - 100);
        let t = start_timer(&clock);
        clock.advance(150);
        assert_eq!(clock.now(), 49);
        assert!(!elapsed(&clock, t, 200));
        clock.advance(50);
        assert!(elapsed(&clock, t, 200));
    }

    #[test]
    fn test_ticks_elapsed_is_const() {
        const DONE: bool = ticks_elapsed(5, u32::MAX, 6);
        assert!(DONE);
        assert!(!ticks_elapsed(4, u32::MAX, 6));
    }

    #[test]
    fn test_timer_remaining_and_restart() {
        let clock = ManualClock::new();
        let mut timer = Timer::start(&clock, 100);
        clock.advance(30);
        assert_eq!(timer.remaining(&clock), 70);
        assert!(!timer.is_expired(&clock));
        clock.advance(70);
        assert!(timer.is_expired(&clock));
        assert_eq!(timer.remaining(&clock), 0);
        timer.restart(&clock);
        assert_eq!(timer.started_at(), 100);
        assert!(!timer.is_expired(&clock));
    }

    #[test]
    fn test_block_ms_returns_once_clock_moves() {
        // The auto-advancing clock stands in for the timer interrupt.
        let clock = ManualClock::auto_advancing(1);
        block_ms(&clock, 25);
        assert!(clock.now() >= 25);
    }
}
