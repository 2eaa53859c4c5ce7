/*
 * Copyright 2018 Ian Johnson
 *
 * This is free software, distributed under the MIT license.  A copy of the
 * license can be found in the LICENSE file in the project root, or at
 * https://opensource.org/licenses/MIT.
 */

//! A countdown timer, used for `DT` and `ST`.
//!
//! Times are plain nanosecond counts from a monotonic clock (see
//! `scheduler::Clock`), passed in by the caller so that the timer never reads
//! the wall clock itself.

/// The canonical timer frequency, in Hz.
pub const TIMER_FREQ: u32 = 60;

/// Returns the length of one period at the given frequency, in nanoseconds.
pub fn period_ns(frequency: u32) -> u64 {
    1_000_000_000 / u64::from(frequency.max(1))
}

/// An 8-bit value that counts down to zero at a fixed cadence.
#[derive(Debug, Clone)]
pub struct CountdownTimer {
    /// The current count.
    count: u8,
    /// When the count was last set.
    set_at: u64,
    /// When the next decrement is due.
    next_decrement: u64,
    /// The length of one tick.
    period: u64,
}

impl CountdownTimer {
    /// Returns a stopped timer ticking at the given frequency.
    pub fn new(frequency: u32) -> Self {
        CountdownTimer {
            count: 0,
            set_at: 0,
            next_decrement: 0,
            period: period_ns(frequency),
        }
    }

    /// Sets the count; the first decrement will be due one period after
    /// `now`.
    pub fn set(&mut self, count: u8, now: u64) {
        self.count = count;
        self.set_at = now;
        self.next_decrement = now + self.period;
    }

    /// Decrements the count if it is nonzero and a decrement is due.
    ///
    /// At most one decrement happens per call.  The next deadline is advanced
    /// by exactly one period from the previous one, so late calls do not
    /// accumulate drift.
    pub fn check(&mut self, now: u64) {
        if self.count > 0 && now >= self.next_decrement {
            self.count -= 1;
            self.next_decrement += self.period;
        }
    }

    /// Returns the current count.
    pub fn get(&self) -> u8 {
        self.count
    }

    /// Returns when the count was last set.
    pub fn set_at(&self) -> u64 {
        self.set_at
    }

    /// Returns the length of one tick, in nanoseconds.
    pub fn period(&self) -> u64 {
        self.period
    }
}

impl Default for CountdownTimer {
    fn default() -> Self {
        CountdownTimer::new(TIMER_FREQ)
    }
}
