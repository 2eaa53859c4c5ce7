// Copyright 2018 Ian Johnson

// This file is part of Chip-8.

// Chip-8 is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Chip-8 is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Chip-8.  If not, see <http://www.gnu.org/licenses/>.

//! The buzzer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use time;

/// A buzzer, as seen by the interpreter.
pub trait Sound {
    /// Starts a tone lasting `duration` nanoseconds, without blocking.
    ///
    /// A new tone replaces any tone still playing.
    fn tone(&mut self, duration: u64);
}

/// A buzzer that makes no sound.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Sound for Silent {
    fn tone(&mut self, _duration: u64) {}
}

/// A buzzer that records until when it should be sounding, for an audio
/// thread to poll.
///
/// Times come from `time::precise_time_ns`.
#[derive(Debug, Clone, Default)]
pub struct ToneGate {
    until: Arc<AtomicU64>,
}

impl ToneGate {
    /// Returns a new, silent tone gate.
    pub fn new() -> Self {
        ToneGate::default()
    }

    /// Returns whether a tone should be sounding at time `now`.
    pub fn sounding_at(&self, now: u64) -> bool {
        now < self.until.load(Ordering::Acquire)
    }

    /// Returns whether a tone should be sounding right now.
    pub fn sounding(&self) -> bool {
        self.sounding_at(time::precise_time_ns())
    }

    /// Starts a tone lasting from `now` for `duration` nanoseconds.
    pub fn tone_from(&self, now: u64, duration: u64) {
        self.until.store(now + duration, Ordering::Release);
    }
}

impl Sound for ToneGate {
    fn tone(&mut self, duration: u64) {
        self.tone_from(time::precise_time_ns(), duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_gate_window() {
        let gate = ToneGate::new();
        assert!(!gate.sounding_at(0));

        gate.tone_from(1_000, 500);
        assert!(gate.sounding_at(1_000));
        assert!(gate.sounding_at(1_499));
        assert!(!gate.sounding_at(1_500));

        // A zero-length tone silences the gate.
        gate.tone_from(1_200, 0);
        assert!(!gate.sounding_at(1_300));
    }

    #[test]
    fn tone_gate_clones_share_state() {
        let mut gate = ToneGate::new();
        let reader = gate.clone();
        gate.tone(1_000_000_000);
        assert!(reader.sounding());
    }
}
