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

//! Interpreter and scheduler options.

use std::default::Default;

use timer::TIMER_FREQ;

/// The default instruction rate, in Hz.
pub const CPU_FREQ: u32 = 512;

/// Options for the interpreter and its scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// The number of instructions to execute per second (default 512).
    pub cpu_freq: u32,
    /// The frequency at which `DT` and `ST` count down, in Hz (default 60).
    pub timer_freq: u32,
    /// How long before each cycle deadline to stop sleeping and start
    /// spinning, in nanoseconds (default 500 µs).
    pub spin_slack: u64,
    /// How many whole cycles the scheduler may fall behind before it gives
    /// up catching up and restarts its deadlines from the current time
    /// (default 64).
    pub catch_up_limit: u32,
}

impl Options {
    /// Returns the default set of options.
    pub fn new() -> Self {
        Options {
            cpu_freq: CPU_FREQ,
            timer_freq: TIMER_FREQ,
            spin_slack: 500_000,
            catch_up_limit: 64,
        }
    }

    /// Returns a set of options useful for testing: no spinning, and no
    /// catch-up limit.
    pub fn testing() -> Self {
        Options {
            spin_slack: 0,
            catch_up_limit: u32::max_value(),
            ..Options::new()
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Options::new()
    }
}
