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

//! The fixed-rate run loop.
//!
//! A `Scheduler` runs one interpreter cycle per tick and then waits for the
//! next tick's deadline.  OS sleeps are only accurate to a millisecond or so,
//! which is coarser than a cycle at typical rates, so the wait sleeps until
//! shortly before the deadline and spins for the rest.  Deadlines are
//! computed from the previous deadline rather than from the time a cycle
//! finished, so jitter in individual cycles does not accumulate.
//!
//! All time is read through the `Clock` trait, so the loop can be driven by a
//! simulated clock in tests.

use std::hint;
use std::thread;
use std::time::Duration;

use failure::Error;
use time;

use display::Display;
use input::Keyboard;
use interpreter::Interpreter;
use options::Options;
use sound::Sound;
use timer::period_ns;

/// A monotonic clock with nanosecond resolution.
pub trait Clock {
    /// Returns the current time, in nanoseconds from an arbitrary epoch.
    fn now(&self) -> u64;

    /// Sleeps for roughly `duration` nanoseconds.
    fn sleep(&self, duration: u64);

    /// Called on every iteration of a busy-wait.
    fn spin(&self) {
        hint::spin_loop();
    }
}

/// The system's monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        time::precise_time_ns()
    }

    fn sleep(&self, duration: u64) {
        thread::sleep(Duration::from_nanos(duration));
    }
}

/// Drives an interpreter at a fixed instruction rate.
pub struct Scheduler<C, D, K, S> {
    interpreter: Interpreter<D, K, S>,
    clock: C,
    /// The length of one cycle, in nanoseconds.
    period: u64,
    /// How long before a deadline to switch from sleeping to spinning.
    spin_slack: u64,
    /// How far behind schedule we may fall before re-anchoring.
    max_lag: u64,
    /// When the next cycle is due (`None` before the first cycle).
    next_tick: Option<u64>,
    /// The number of cycles run so far.
    cycles: u64,
}

impl<C, D, K, S> Scheduler<C, D, K, S>
where
    C: Clock,
    D: Display,
    K: Keyboard,
    S: Sound,
{
    /// Returns a scheduler for the given interpreter, using the rate and
    /// timing options from `options`.
    pub fn new(interpreter: Interpreter<D, K, S>, clock: C, options: &Options) -> Self {
        let period = period_ns(options.cpu_freq);
        Scheduler {
            interpreter,
            clock,
            period,
            spin_slack: options.spin_slack,
            max_lag: period.saturating_mul(u64::from(options.catch_up_limit)),
            next_tick: None,
            cycles: 0,
        }
    }

    /// Returns a reference to the interpreter.
    pub fn interpreter(&self) -> &Interpreter<D, K, S> {
        &self.interpreter
    }

    /// Returns a mutable reference to the interpreter.
    pub fn interpreter_mut(&mut self) -> &mut Interpreter<D, K, S> {
        &mut self.interpreter
    }

    /// Returns a reference to the clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Returns the length of one cycle, in nanoseconds.
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Returns the number of cycles run so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Runs forever, returning only if the interpreter fails.
    pub fn run(&mut self) -> Result<(), Error> {
        loop {
            self.tick()?;
        }
    }

    /// Runs the given number of cycles.
    pub fn run_for(&mut self, cycles: u64) -> Result<(), Error> {
        for _ in 0..cycles {
            self.tick()?;
        }
        Ok(())
    }

    /// Runs one interpreter cycle, then waits until the next one is due.
    pub fn tick(&mut self) -> Result<(), Error> {
        let now = self.clock.now();
        let mut scheduled = self.next_tick.unwrap_or(now);
        if now.saturating_sub(scheduled) > self.max_lag {
            debug!(
                "fell {} ns behind schedule; restarting from the current time",
                now - scheduled
            );
            scheduled = now;
        }

        self.interpreter.cycle(now)?;
        self.cycles += 1;

        let deadline = scheduled + self.period;
        self.next_tick = Some(deadline);
        self.wait_until(deadline);
        Ok(())
    }

    /// Sleeps until `spin_slack` before `deadline`, then spins until it
    /// arrives.
    fn wait_until(&self, deadline: u64) {
        let now = self.clock.now();
        if deadline > now + self.spin_slack {
            self.clock.sleep(deadline - now - self.spin_slack);
        }
        while self.clock.now() < deadline {
            self.clock.spin();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use failure::Error;

    use display::{Buffer, Display};
    use input::{Key, Keyboard};
    use interpreter::{Interpreter, MalformedInstructionError};
    use options::Options;
    use scheduler::{Clock, Scheduler};
    use sound::Silent;

    /// A simulated clock.  Sleeping advances it by the requested amount and
    /// each spin advances it by `spin_step`.
    struct ManualClock {
        now: Rc<Cell<u64>>,
        spin_step: u64,
        sleeps: RefCell<Vec<u64>>,
        spins: Cell<u64>,
    }

    impl ManualClock {
        fn new(now: Rc<Cell<u64>>, spin_step: u64) -> Self {
            ManualClock {
                now,
                spin_step,
                sleeps: RefCell::new(Vec::new()),
                spins: Cell::new(0),
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> u64 {
            self.now.get()
        }

        fn sleep(&self, duration: u64) {
            self.sleeps.borrow_mut().push(duration);
            self.now.set(self.now.get() + duration);
        }

        fn spin(&self) {
            self.spins.set(self.spins.get() + 1);
            self.now.set(self.now.get() + self.spin_step);
        }
    }

    /// A display whose refresh poll takes a scripted amount of (simulated)
    /// time on each call.
    struct SlowDisplay {
        buffer: Buffer,
        now: Rc<Cell<u64>>,
        costs: Vec<u64>,
    }

    impl Display for SlowDisplay {
        fn clear(&mut self) {
            self.buffer.clear()
        }

        fn draw(&mut self, sprite: &[u8], x: usize, y: usize) -> bool {
            self.buffer.draw(sprite, x, y)
        }

        fn check(&mut self) -> Result<(), Error> {
            let cost = if self.costs.is_empty() {
                0
            } else {
                self.costs.remove(0)
            };
            self.now.set(self.now.get() + cost);
            Ok(())
        }
    }

    struct NoKeys;

    impl Keyboard for NoKeys {
        fn is_pressed(&self, _key: Key) -> bool {
            false
        }

        fn wait_for_any_key(&mut self) -> u8 {
            0
        }
    }

    type TestScheduler = Scheduler<ManualClock, SlowDisplay, NoKeys, Silent>;

    /// Returns a scheduler running `JP 0x200` forever.
    fn scheduler(options: &Options, spin_step: u64, costs: Vec<u64>) -> TestScheduler {
        let now = Rc::new(Cell::new(0));
        let display = SlowDisplay {
            buffer: Buffer::new(),
            now: now.clone(),
            costs,
        };
        let mut interpreter = Interpreter::with_options(options, display, NoKeys, Silent);
        interpreter.machine_mut().load_program(&[0x12, 0x00]).unwrap();
        Scheduler::new(interpreter, ManualClock::new(now, spin_step), options)
    }

    #[test]
    fn runs_at_fixed_rate() {
        let options = Options::testing();
        let mut scheduler = scheduler(&options, 1, vec![]);
        let period = scheduler.period();
        assert_eq!(period, 1_953_125);

        scheduler.run_for(10).unwrap();
        assert_eq!(scheduler.cycles(), 10);
        assert_eq!(scheduler.clock().now(), 10 * period);
        assert_eq!(scheduler.clock().spins.get(), 0);
    }

    #[test]
    fn sleeps_then_spins() {
        let options = Options {
            spin_slack: 500_000,
            ..Options::testing()
        };
        let mut scheduler = scheduler(&options, 1_000, vec![]);
        let period = scheduler.period();

        scheduler.tick().unwrap();
        assert_eq!(*scheduler.clock().sleeps.borrow(), vec![period - 500_000]);
        assert_eq!(scheduler.clock().spins.get(), 500);
        assert_eq!(scheduler.clock().now(), period);
    }

    #[test]
    fn jitter_does_not_accumulate() {
        let options = Options::testing();
        let costs = vec![300_000, 1_000_000, 0, 1_500_000, 20_000];
        let mut scheduler = scheduler(&options, 1, costs);
        let period = scheduler.period();

        scheduler.run_for(5).unwrap();
        // Every cycle fit inside its period, so we finish exactly on time.
        assert_eq!(scheduler.clock().now(), 5 * period);
        let sleeps = scheduler.clock().sleeps.borrow().clone();
        assert_eq!(sleeps[0], period - 300_000);
        assert_eq!(sleeps[3], period - 1_500_000);
    }

    #[test]
    fn late_cycles_catch_up() {
        let options = Options::testing();
        let mut scheduler = scheduler(&options, 1, vec![0]);
        let period = scheduler.period();

        scheduler.tick().unwrap();
        // Stall for two and a half periods between ticks.
        let now = scheduler.clock().now();
        scheduler.clock().now.set(now + 5 * period / 2);

        // The next two deadlines have already passed, so those ticks do not
        // wait at all.
        scheduler.tick().unwrap();
        scheduler.tick().unwrap();
        let sleeps_before = scheduler.clock().sleeps.borrow().len();
        scheduler.tick().unwrap();
        assert_eq!(scheduler.clock().sleeps.borrow().len(), sleeps_before + 1);
        assert_eq!(scheduler.clock().now(), 4 * period);
    }

    #[test]
    fn long_stall_reanchors() {
        let options = Options {
            catch_up_limit: 4,
            ..Options::testing()
        };
        let mut scheduler = scheduler(&options, 1, vec![0]);
        let period = scheduler.period();

        scheduler.tick().unwrap();
        let stalled = scheduler.clock().now() + 100 * period;
        scheduler.clock().now.set(stalled);

        // Instead of bursting through 100 cycles, the schedule restarts.
        scheduler.tick().unwrap();
        assert_eq!(scheduler.clock().now(), stalled + period);
    }

    #[test]
    fn errors_stop_the_loop() {
        let options = Options::testing();
        let mut scheduler = scheduler(&options, 1, vec![]);
        scheduler
            .interpreter_mut()
            .machine_mut()
            .load_program(&[0xFF, 0xFF])
            .unwrap();

        let err = scheduler.run().unwrap_err();
        assert!(
            err.find_root_cause()
                .downcast_ref::<MalformedInstructionError>()
                .is_some()
        );
        assert_eq!(scheduler.cycles(), 0);
    }
}
