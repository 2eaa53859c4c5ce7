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

//! The Chip-8 interpreter.
//!
//! The main focus of this module is the `Interpreter` struct, which owns the
//! machine state, both countdown timers and the peripherals, and executes one
//! instruction at a time.  It never reads the wall clock: every operation that
//! depends on time takes the current time (in nanoseconds) as an argument, and
//! the `scheduler` module is responsible for supplying it.
//!
//! Every error returned from this module is fatal to the interpreter.  The
//! kind of error can be recovered by downcasting the root cause.

use std::io::Read;
use std::num::Wrapping;

use failure::{Error, ResultExt};
use rand;

use display::{Display, FONT_HEIGHT};
use input::{Key, Keyboard};
use instruction::{Address, Instruction, Opcode, Register};
use machine::Machine;
use options::Options;
use sound::Sound;
use timer::CountdownTimer;
use {FONT_START, PROG_SIZE};

/// An error resulting from an opcode that is not in the decode table.
#[derive(Debug, Fail, PartialEq, Eq)]
#[fail(display = "malformed instruction {} at {}", opcode, pc)]
pub struct MalformedInstructionError {
    /// The offending opcode.
    pub opcode: Opcode,
    /// Where it was fetched from.
    pub pc: Address,
}

/// An error resulting from a keyboard reporting a key outside of `0..16`.
#[derive(Debug, Fail, PartialEq, Eq)]
#[fail(display = "invalid key index: {}", _0)]
pub struct InvalidKeyIndexError(pub u8);

/// A Chip-8 interpreter.
///
/// This struct contains the entire state of a Chip-8 interpreter together
/// with the display (`D`), keyboard (`K`) and buzzer (`S`) it drives.
pub struct Interpreter<D, K, S> {
    /// Memory, registers and the call stack.
    machine: Machine,
    /// The delay timer.
    delay: CountdownTimer,
    /// The sound timer.
    sound_timer: CountdownTimer,
    display: D,
    keyboard: K,
    sound: S,
}

impl<D: Display, K: Keyboard, S: Sound> Interpreter<D, K, S> {
    /// Returns a new interpreter with the default options.
    pub fn new(display: D, keyboard: K, sound: S) -> Self {
        Interpreter::with_options(&Options::default(), display, keyboard, sound)
    }

    /// Returns a new interpreter using the given options.
    pub fn with_options(options: &Options, display: D, keyboard: K, sound: S) -> Self {
        Interpreter {
            machine: Machine::new(),
            delay: CountdownTimer::new(options.timer_freq),
            sound_timer: CountdownTimer::new(options.timer_freq),
            display,
            keyboard,
            sound,
        }
    }

    /// Loads program data from the specified source.
    pub fn load_program<R: Read>(&mut self, input: &mut R) -> Result<(), Error> {
        let mut program = Vec::with_capacity(PROG_SIZE);
        // One byte more than fits, so that oversized programs are noticed.
        input
            .take(PROG_SIZE as u64 + 1)
            .read_to_end(&mut program)
            .context("could not read program")?;
        self.machine.load_program(&program)?;
        info!("loaded program of {} bytes", program.len());
        Ok(())
    }

    /// Returns a reference to the machine state.
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Returns a mutable reference to the machine state.
    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    /// Returns a reference to the display.
    pub fn display(&self) -> &D {
        &self.display
    }

    /// Returns a mutable reference to the display.
    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    /// Returns a reference to the keyboard.
    pub fn keyboard(&self) -> &K {
        &self.keyboard
    }

    /// Returns a mutable reference to the keyboard.
    pub fn keyboard_mut(&mut self) -> &mut K {
        &mut self.keyboard
    }

    /// Returns a reference to the buzzer.
    pub fn sound(&self) -> &S {
        &self.sound
    }

    /// Returns the value of the delay timer.
    pub fn dt(&self) -> u8 {
        self.delay.get()
    }

    /// Returns the value of the sound timer.
    pub fn st(&self) -> u8 {
        self.sound_timer.get()
    }

    /// Returns the value in the given register.
    pub fn register(&self, reg: Register) -> u8 {
        self.machine.register(reg)
    }

    /// Sets the given register to the given value.
    pub fn set_register(&mut self, reg: Register, val: u8) {
        self.machine.set_register(reg, val)
    }

    /// Runs one full cycle: ticks both timers, polls the display and executes
    /// one instruction.
    pub fn cycle(&mut self, now: u64) -> Result<(), Error> {
        self.delay.check(now);
        self.sound_timer.check(now);
        self.display.check().context("could not refresh display")?;
        self.step(now)
    }

    /// Returns the instruction at the program counter.
    pub fn current_instruction(&self) -> Result<Instruction, MalformedInstructionError> {
        let opcode = self.machine.fetch();
        Instruction::decode(opcode).ok_or(MalformedInstructionError {
            opcode,
            pc: self.machine.pc(),
        })
    }

    /// Fetches, decodes and executes the instruction at the program counter.
    pub fn step(&mut self, now: u64) -> Result<(), Error> {
        let ins = self.current_instruction()?;
        trace!("{}: {}", self.machine.pc(), ins);
        self.execute(ins, now)
    }

    /// Executes the given instruction in the current interpreter context.
    ///
    /// The interpreter will behave as if the given instruction were executed
    /// at the current program location in memory.  Jumps, calls and returns
    /// set the program counter themselves; everything else advances it by 2,
    /// and the skip instructions advance it by a further 2 when they skip.
    pub fn execute(&mut self, ins: Instruction, now: u64) -> Result<(), Error> {
        use self::Instruction::*;

        match ins {
            Sys(addr) => warn!("ignoring machine code routine at {}", addr),
            Cls => self.display.clear(),
            Ret => {
                let ret = self.machine
                    .pop()
                    .with_context(|_| format!("error executing {}", ins))?;
                self.machine
                    .jump(ret)
                    .with_context(|_| format!("error executing {}", ins))?;
                return Ok(());
            }
            Jp(addr) => {
                self.machine
                    .jump(addr)
                    .with_context(|_| format!("error executing {}", ins))?;
                return Ok(());
            }
            Call(addr) => {
                let ret = (self.machine.pc() + 2)
                    .with_context(|_| format!("error executing {}", ins))?;
                self.machine
                    .push(ret)
                    .with_context(|_| format!("error executing {}", ins))?;
                self.machine
                    .jump(addr)
                    .with_context(|_| format!("error executing {}", ins))?;
                return Ok(());
            }
            SeByte(reg, b) => self.skip_if(self.register(reg) == b)?,
            SneByte(reg, b) => self.skip_if(self.register(reg) != b)?,
            SeReg(reg1, reg2) => self.skip_if(self.register(reg1) == self.register(reg2))?,
            LdByte(reg, b) => self.set_register(reg, b),
            AddByte(reg, b) => *self.machine.register_mut(reg) += Wrapping(b),
            LdReg(reg1, reg2) => {
                let r2 = self.register(reg2);
                self.set_register(reg1, r2);
            }
            Or(reg1, reg2) => {
                let r = self.register(reg1) | self.register(reg2);
                self.set_register(reg1, r);
            }
            And(reg1, reg2) => {
                let r = self.register(reg1) & self.register(reg2);
                self.set_register(reg1, r);
            }
            Xor(reg1, reg2) => {
                let r = self.register(reg1) ^ self.register(reg2);
                self.set_register(reg1, r);
            }
            AddReg(reg1, reg2) => {
                let r2 = self.register(reg2);
                self.add(reg1, r2);
            }
            Sub(reg1, reg2) => {
                let r2 = self.register(reg2);
                self.sub(reg1, r2);
            }
            Shr(reg) => self.shr(reg),
            Subn(reg1, reg2) => {
                let r2 = self.register(reg2);
                self.subn(reg1, r2);
            }
            Shl(reg) => self.shl(reg),
            SneReg(reg1, reg2) => self.skip_if(self.register(reg1) != self.register(reg2))?,
            LdI(addr) => self.machine.set_i(addr),
            JpV0(addr) => {
                let target = (addr + self.register(Register::V0) as usize)
                    .context("attempted to jump to out of range address")?;
                self.machine
                    .jump(target)
                    .with_context(|_| format!("error executing {}", ins))?;
                return Ok(());
            }
            Rnd(reg, b) => self.set_register(reg, rand::random::<u8>() & b),
            Drw(reg1, reg2, n) => self.drw(reg1, reg2, n)
                .with_context(|_| format!("error executing {}", ins))?,
            Skp(reg) => {
                let key = Key::from_byte(self.register(reg));
                self.skip_if(self.keyboard.is_pressed(key))?
            }
            Sknp(reg) => {
                let key = Key::from_byte(self.register(reg));
                self.skip_if(!self.keyboard.is_pressed(key))?
            }
            LdRegDt(reg) => {
                let dt = self.dt();
                self.set_register(reg, dt);
            }
            LdKey(reg) => {
                let index = self.keyboard.wait_for_any_key();
                let key = Key::from_index(index).ok_or(InvalidKeyIndexError(index))?;
                self.set_register(reg, key as u8);
            }
            LdDtReg(reg) => {
                let r = self.register(reg);
                self.delay.set(r, now);
            }
            LdSt(reg) => {
                let r = self.register(reg);
                self.sound_timer.set(r, now);
                let duration = u64::from(r) * self.sound_timer.period();
                debug!("sound timer set to {}, sounding for {} ns", r, duration);
                self.sound.tone(duration);
            }
            AddI(reg) => {
                let sum = self.machine.i().addr() + self.register(reg) as usize;
                self.machine.set_i(Address::wrapping(sum));
                self.set_register(Register::VF, (sum > 0xFFF) as u8);
            }
            LdF(reg) => {
                let digit = (self.register(reg) & 0xF) as usize;
                self.machine
                    .set_i(Address::wrapping(FONT_START + FONT_HEIGHT * digit));
            }
            LdB(reg) => self.ld_b(reg)
                .with_context(|_| format!("error executing {}", ins))?,
            LdDerefIReg(reg) => self.machine
                .store_registers(reg)
                .with_context(|_| format!("error executing {}", ins))?,
            LdRegDerefI(reg) => self.machine
                .load_registers(reg)
                .with_context(|_| format!("error executing {}", ins))?,
        }

        self.machine
            .advance()
            .context("program counter ran off the end of memory")?;
        Ok(())
    }

    /// Advances the program counter past the next instruction if `cond`
    /// holds; the usual advance happens afterwards either way.
    fn skip_if(&mut self, cond: bool) -> Result<(), Error> {
        if cond {
            self.machine
                .advance()
                .context("program counter ran off the end of memory")?;
        }
        Ok(())
    }

    /// Adds the given byte to the given register, setting `VF` to 1 on carry
    /// or 0 otherwise.
    ///
    /// In this and the other flag-setting helpers, `VF` is written before the
    /// result, so when `reg` is `VF` the result is what remains.
    fn add(&mut self, reg: Register, val: u8) {
        let sum = u16::from(self.register(reg)) + u16::from(val);
        self.set_register(Register::VF, (sum > 0xFF) as u8);
        self.set_register(reg, sum as u8);
    }

    /// Subtracts the given byte from the given register, setting `VF` to 0 on
    /// borrow or 1 otherwise.
    fn sub(&mut self, reg: Register, val: u8) {
        let old = self.register(reg);
        self.set_register(Register::VF, (old >= val) as u8);
        self.set_register(reg, old.wrapping_sub(val));
    }

    /// Sets `reg` to `val - reg`, setting `VF` to 0 on borrow or 1 otherwise.
    fn subn(&mut self, reg: Register, val: u8) {
        let old = self.register(reg);
        self.set_register(Register::VF, (val >= old) as u8);
        self.set_register(reg, val.wrapping_sub(old));
    }

    /// Shifts `reg` right by one, setting `VF` to the old lowest bit.
    fn shr(&mut self, reg: Register) {
        let old = self.register(reg);
        self.set_register(Register::VF, old & 1);
        self.set_register(reg, old >> 1);
    }

    /// Shifts `reg` left by one, setting `VF` to the old highest bit.
    fn shl(&mut self, reg: Register) {
        let old = self.register(reg);
        self.set_register(Register::VF, old >> 7);
        self.set_register(reg, old << 1);
    }

    /// Implements the `DRW` operation.
    fn drw(&mut self, reg1: Register, reg2: Register, n: u8) -> Result<(), Error> {
        let x = self.register(reg1) as usize;
        let y = self.register(reg2) as usize;
        let collision = {
            let sprite = self.machine.slice(self.machine.i(), n as usize)?;
            self.display.draw(sprite, x, y)
        };
        self.set_register(Register::VF, collision as u8);
        Ok(())
    }

    /// Implements the `LD B, Vx` operation.
    fn ld_b(&mut self, reg: Register) -> Result<(), Error> {
        let val = self.register(reg);
        let i = self.machine.i();
        let digits = self.machine.slice_mut(i, 3)?;
        digits[0] = val / 100;
        digits[1] = val / 10 % 10;
        digits[2] = val % 10;
        Ok(())
    }
}
