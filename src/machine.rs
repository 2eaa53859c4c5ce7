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

//! The Chip-8 machine state.
//!
//! `Machine` owns everything an instruction can touch directly: memory, the
//! general-purpose registers, `I`, the program counter and the call stack.
//! Every memory access that depends on `I` goes through a checked accessor,
//! so an out-of-range access surfaces as an error instead of a panic.

use std::num::Wrapping;

use failure::Error;

use display::FONT;
use instruction::{Address, AddressOutOfRangeError, Opcode, Register};
use {FONT_START, MEM_SIZE, PROG_SIZE, PROG_START, STACK_SIZE};

/// The highest valid program counter value.
const PC_MAX: usize = MEM_SIZE - 2;

/// An error resulting from a `CALL` with a full call stack.
#[derive(Debug, Fail, PartialEq, Eq)]
#[fail(display = "call stack overflow (depth {})", _0)]
pub struct StackOverflowError(pub usize);

/// An error resulting from a `RET` with an empty call stack.
#[derive(Debug, Fail, PartialEq, Eq)]
#[fail(display = "no subroutine to return from")]
pub struct StackUnderflowError;

/// An error resulting from a program that does not fit in memory.
#[derive(Debug, Fail, PartialEq, Eq)]
#[fail(display = "program of {} bytes is too large", _0)]
pub struct ProgramTooLargeError(pub usize);

/// The mutable state of a Chip-8 machine.
pub struct Machine {
    /// The internal memory.
    mem: [u8; MEM_SIZE],
    /// The general-purpose registers `V0`-`VF`.
    regs: [Wrapping<u8>; 16],
    /// The special register `I`.
    reg_i: Address,
    /// The program counter.
    pc: Address,
    /// Return addresses pushed by `CALL`.
    stack: [Address; STACK_SIZE],
    /// The number of occupied stack slots; 0 means the stack is empty.
    sp: usize,
}

impl Machine {
    /// Returns a fresh machine with the font loaded and the program counter
    /// at the start of the program area.
    pub fn new() -> Self {
        let mut machine = Machine {
            mem: [0; MEM_SIZE],
            regs: [Wrapping(0); 16],
            reg_i: Address::default(),
            pc: Address::wrapping(PROG_START),
            stack: [Address::default(); STACK_SIZE],
            sp: 0,
        };

        for (i, glyph) in FONT.iter().enumerate() {
            let start = FONT_START + i * glyph.len();
            machine.mem[start..start + glyph.len()].copy_from_slice(glyph);
        }

        machine
    }

    /// Copies the given program into memory starting at `PROG_START`.
    pub fn load_program(&mut self, program: &[u8]) -> Result<(), ProgramTooLargeError> {
        if program.len() > PROG_SIZE {
            return Err(ProgramTooLargeError(program.len()));
        }
        self.mem[PROG_START..PROG_START + program.len()].copy_from_slice(program);
        Ok(())
    }

    /// Returns a reference to the internal memory.
    pub fn mem(&self) -> &[u8; MEM_SIZE] {
        &self.mem
    }

    /// Returns a mutable reference to the internal memory.
    pub fn mem_mut(&mut self) -> &mut [u8; MEM_SIZE] {
        &mut self.mem
    }

    /// Returns the `len` bytes of memory starting at `start`.
    pub fn slice(&self, start: Address, len: usize) -> Result<&[u8], AddressOutOfRangeError> {
        let end = check_span(start, len)?;
        Ok(&self.mem[start.addr()..end])
    }

    /// Returns the `len` bytes of memory starting at `start`, mutably.
    pub fn slice_mut(
        &mut self,
        start: Address,
        len: usize,
    ) -> Result<&mut [u8], AddressOutOfRangeError> {
        let end = check_span(start, len)?;
        Ok(&mut self.mem[start.addr()..end])
    }

    /// Returns the value in the given register.
    pub fn register(&self, reg: Register) -> u8 {
        self.regs[reg.index()].0
    }

    /// Sets the given register to the given value.
    pub fn set_register(&mut self, reg: Register, val: u8) {
        self.regs[reg.index()] = Wrapping(val);
    }

    /// Returns a mutable reference to the given register, for wrapping
    /// arithmetic.
    pub fn register_mut(&mut self, reg: Register) -> &mut Wrapping<u8> {
        &mut self.regs[reg.index()]
    }

    /// Returns the value of register `I`.
    pub fn i(&self) -> Address {
        self.reg_i
    }

    /// Sets the value of register `I`.
    pub fn set_i(&mut self, val: Address) {
        self.reg_i = val;
    }

    /// Returns the value of the program counter.
    pub fn pc(&self) -> Address {
        self.pc
    }

    /// Reads the opcode at the program counter.
    pub fn fetch(&self) -> Opcode {
        let pc = self.pc.addr();
        Opcode::from_bytes(self.mem[pc], self.mem[pc + 1])
    }

    /// Moves the program counter to the next instruction.
    pub fn advance(&mut self) -> Result<(), Error> {
        let next = (self.pc + 2)?;
        self.jump(next)
    }

    /// Transfers control to `target`, which must be an even address inside
    /// the program area.
    pub fn jump(&mut self, target: Address) -> Result<(), Error> {
        if target.addr() < PROG_START || target.addr() > PC_MAX {
            return Err(AddressOutOfRangeError(target.addr()).into());
        }
        self.pc = target.aligned()?;
        Ok(())
    }

    /// Copies `V0` through `last` (inclusive) to memory starting at `I`.
    ///
    /// `I` itself is left unchanged.
    pub fn store_registers(&mut self, last: Register) -> Result<(), AddressOutOfRangeError> {
        let n = last.index() + 1;
        let start = self.reg_i.addr();
        let end = check_span(self.reg_i, n)?;
        for (dest, src) in self.mem[start..end].iter_mut().zip(self.regs.iter()) {
            *dest = src.0;
        }
        Ok(())
    }

    /// Fills `V0` through `last` (inclusive) from memory starting at `I`.
    ///
    /// `I` itself is left unchanged.
    pub fn load_registers(&mut self, last: Register) -> Result<(), AddressOutOfRangeError> {
        let n = last.index() + 1;
        let start = self.reg_i.addr();
        let end = check_span(self.reg_i, n)?;
        for (dest, src) in self.regs.iter_mut().zip(self.mem[start..end].iter()) {
            *dest = Wrapping(*src);
        }
        Ok(())
    }

    /// Returns the number of return addresses on the call stack.
    pub fn stack_depth(&self) -> usize {
        self.sp
    }

    /// Pushes a return address.
    pub fn push(&mut self, ret: Address) -> Result<(), StackOverflowError> {
        if self.sp == STACK_SIZE {
            return Err(StackOverflowError(self.sp));
        }
        self.stack[self.sp] = ret;
        self.sp += 1;
        Ok(())
    }

    /// Pops the most recent return address.
    pub fn pop(&mut self) -> Result<Address, StackUnderflowError> {
        if self.sp == 0 {
            return Err(StackUnderflowError);
        }
        self.sp -= 1;
        Ok(self.stack[self.sp])
    }
}

impl Default for Machine {
    fn default() -> Self {
        Machine::new()
    }
}

/// Returns the exclusive end of the span `[start, start + len)`, or an error
/// naming the last byte if it runs past the end of memory.
fn check_span(start: Address, len: usize) -> Result<usize, AddressOutOfRangeError> {
    let end = start.addr() + len;
    if end > MEM_SIZE {
        Err(AddressOutOfRangeError(end - 1))
    } else {
        Ok(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_is_loaded() {
        let machine = Machine::new();
        // Glyph "0" and glyph "F".
        assert_eq!(&machine.mem()[0..5], &[0xF0, 0x90, 0x90, 0x90, 0xF0]);
        assert_eq!(&machine.mem()[75..80], &[0xF0, 0x80, 0xF0, 0x80, 0x80]);
        assert_eq!(machine.pc().addr(), PROG_START);
        assert_eq!(machine.stack_depth(), 0);
    }

    #[test]
    fn load_program() {
        let mut machine = Machine::new();
        machine.load_program(&[0x6A, 0x05, 0x12, 0x00]).unwrap();
        assert_eq!(machine.fetch(), Opcode(0x6A05));

        let full = vec![0xAAu8; PROG_SIZE];
        assert!(machine.load_program(&full).is_ok());
        assert_eq!(machine.mem()[MEM_SIZE - 1], 0xAA);

        let too_big = vec![0u8; PROG_SIZE + 1];
        assert_eq!(
            machine.load_program(&too_big),
            Err(ProgramTooLargeError(PROG_SIZE + 1))
        );
    }

    #[test]
    fn stack_limits() {
        let mut machine = Machine::new();
        assert_eq!(machine.pop(), Err(StackUnderflowError));

        for n in 0..STACK_SIZE {
            machine.push(Address::wrapping(0x200 + 2 * n)).unwrap();
        }
        assert_eq!(
            machine.push(Address::wrapping(0x300)),
            Err(StackOverflowError(STACK_SIZE))
        );
        assert_eq!(machine.pop(), Ok(Address::wrapping(0x200 + 2 * (STACK_SIZE - 1))));
        assert_eq!(machine.stack_depth(), STACK_SIZE - 1);
    }

    #[test]
    fn jump_bounds() {
        let mut machine = Machine::new();

        // Test cases, in the format (target, accepted).
        let cases = [
            (0x200, true),
            (0xFFE, true),
            (0x1FE, false),
            (0x201, false),
            (0xFFF, false),
        ];

        for &(target, accepted) in cases.iter() {
            let result = machine.jump(Address::wrapping(target));
            assert_eq!(result.is_ok(), accepted, "case {:#05X}", target);
        }

        machine.jump(Address::wrapping(0xFFE)).unwrap();
        let err = machine.advance().unwrap_err();
        assert_eq!(
            err.downcast_ref::<AddressOutOfRangeError>(),
            Some(&AddressOutOfRangeError(0x1000))
        );
    }

    #[test]
    fn register_block_transfer() {
        let mut machine = Machine::new();
        for n in 0..16 {
            machine.set_register(Register::from_nibble(n), n + 1);
        }
        machine.set_i(Address::wrapping(0x300));
        machine.store_registers(Register::V3).unwrap();
        assert_eq!(&machine.mem()[0x300..0x305], &[1, 2, 3, 4, 0]);
        assert_eq!(machine.i().addr(), 0x300);

        machine.mem_mut()[0x300] = 0xAB;
        machine.load_registers(Register::V0).unwrap();
        assert_eq!(machine.register(Register::V0), 0xAB);
        assert_eq!(machine.register(Register::V1), 2);

        // Sixteen registers from 0xFF0 end exactly at the top of memory.
        machine.set_i(Address::wrapping(0xFF0));
        assert!(machine.store_registers(Register::VF).is_ok());
        machine.set_i(Address::wrapping(0xFF1));
        assert_eq!(
            machine.load_registers(Register::VF),
            Err(AddressOutOfRangeError(0x1000))
        );
    }

    #[test]
    fn checked_slices() {
        let mut machine = Machine::new();
        assert_eq!(machine.slice(Address::wrapping(0xFFD), 3).map(|s| s.len()), Ok(3));
        assert_eq!(
            machine.slice(Address::wrapping(0xFFE), 3).map(|s| s.len()),
            Err(AddressOutOfRangeError(0x1000))
        );
        assert!(machine.slice_mut(Address::wrapping(0xFFF), 0).is_ok());
    }
}
