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

//! Chip-8 instructions and opcodes.
//!
//! This module provides the basic types for working with Chip-8 opcodes and
//! the decode table that turns a raw 16-bit opcode into the internal
//! `Instruction` type.  Decoding dispatches on the high nibble first, and then
//! (for the `0`, `8`, `E` and `F` families only) on a secondary selector.
//! Operands are always taken from fixed bit positions, so decoding itself
//! never needs to look at machine state.

use std::fmt;
use std::ops::Add;

use num::traits::FromPrimitive;

use MEM_SIZE;

/// An error resulting from an address outside of the addressable range.
#[derive(Debug, Fail, PartialEq, Eq)]
#[fail(display = "address out of range: {:#05X}", _0)]
pub struct AddressOutOfRangeError(pub usize);

/// An error resulting from a misaligned program counter target.
#[derive(Debug, Fail, PartialEq, Eq)]
#[fail(display = "misaligned address: {:#05X}", _0)]
pub struct AddressMisalignedError(pub usize);

enum_from_primitive! {
/// A Chip-8 register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    V0 = 0,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8,
    V9,
    VA,
    VB,
    VC,
    VD,
    VE,
    VF
}
}

impl Register {
    /// Returns the register named by the lowest four bits of `n`.
    pub fn from_nibble(n: u8) -> Register {
        Register::from_u8(n & 0xF).unwrap_or(Register::V0)
    }

    /// Returns the index of the register (0 for `V0`, 15 for `VF`).
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", *self)
    }
}

/// A Chip-8 opcode.
///
/// Having this as a wrapper around an ordinary `u16` allows for some nice
/// helper methods to be implemented, which make decoding opcodes much easier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode(pub u16);

impl Opcode {
    /// Combines two memory bytes (big-endian) into an opcode.
    pub fn from_bytes(high: u8, low: u8) -> Self {
        Opcode((high as u16) << 8 | low as u16)
    }

    /// Returns the high nibble, which selects the opcode family.
    pub fn family(&self) -> u8 {
        (self.0 >> 12) as u8
    }

    /// Returns the `Vx` register (bits 8-11).
    ///
    /// This does not guarantee that the result is actually meaningful.
    pub fn vx(&self) -> Register {
        Register::from_nibble((self.0 >> 8) as u8)
    }

    /// Returns the `Vy` register (bits 4-7).
    ///
    /// This does not guarantee that the result is actually meaningful.
    pub fn vy(&self) -> Register {
        Register::from_nibble((self.0 >> 4) as u8)
    }

    /// Returns the lowest nibble.
    pub fn nibble(&self) -> u8 {
        self.0 as u8 & 0xF
    }

    /// Returns the low byte (`kk`).
    pub fn byte(&self) -> u8 {
        self.0 as u8
    }

    /// Returns the low 12 bits (`nnn`) as an address.
    ///
    /// Twelve bits always fit in memory, so this cannot fail.
    pub fn addr(&self) -> Address {
        Address::wrapping(self.0 as usize & 0xFFF)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{:04X}", self.0)
    }
}

/// An address pointing to a Chip-8 memory location.
///
/// Any instance of this type is guaranteed to lie within memory.  Whether an
/// address is a valid program counter (even, and inside the program area) is
/// checked separately when control is transferred.
///
/// # Examples
///
/// ```
/// use chip8vm::Address;
///
/// let addr = Address::from_u16(0x204).unwrap();
/// assert_eq!(addr.addr(), 0x204);
/// assert!(Address::from_u16(0x1000).is_err());
/// assert_eq!(Address::wrapping(0x1003).addr(), 0x003);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Address(usize);

impl Address {
    /// Verifies whether the given `u16` address value is valid, returning the
    /// corresponding `Address` if it is.
    pub fn from_u16(addr: u16) -> Result<Self, AddressOutOfRangeError> {
        Address::from_usize(addr as usize)
    }

    /// Verifies whether the given `usize` address is valid, returning the
    /// corresponding `Address` if it is.
    pub fn from_usize(addr: usize) -> Result<Self, AddressOutOfRangeError> {
        if addr >= MEM_SIZE {
            Err(AddressOutOfRangeError(addr))
        } else {
            Ok(Address(addr))
        }
    }

    /// Returns the address `addr` modulo the memory size.
    pub fn wrapping(addr: usize) -> Self {
        Address(addr % MEM_SIZE)
    }

    /// Returns the value of the address.
    pub fn addr(&self) -> usize {
        self.0
    }

    /// Returns the address unchanged if it is aligned to a 2-byte boundary,
    /// and an error if not.
    pub fn aligned(&self) -> Result<Self, AddressMisalignedError> {
        if self.0 & 1 == 0 {
            Ok(*self)
        } else {
            Err(AddressMisalignedError(self.0))
        }
    }
}

impl Add<usize> for Address {
    type Output = Result<Self, AddressOutOfRangeError>;

    fn add(self, rhs: usize) -> Self::Output {
        Address::from_usize(self.0 + rhs)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#05X}", self.0)
    }
}

/// A Chip-8 instruction.
///
/// This is the decoded form of the 35 base opcodes.  Having this type as an
/// intermediate stage keeps bit twiddling out of the executor, and a value of
/// this type is always a member of the decode table.
///
/// # Examples
///
/// ```
/// use chip8vm::{Instruction, Opcode, Register};
///
/// let instr = Instruction::decode(Opcode(0x7510)).unwrap();
/// assert_eq!(instr, Instruction::AddByte(Register::V5, 0x10));
/// assert!(Instruction::decode(Opcode(0x800F)).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// `SYS addr` (`0nnn`), ignored.
    Sys(Address),
    /// `CLS` (`00E0`).
    Cls,
    /// `RET` (`00EE`).
    Ret,
    /// `JP addr` (`1nnn`).
    Jp(Address),
    /// `CALL addr` (`2nnn`).
    Call(Address),
    /// `SE Vx, byte` (`3xkk`).
    SeByte(Register, u8),
    /// `SNE Vx, byte` (`4xkk`).
    SneByte(Register, u8),
    /// `SE Vx, Vy` (`5xy0`).
    SeReg(Register, Register),
    /// `LD Vx, byte` (`6xkk`).
    LdByte(Register, u8),
    /// `ADD Vx, byte` (`7xkk`).
    AddByte(Register, u8),
    /// `LD Vx, Vy` (`8xy0`).
    LdReg(Register, Register),
    /// `OR Vx, Vy` (`8xy1`).
    Or(Register, Register),
    /// `AND Vx, Vy` (`8xy2`).
    And(Register, Register),
    /// `XOR Vx, Vy` (`8xy3`).
    Xor(Register, Register),
    /// `ADD Vx, Vy` (`8xy4`).
    AddReg(Register, Register),
    /// `SUB Vx, Vy` (`8xy5`).
    Sub(Register, Register),
    /// `SHR Vx` (`8xy6`).
    Shr(Register),
    /// `SUBN Vx, Vy` (`8xy7`).
    Subn(Register, Register),
    /// `SHL Vx` (`8xyE`).
    Shl(Register),
    /// `SNE Vx, Vy` (`9xy0`).
    SneReg(Register, Register),
    /// `LD I, addr` (`Annn`).
    LdI(Address),
    /// `JP V0, addr` (`Bnnn`).
    JpV0(Address),
    /// `RND Vx, byte` (`Cxkk`).
    Rnd(Register, u8),
    /// `DRW Vx, Vy, nibble` (`Dxyn`).
    Drw(Register, Register, u8),
    /// `SKP Vx` (`Ex9E`).
    Skp(Register),
    /// `SKNP Vx` (`ExA1`).
    Sknp(Register),
    /// `LD Vx, DT` (`Fx07`).
    LdRegDt(Register),
    /// `LD Vx, K` (`Fx0A`).
    LdKey(Register),
    /// `LD DT, Vx` (`Fx15`).
    LdDtReg(Register),
    /// `LD ST, Vx` (`Fx18`).
    LdSt(Register),
    /// `ADD I, Vx` (`Fx1E`).
    AddI(Register),
    /// `LD F, Vx` (`Fx29`).
    LdF(Register),
    /// `LD B, Vx` (`Fx33`).
    LdB(Register),
    /// `LD [I], Vx` (`Fx55`).
    LdDerefIReg(Register),
    /// `LD Vx, [I]` (`Fx65`).
    LdRegDerefI(Register),
}

impl Instruction {
    /// Returns the instruction corresponding to the given opcode, or `None`
    /// if the opcode is not in the decode table.
    ///
    /// Every `0nnn` opcode other than `00E0` and `00EE` decodes to `Sys`,
    /// which the interpreter treats as a no-op.
    pub fn decode(opcode: Opcode) -> Option<Self> {
        use self::Instruction::*;

        let (vx, vy) = (opcode.vx(), opcode.vy());
        Some(match opcode.family() {
            0x0 => match opcode.0 {
                0x00E0 => Cls,
                0x00EE => Ret,
                _ => Sys(opcode.addr()),
            },
            0x1 => Jp(opcode.addr()),
            0x2 => Call(opcode.addr()),
            0x3 => SeByte(vx, opcode.byte()),
            0x4 => SneByte(vx, opcode.byte()),
            0x5 => SeReg(vx, vy),
            0x6 => LdByte(vx, opcode.byte()),
            0x7 => AddByte(vx, opcode.byte()),
            0x8 => match opcode.nibble() {
                0x0 => LdReg(vx, vy),
                0x1 => Or(vx, vy),
                0x2 => And(vx, vy),
                0x3 => Xor(vx, vy),
                0x4 => AddReg(vx, vy),
                0x5 => Sub(vx, vy),
                0x6 => Shr(vx),
                0x7 => Subn(vx, vy),
                0xE => Shl(vx),
                _ => return None,
            },
            0x9 => SneReg(vx, vy),
            0xA => LdI(opcode.addr()),
            0xB => JpV0(opcode.addr()),
            0xC => Rnd(vx, opcode.byte()),
            0xD => Drw(vx, vy, opcode.nibble()),
            0xE => match opcode.byte() {
                0x9E => Skp(vx),
                0xA1 => Sknp(vx),
                _ => return None,
            },
            0xF => match opcode.byte() {
                0x07 => LdRegDt(vx),
                0x0A => LdKey(vx),
                0x15 => LdDtReg(vx),
                0x18 => LdSt(vx),
                0x1E => AddI(vx),
                0x29 => LdF(vx),
                0x33 => LdB(vx),
                0x55 => LdDerefIReg(vx),
                0x65 => LdRegDerefI(vx),
                _ => return None,
            },
            _ => unreachable!("4-bit quantity didn't match 0-15"),
        })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::Instruction::*;

        match *self {
            Sys(addr) => write!(f, "SYS {}", addr),
            Cls => write!(f, "CLS"),
            Ret => write!(f, "RET"),
            Jp(addr) => write!(f, "JP {}", addr),
            Call(addr) => write!(f, "CALL {}", addr),
            SeByte(reg, b) => write!(f, "SE {}, #{:02X}", reg, b),
            SneByte(reg, b) => write!(f, "SNE {}, #{:02X}", reg, b),
            SeReg(reg1, reg2) => write!(f, "SE {}, {}", reg1, reg2),
            LdByte(reg, b) => write!(f, "LD {}, #{:02X}", reg, b),
            AddByte(reg, b) => write!(f, "ADD {}, #{:02X}", reg, b),
            LdReg(reg1, reg2) => write!(f, "LD {}, {}", reg1, reg2),
            Or(reg1, reg2) => write!(f, "OR {}, {}", reg1, reg2),
            And(reg1, reg2) => write!(f, "AND {}, {}", reg1, reg2),
            Xor(reg1, reg2) => write!(f, "XOR {}, {}", reg1, reg2),
            AddReg(reg1, reg2) => write!(f, "ADD {}, {}", reg1, reg2),
            Sub(reg1, reg2) => write!(f, "SUB {}, {}", reg1, reg2),
            Shr(reg) => write!(f, "SHR {}", reg),
            Subn(reg1, reg2) => write!(f, "SUBN {}, {}", reg1, reg2),
            Shl(reg) => write!(f, "SHL {}", reg),
            SneReg(reg1, reg2) => write!(f, "SNE {}, {}", reg1, reg2),
            LdI(addr) => write!(f, "LD I, {}", addr),
            JpV0(addr) => write!(f, "JP V0, {}", addr),
            Rnd(reg, b) => write!(f, "RND {}, #{:02X}", reg, b),
            Drw(reg1, reg2, n) => write!(f, "DRW {}, {}, {}", reg1, reg2, n),
            Skp(reg) => write!(f, "SKP {}", reg),
            Sknp(reg) => write!(f, "SKNP {}", reg),
            LdRegDt(reg) => write!(f, "LD {}, DT", reg),
            LdKey(reg) => write!(f, "LD {}, K", reg),
            LdDtReg(reg) => write!(f, "LD DT, {}", reg),
            LdSt(reg) => write!(f, "LD ST, {}", reg),
            AddI(reg) => write!(f, "ADD I, {}", reg),
            LdF(reg) => write!(f, "LD F, {}", reg),
            LdB(reg) => write!(f, "LD B, {}", reg),
            LdDerefIReg(reg) => write!(f, "LD [I], {}", reg),
            LdRegDerefI(reg) => write!(f, "LD {}, [I]", reg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(a: usize) -> Address {
        Address::from_usize(a).unwrap()
    }

    /// Tests that opcodes decode to the expected instructions.
    #[test]
    fn decode_table() {
        use instruction::Instruction::*;
        use instruction::Register::*;

        let cases = [
            (0x00E0, Cls),
            (0x00EE, Ret),
            (0x0123, Sys(addr(0x123))),
            (0x1ABC, Jp(addr(0xABC))),
            (0x2300, Call(addr(0x300))),
            (0x3A05, SeByte(VA, 0x05)),
            (0x4B10, SneByte(VB, 0x10)),
            (0x5120, SeReg(V1, V2)),
            (0x6A05, LdByte(VA, 0x05)),
            (0x7EFF, AddByte(VE, 0xFF)),
            (0x8AB0, LdReg(VA, VB)),
            (0x8AB1, Or(VA, VB)),
            (0x8AB2, And(VA, VB)),
            (0x8AB3, Xor(VA, VB)),
            (0x8AB4, AddReg(VA, VB)),
            (0x8AB5, Sub(VA, VB)),
            (0x8AB6, Shr(VA)),
            (0x8AB7, Subn(VA, VB)),
            (0x8ABE, Shl(VA)),
            (0x9CD0, SneReg(VC, VD)),
            (0xA2F0, LdI(addr(0x2F0))),
            (0xB400, JpV0(addr(0x400))),
            (0xC30F, Rnd(V3, 0x0F)),
            (0xD125, Drw(V1, V2, 5)),
            (0xE49E, Skp(V4)),
            (0xE5A1, Sknp(V5)),
            (0xF607, LdRegDt(V6)),
            (0xF70A, LdKey(V7)),
            (0xF815, LdDtReg(V8)),
            (0xF918, LdSt(V9)),
            (0xFA1E, AddI(VA)),
            (0xFB29, LdF(VB)),
            (0xFC33, LdB(VC)),
            (0xFD55, LdDerefIReg(VD)),
            (0xFE65, LdRegDerefI(VE)),
        ];

        for &(op, expected) in cases.iter() {
            assert_eq!(
                Instruction::decode(Opcode(op)),
                Some(expected),
                "case {:#06X}",
                op
            );
        }
    }

    /// Tests that opcodes outside the decode table are rejected.
    #[test]
    fn decode_malformed() {
        let cases = [0x8008, 0x800D, 0x80FF, 0xE000, 0xE19F, 0xF000, 0xF0FF, 0xF130];

        for &op in cases.iter() {
            assert_eq!(Instruction::decode(Opcode(op)), None, "case {:#06X}", op);
        }
    }

    /// Tests that the low nibble of `5xy0` and `9xy0` is not used for dispatch.
    #[test]
    fn decode_ignores_low_nibble_of_register_skips() {
        use instruction::Register::*;

        assert_eq!(
            Instruction::decode(Opcode(0x5127)),
            Some(Instruction::SeReg(V1, V2))
        );
        assert_eq!(
            Instruction::decode(Opcode(0x912F)),
            Some(Instruction::SneReg(V1, V2))
        );
    }

    #[test]
    fn opcode_operands() {
        let op = Opcode::from_bytes(0xD1, 0x25);
        assert_eq!(op, Opcode(0xD125));
        assert_eq!(op.family(), 0xD);
        assert_eq!(op.vx(), Register::V1);
        assert_eq!(op.vy(), Register::V2);
        assert_eq!(op.nibble(), 0x5);
        assert_eq!(op.byte(), 0x25);
        assert_eq!(op.addr().addr(), 0x125);
        // Register operands only look at their own nibble.
        assert_eq!(Opcode(0x1FF0).vx(), Register::VF);
        assert_eq!(Register::from_nibble(0x3A), Register::VA);
        assert_eq!(Register::VF.index(), 15);
    }

    #[test]
    fn address_bounds() {
        assert_eq!(Address::from_usize(0xFFF).map(|a| a.addr()), Ok(0xFFF));
        assert_eq!(Address::from_usize(0x1000), Err(AddressOutOfRangeError(0x1000)));
        assert_eq!(addr(0xFFE) + 2, Err(AddressOutOfRangeError(0x1000)));
        assert_eq!(addr(0x201).aligned(), Err(AddressMisalignedError(0x201)));
        assert_eq!(Address::wrapping(0x1003), addr(0x003));
    }

    #[test]
    fn mnemonics() {
        use instruction::Register::*;

        let cases = [
            (Instruction::Jp(addr(0x300)), "JP 0x300"),
            (Instruction::SeByte(VA, 5), "SE VA, #05"),
            (Instruction::Drw(V0, V1, 15), "DRW V0, V1, 15"),
            (Instruction::LdRegDerefI(VF), "LD VF, [I]"),
        ];

        for &(ins, text) in cases.iter() {
            assert_eq!(ins.to_string(), text, "case {:?}", ins);
        }
    }
}
