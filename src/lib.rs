/*
 * Copyright 2018 Ian Johnson
 *
 * This is free software, distributed under the MIT license.  A copy of the
 * license can be found in the LICENSE file in the project root, or at
 * https://opensource.org/licenses/MIT.
 */

//! A Chip-8 interpreter core.
//!
//! The crate is split into the machine state (`machine`), the instruction
//! decoder (`instruction`), the executor (`interpreter`) and a fixed-rate run
//! loop (`scheduler`).  Peripherals are consumed through the capability traits
//! in `display`, `input` and `sound`, so that a front-end can supply whatever
//! window, terminal or test double it likes.

#[macro_use]
extern crate enum_primitive;
extern crate failure;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;
extern crate num;
extern crate rand;
extern crate time;

/// The size of the Chip-8's memory, in bytes.
pub const MEM_SIZE: usize = 0x1000;
/// The address where programs should be loaded.
pub const PROG_START: usize = 0x200;
/// The maximum size of a Chip-8 program, in bytes.
pub const PROG_SIZE: usize = MEM_SIZE - PROG_START;
/// The address where the hex digit font is stored.
pub const FONT_START: usize = 0x0;
/// The number of return addresses the call stack can hold.
pub const STACK_SIZE: usize = 16;

pub mod display;
pub mod input;
pub mod instruction;
pub mod interpreter;
pub mod machine;
pub mod options;
pub mod scheduler;
pub mod sound;
pub mod timer;

pub use instruction::{Address, AddressMisalignedError, AddressOutOfRangeError, Instruction,
                      Opcode, Register};
pub use interpreter::{Interpreter, InvalidKeyIndexError, MalformedInstructionError};
pub use machine::{Machine, ProgramTooLargeError, StackOverflowError, StackUnderflowError};
pub use options::Options;
pub use scheduler::{Clock, Scheduler, SystemClock};
