//! Fetch/decode/execute core for the LC-3 instruction set: 65536 words of
//! memory, the register file, and the GETC/OUT/PUTS/HALT trap handlers.
//! Host-facing concerns (terminal raw mode, a CLI, a disassembler) live
//! outside this crate; `Machine` only needs something that implements
//! `Read` for console input and `Write` for console output.

mod error;
mod instruction;
mod machine;
mod memory;
mod opcode;
mod peek_reader;
mod registers;
mod sign_extend;
mod trap_vector;

pub use crate::error::{ExecError, LoadError};
pub use crate::machine::{Machine, RunState};
pub use crate::registers::{Condition, Register};
