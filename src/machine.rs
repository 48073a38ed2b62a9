use byteorder::{BigEndian, ByteOrder};
use std::io::{Read, Write};

use crate::error::{ExecError, LoadError};
use crate::instruction::Instruction;
use crate::memory::{Memory, USER_MEMORY_LIMIT};
use crate::peek_reader::PeekReader;
use crate::registers::{Condition, Register, Registers};
use crate::sign_extend::SignExtend;
use crate::trap_vector::TrapVector;

/// Whether the machine is still executing. HALT is the only transition out
/// of `Running`, and it is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Halted,
}

/// A single LC-3 core: memory, registers, run state, and the host streams
/// traps read from and write to.
///
/// `I` and `O` are the host's input and output streams. Construction reads
/// the program from a third, short-lived `Read` that isn't retained —
/// loading only happens once, at `new`.
pub struct Machine<I, O> {
    memory: Memory,
    registers: Registers,
    input: PeekReader<I>,
    output: O,
    state: RunState,
}

impl<I: Read, O: Write> Machine<I, O> {
    /// Loads a program from a big-endian 16-bit word stream: the first
    /// word is the origin and becomes PC, subsequent words fill memory
    /// starting there. Stops at EOF or after writing 0xFDFF. `input` and
    /// `output` are the host console streams traps use; they are borrowed
    /// for the machine's lifetime, never closed by it.
    pub fn new<P: Read>(mut program: P, input: I, output: O) -> Result<Self, LoadError> {
        let origin = read_word(&mut program)?.ok_or(LoadError::TooShort)?;

        let mut memory = Memory::new();
        let mut address = origin;
        while let Some(word) = read_word(&mut program)? {
            memory.write(address, word);
            if address == USER_MEMORY_LIMIT {
                break;
            }
            address = address.wrapping_add(1);
        }

        let mut registers = Registers::new();
        registers.write(Register::PC, origin);
        registers.write(Register::COND, Condition::Z as u16);

        log::debug!("loaded program at origin {:#06x}", origin);

        Ok(Self {
            memory,
            registers,
            input: PeekReader::new(input),
            output,
            state: RunState::Running,
        })
    }

    /// One fetch-decode-execute cycle. Fails with `NotRunning` if the
    /// machine has halted. A malformed or unimplemented instruction is
    /// rejected before PC moves, so PC still points at the offending word
    /// afterwards.
    pub fn step(&mut self) -> Result<(), ExecError> {
        if self.state != RunState::Running {
            return Err(ExecError::NotRunning);
        }

        let pc = self.registers.read(Register::PC);
        let word = self.memory.read_gated(pc, &mut self.input)?;
        let instruction = Instruction::decode(word)?;

        log::trace!("pc={:#06x} word={:#06x}", pc, word);

        self.registers.write(Register::PC, pc.wrapping_add(1));

        self.execute(instruction)
    }

    /// Steps until halted or an error occurs.
    pub fn run(&mut self) -> Result<(), ExecError> {
        while self.state == RunState::Running {
            self.step()?;
        }
        Ok(())
    }

    /// Reads through the Memory I/O Gate: a read of 0xFE00 (KBSR) probes
    /// the host input stream and may latch a byte into KBDR as a side
    /// effect. A probe failure on a broken stream is treated the same as
    /// "no byte available" rather than propagated, matching `read_memory`'s
    /// infallible signature.
    pub fn read_memory(&mut self, address: u16) -> u16 {
        self.memory
            .read_gated(address, &mut self.input)
            .unwrap_or(0)
    }

    /// Plain write; never triggers device behavior.
    pub fn write_memory(&mut self, address: u16, value: u16) {
        self.memory.write(address, value);
    }

    pub fn read_register(&self, register: Register) -> u16 {
        self.registers.read(register)
    }

    pub fn write_register(&mut self, register: Register, value: u16) {
        self.registers.write(register, value);
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Side-effect-free memory read for tests and inspection; never
    /// triggers the KBSR/KBDR gate.
    pub fn peek_memory(&self, address: u16) -> u16 {
        self.memory.read_raw(address)
    }

    fn execute(&mut self, instruction: Instruction) -> Result<(), ExecError> {
        use Instruction::*;

        match instruction {
            // BR - Conditional Branch
            //
            // Assembler Formats
            //
            //      BRn     LABEL   BRzp    LABEL
            //      BRz     LABEL   BRnp    LABEL
            //      BRp     LABEL   BRnz    LABEL
            //      BR      LABEL   BRnzp   LABEL
            //
            // Description
            //
            // The condition codes specified by bits [11:9] are tested. If any of the
            // condition codes tested is set, the program branches to the location
            // specified by adding the sign-extended pc_offset9 field to the
            // incremented PC.
            Br { n, z, p, pc_offset } => {
                let cond = self.registers.read(Register::COND);
                let taken = (n && cond == Condition::N as u16)
                    || (z && cond == Condition::Z as u16)
                    || (p && cond == Condition::P as u16);

                if taken {
                    let pc = self.registers.read(Register::PC);
                    self.registers
                        .write(Register::PC, pc.wrapping_add(pc_offset.sign_extend(9)));
                }
            }

            // ADD - Addition
            //
            // Assembler Formats
            //
            //      ADD DR, SR1, SR2
            //      ADD DR, SR1, imm5
            //
            // Description
            //
            // The second source operand is obtained from SR2 (register mode) or by
            // sign-extending imm5 to 16 bits (immediate mode), added to SR1, and the
            // result stored in DR. The condition codes are set based on the sign of
            // the result.
            Add { dr, sr1, sr2 } => {
                let value = self
                    .registers
                    .read(sr1)
                    .wrapping_add(self.registers.read(sr2));
                self.registers.write(dr, value);
                self.registers.update_flags(dr);
            }

            AddImm { dr, sr1, imm5 } => {
                let value = self.registers.read(sr1).wrapping_add(imm5);
                self.registers.write(dr, value);
                self.registers.update_flags(dr);
            }

            // LD - Load
            //
            // Assembler Format
            //
            //      LD DR, LABEL
            //
            // Description
            //
            // An address is computed by sign-extending bits [8:0] to 16 bits and
            // adding this value to the incremented PC. The contents of memory at
            // this address are loaded into DR. The condition codes are set based on
            // the sign of the value loaded.
            Ld { dr, pc_offset } => {
                let address = self
                    .registers
                    .read(Register::PC)
                    .wrapping_add(pc_offset.sign_extend(9));
                let value = self.memory.read_gated(address, &mut self.input)?;
                self.registers.write(dr, value);
                self.registers.update_flags(dr);
            }

            // ST - Store
            //
            // Assembler Format
            //
            //      ST SR, LABEL
            //
            // Description
            //
            // The contents of SR are stored at the address computed by
            // sign-extending bits [8:0] to 16 bits and adding this value to the
            // incremented PC. No condition codes are affected.
            St { sr, pc_offset } => {
                let address = self
                    .registers
                    .read(Register::PC)
                    .wrapping_add(pc_offset.sign_extend(9));
                self.memory.write(address, self.registers.read(sr));
            }

            // JSR / JSRR - Jump to Subroutine
            //
            // Assembler Formats
            //
            //      JSR LABEL
            //      JSRR BaseR
            //
            // Description
            //
            // The incremented PC is saved in R7 (the linkage back to the calling
            // routine). Then PC is loaded with the address of the subroutine's
            // first instruction: for JSR, the incremented PC plus the
            // sign-extended 11-bit offset; for JSRR, the contents of BaseR. No
            // condition codes are affected.
            Jsr { pc_offset } => {
                let pc = self.registers.read(Register::PC);
                self.registers.write(Register::R7, pc);
                self.registers
                    .write(Register::PC, pc.wrapping_add(pc_offset.sign_extend(11)));
            }

            Jsrr { base_r } => {
                let pc = self.registers.read(Register::PC);
                let target = self.registers.read(base_r);
                self.registers.write(Register::R7, pc);
                self.registers.write(Register::PC, target);
            }

            // AND - Bit-wise Logical AND
            //
            // Assembler Formats
            //
            //      AND DR, SR1, SR2
            //      AND DR, SR1, imm5
            //
            // Description
            //
            // The second source operand (SR2, or the sign-extended imm5) is
            // bit-wise ANDed with SR1 and the result stored in DR. The condition
            // codes are set based on the sign of the result.
            And { dr, sr1, sr2 } => {
                let value = self.registers.read(sr1) & self.registers.read(sr2);
                self.registers.write(dr, value);
                self.registers.update_flags(dr);
            }

            AndImm { dr, sr1, imm5 } => {
                let value = self.registers.read(sr1) & imm5;
                self.registers.write(dr, value);
                self.registers.update_flags(dr);
            }

            // LDR - Load Base+offset
            //
            // Assembler Format
            //
            //      LDR DR, BaseR, offset6
            //
            // Description
            //
            // An address is computed by sign-extending bits [5:0] to 16 bits and
            // adding this value to BaseR. The contents of memory at this address
            // are loaded into DR. The condition codes are set based on the sign of
            // the value loaded.
            Ldr { dr, base_r, offset } => {
                let address = self
                    .registers
                    .read(base_r)
                    .wrapping_add(offset.sign_extend(6));
                let value = self.memory.read_gated(address, &mut self.input)?;
                self.registers.write(dr, value);
                self.registers.update_flags(dr);
            }

            // STR - Store Base+offset
            //
            // Assembler Format
            //
            //      STR SR, BaseR, offset6
            //
            // Description
            //
            // The contents of SR are stored at the address computed by
            // sign-extending bits [5:0] to 16 bits and adding this value to BaseR.
            // No condition codes are affected.
            Str { sr, base_r, offset } => {
                let address = self
                    .registers
                    .read(base_r)
                    .wrapping_add(offset.sign_extend(6));
                self.memory.write(address, self.registers.read(sr));
            }

            // NOT - Bit-Wise Complement
            //
            // Assembler Format
            //
            //      NOT DR, SR
            //
            // Description
            //
            // The bit-wise complement of SR is stored in DR. The condition codes
            // are set based on the sign of the result.
            Not { dr, sr } => {
                let value = !self.registers.read(sr);
                self.registers.write(dr, value);
                self.registers.update_flags(dr);
            }

            // LDI - Load Indirect
            //
            // Assembler Format
            //
            //      LDI DR, LABEL
            //
            // Description
            //
            // An address is computed by sign-extending bits [8:0] to 16 bits and
            // adding this value to the incremented PC. What is stored in memory at
            // this address is the address of the data to load into DR. The
            // condition codes are set based on the sign of the value loaded.
            Ldi { dr, pc_offset } => {
                let pointer_address = self
                    .registers
                    .read(Register::PC)
                    .wrapping_add(pc_offset.sign_extend(9));
                let address = self.memory.read_gated(pointer_address, &mut self.input)?;
                let value = self.memory.read_gated(address, &mut self.input)?;
                self.registers.write(dr, value);
                self.registers.update_flags(dr);
            }

            // STI - Store Indirect
            //
            // Assembler Format
            //
            //      STI SR, LABEL
            //
            // Description
            //
            // Bits [8:0] are sign-extended and added to the incremented PC; what is
            // in memory at that address is the address to which SR is stored. No
            // condition codes are affected.
            Sti { sr, pc_offset } => {
                let pointer_address = self
                    .registers
                    .read(Register::PC)
                    .wrapping_add(pc_offset.sign_extend(9));
                let address = self.memory.read_gated(pointer_address, &mut self.input)?;
                self.memory.write(address, self.registers.read(sr));
            }

            // JMP / RET - Jump
            //
            // Assembler Formats
            //
            //      JMP BaseR
            //      RET
            //
            // Description
            //
            // The program unconditionally jumps to the address in BaseR. RET is the
            // special case BaseR = R7, the linkage back to the instruction
            // following the subroutine call. No condition codes are affected.
            Jmp { base_r } => {
                let target = self.registers.read(base_r);
                self.registers.write(Register::PC, target);
            }

            // LEA - Load Effective Address
            //
            // Assembler Format
            //
            //      LEA DR, LABEL
            //
            // Description
            //
            // An address is computed by sign-extending bits [8:0] to 16 bits and
            // adding this value to the incremented PC; this address itself (not the
            // memory it points to) is loaded into DR. The condition codes are set
            // based on the sign of the address.
            Lea { dr, pc_offset } => {
                let address = self
                    .registers
                    .read(Register::PC)
                    .wrapping_add(pc_offset.sign_extend(9));
                self.registers.write(dr, address);
            }

            // TRAP - System Call
            //
            // Assembler Format
            //
            //      TRAP trapvector8
            //
            // Description
            //
            // Dispatches to the host-console service routine named by instr[7:0];
            // see `execute_trap` for the four implemented vectors. No condition
            // codes are affected.
            Trap(vector) => self.execute_trap(vector)?,
        }

        Ok(())
    }

    fn execute_trap(&mut self, vector: TrapVector) -> Result<(), ExecError> {
        match vector {
            // GETC (x20) - read a single character from the keyboard. The
            // character is not echoed. Its ASCII code is copied into R0 with the
            // high eight bits cleared.
            TrapVector::Getc => {
                let byte = self.input.read_byte()?;
                self.registers.write(Register::R0, u16::from(byte));
            }

            // OUT (x21) - write the character in R0[7:0] to the console display.
            TrapVector::Out => {
                let byte = (self.registers.read(Register::R0) & 0xFF) as u8;
                self.output.write_all(&[byte])?;
            }

            // PUTS (x22) - write a string of ASCII characters to the console
            // display, one character per memory location, starting at the
            // address in R0. Writing terminates at a 0 word or the end of the
            // user memory region. Unlike the reference implementation, a cell
            // whose value doesn't fit in a byte is rejected rather than
            // silently truncated (spec mandate, not historical LC-3 behavior).
            TrapVector::Puts => {
                let mut address = self.registers.read(Register::R0);
                let mut bytes = Vec::new();

                loop {
                    let value = self.memory.read_gated(address, &mut self.input)?;
                    if value == 0 {
                        break;
                    }
                    if value > 0xFF {
                        return Err(ExecError::InvalidPutsChar { address, value });
                    }

                    bytes.push(value as u8);
                    if address == USER_MEMORY_LIMIT {
                        break;
                    }
                    address = address.wrapping_add(1);
                }

                self.output.write_all(&bytes)?;
            }

            // HALT (x25) - stop execution. PC still advances to the instruction
            // after HALT; `state()` reports `Halted` from this point on.
            TrapVector::Halt => {
                log::debug!("halted at pc={:#06x}", self.registers.read(Register::PC));
                self.state = RunState::Halted;
            }
        }

        Ok(())
    }
}

impl<I, O> std::fmt::Debug for Machine<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("pc", &self.registers.read(Register::PC))
            .field("state", &self.state)
            .field("memory", &self.memory)
            .finish()
    }
}

/// Reads one big-endian 16-bit word. `Ok(None)` means a clean stop at EOF;
/// a read that returns exactly one trailing byte is an `OddByteCount`
/// error rather than a silently dropped half-word.
fn read_word<R: Read>(reader: &mut R) -> Result<Option<u16>, LoadError> {
    let mut buffer = [0u8; 2];

    let first = reader.read(&mut buffer[..1]).map_err(LoadError::Io)?;
    if first == 0 {
        return Ok(None);
    }

    let second = reader.read(&mut buffer[1..]).map_err(LoadError::Io)?;
    if second == 0 {
        return Err(LoadError::OddByteCount);
    }

    Ok(Some(BigEndian::read_u16(&buffer)))
}
