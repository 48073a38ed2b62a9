use thiserror::Error;

/// Failures that can occur while constructing a `Machine` from a program
/// byte stream.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("object file is shorter than the minimum 2-byte origin word")]
    TooShort,

    #[error("object file ended on an odd byte boundary while reading a word")]
    OddByteCount,

    #[error("failed to read program stream: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures returned by `Machine::step` and `Machine::run`.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("step called on a halted machine")]
    NotRunning,

    #[error("opcode {opcode:#03x} is not implemented")]
    UnimplementedOp { opcode: u8 },

    #[error("trap vector {vector:#04x} is not implemented")]
    UnimplementedTrap { vector: u8 },

    #[error("malformed instruction: {reason}")]
    Malformed { reason: &'static str },

    #[error("host I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("PUTS read a value > 0xff at {address:#06x}: {value:#06x}")]
    InvalidPutsChar { address: u16, value: u16 },
}
