use um_derive::Error;

/// Failures that can occur while loading or executing a program.
///
/// Every execution failure is terminal: the machine transitions to
/// [`State::Failed`](super::vm::State) and accepts no further steps.
/// Reaching the end of the input stream is *not* a failure; see
/// [`END_OF_INPUT`](super::vm::END_OF_INPUT).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// Decoded opcode 14 or 15, which are never assigned a meaning.
    #[error("illegal opcode {opcode}")]
    IllegalOpcode { opcode: u8 },
    /// Array access through a dead handle, past an array's length, or an
    /// execution finger outside the program array.
    #[error("out-of-bounds access: array {handle}, offset {offset}")]
    OutOfBoundsAccess { handle: u32, offset: u32 },
    /// Division with a zero divisor.
    #[error("division by zero")]
    DivisionByZero,
    /// Abandonment of array 0 or of a handle that is not live.
    #[error("cannot abandon array {handle}")]
    InvalidAbandon { handle: u32 },
    /// Output of a register value that does not fit in one byte.
    #[error("output value {value} exceeds one byte")]
    OutputOutOfRange { value: u32 },
    /// Program image bytes do not form whole 32-bit words.
    #[error("bad program image: {reason}")]
    BadImage { reason: String },
    /// File I/O failure while loading a program image.
    #[error("io error: {0}")]
    Io(String),
}
