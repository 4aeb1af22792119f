// Tue Jan 13 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BytecodeError {
    #[error("Unexpected end of data at offset {offset}: needed {needed} more bytes")]
    UnexpectedEof { offset: usize, needed: usize },
    #[error("Invalid chunk header: {0}")]
    InvalidHeader(String),
    #[error("Negative {what} count {count} at offset {offset}")]
    NegativeCount {
        what: &'static str,
        count: i32,
        offset: usize,
    },
    #[error("Unknown opcode {0} in standard chunk")]
    UnknownOpcode(u32),
    #[error("Unknown constant tag {0} in standard chunk")]
    UnknownConstantTag(u8),
    #[error("Jump at {pc} targets instruction {target} outside the function")]
    JumpOutOfRange { pc: usize, target: i64 },
    #[error("Constant index {index} out of range ({len} constants)")]
    ConstantOutOfRange { index: i32, len: usize },
    #[error("Prototype index {index} out of range ({len} prototypes)")]
    PrototypeOutOfRange { index: i32, len: usize },
    #[error("Empty layout recipe")]
    EmptyFormat,
}
