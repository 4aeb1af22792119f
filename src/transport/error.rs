// Tue Jan 13 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Encoded data too short: expected a 16 character alphabet, got {0} characters")]
    MissingAlphabet(usize),
    #[error("Invalid escaped byte: {0}")]
    InvalidEscape(String),
    #[error("Constant table truncated at offset {0}")]
    Truncated(usize),
}
