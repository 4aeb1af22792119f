// Tue Jan 13 2026 - Alex

use crate::bytecode::BytecodeError;
use crate::lua::{EvalError, ParseError};
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Range tree root is not an if statement: {0}")]
    NotABranch(String),
    #[error("Expected `<state> <op> <number>` comparison, found: {0}")]
    UnexpectedCondition(String),
    #[error("Unsupported comparison operator '{0}' in range tree")]
    UnsupportedOperator(String),
    #[error("Range [{min}, {max}] did not collapse to a single state")]
    UnresolvedRange { min: i64, max: i64 },
}

#[derive(Error, Debug)]
pub enum DeobfuscationError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Key evaluation failed: {0}")]
    Eval(#[from] EvalError),
    #[error("Transport decoding failed: {0}")]
    Transport(#[from] TransportError),
    #[error("Bytecode error: {0}")]
    Bytecode(#[from] BytecodeError),
    #[error("Control flow solver failed: {0}")]
    Solver(#[from] SolverError),
    #[error("Unsupported packer variant: {0}")]
    UnsupportedVariant(String),
    #[error("Could not locate {0} in the script")]
    Missing(&'static str),
}

pub type Result<T> = std::result::Result<T, DeobfuscationError>;
