// Tue Jan 13 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unexpected character '{0}' at line {1}, column {2}")]
    UnexpectedCharacter(char, usize, usize),
    #[error("Unterminated string starting at line {0}")]
    UnterminatedString(usize),
    #[error("Unterminated long bracket starting at line {0}")]
    UnterminatedLongBracket(usize),
    #[error("Malformed number '{0}' at line {1}")]
    MalformedNumber(String, usize),
    #[error("Expected {expected} but found '{found}' at line {line}")]
    Expected {
        expected: String,
        found: String,
        line: usize,
    },
    #[error("Unexpected token '{0}' at line {1}")]
    UnexpectedToken(String, usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Unsupported expression: {0}")]
    Unsupported(String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Bad argument to {0}")]
    BadArgument(String),
    #[error("Expression did not evaluate to a number: {0}")]
    NotANumber(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
}
