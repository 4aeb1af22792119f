// Tue Jan 13 2026 - Alex

pub mod decoder;
pub mod error;

pub use decoder::{decode, decode_constant, decode_constants, decode_escape, ConstantTable};
pub use error::TransportError;
