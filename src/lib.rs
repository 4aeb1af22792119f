// Tue Jan 13 2026 - Alex

pub mod bytecode;
pub mod config;
pub mod deobfuscation;
pub mod lua;
pub mod pseudocode;
pub mod transport;
pub mod utils;

pub use bytecode::{serialize, Function};
pub use config::Config;
pub use deobfuscation::{DeobfuscationError, Deobfuscator};
pub use pseudocode::PseudocodeGenerator;
