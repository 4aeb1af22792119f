// Tue Jan 13 2026 - Alex

pub mod generator;

pub use generator::PseudocodeGenerator;
