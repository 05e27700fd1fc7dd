//! Turning raw serial lines into canonical samples
//!
//! ```text
//! "temperature 18.96" → parser → ParsedReading → normalizer (+ quality) → Sample
//! ```
//!
//! Nothing in here fails: malformed input is logged and yields no reading.

pub mod normalizer;
pub mod parser;
pub mod quality;

pub use normalizer::{normalize, normalize_at};
pub use parser::{ParsedReading, parse_line};
pub use quality::assess;

/// Canonical metric names
pub const HUMEDAD_SUELO: &str = "humedad_suelo";
pub const LUMINOSIDAD: &str = "luminosidad";
pub const TEMP_AIRE: &str = "temp_aire";
