//! Data preparation.
//!
//! - `coerce`: raw table -> numeric `FeatureMatrix` (batch-median imputation)
//! - `synth`: seeded synthetic labeled tables for demos and smoke tests

pub mod coerce;
pub mod synth;

pub use coerce::{coerce, median, parse_cell};
pub use synth::{SynthOptions, generate_labeled, write_csv};
