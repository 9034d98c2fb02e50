//! Domain types used throughout the service.
//!
//! This module defines:
//!
//! - the model card and service configuration (`ModelCard`, `ServiceConfig`)
//! - the coerced numeric input (`FeatureMatrix`)
//! - boundary results (`PredictionResult`, `TrainReport`, `Explanation`, `Health`)

pub mod types;

pub use types::*;
