//! Training: stratified split, evaluation metrics and the retrain pipeline.

pub mod metrics;
pub mod retrain;
pub mod split;

pub use metrics::{ConfusionMatrix, accuracy, macro_f1};
pub use retrain::{bootstrap, bootstrap_params, fit_from_table, retrain};
pub use split::{Split, stratified_split};
