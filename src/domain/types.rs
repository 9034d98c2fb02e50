//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - passed between the coercion, engine, store and training stages
//! - returned across the service boundary as JSON
//! - persisted alongside model artifacts

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_MODEL_PATH: &str = "models/model.json";
pub const DEFAULT_CARD_PATH: &str = "models/model_card.json";
pub const DEFAULT_FEEDBACK_PATH: &str = "data/user_feedback.csv";

/// Static model metadata: feature schema, known classes and the label column.
///
/// Loaded once at startup and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCard {
    /// Ordered feature names; the order is the column order fed to the classifier.
    pub features: Vec<String>,
    /// Known class labels. May be empty, in which case labels come from the model.
    #[serde(default)]
    pub classes: Vec<String>,
    /// Name of the label column in feedback/training tables.
    #[serde(default = "default_target")]
    pub target: String,
}

fn default_target() -> String {
    "label".to_string()
}

impl ModelCard {
    /// Features followed by the target column; the schema of the feedback table.
    pub fn labeled_columns(&self) -> Vec<String> {
        let mut cols = self.features.clone();
        cols.push(self.target.clone());
        cols
    }
}

/// Row-major numeric table whose columns follow a requested column order.
///
/// Built by `data::coerce`, which guarantees every cell is finite.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    values: DMatrix<f64>,
}

impl FeatureMatrix {
    /// Wrap a matrix, checking shape and finiteness.
    pub fn new(columns: Vec<String>, values: DMatrix<f64>) -> Result<Self, AppError> {
        if values.ncols() != columns.len() {
            return Err(AppError::InvalidArgument(format!(
                "matrix has {} column(s) but {} name(s) were given",
                values.ncols(),
                columns.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(AppError::InvalidArgument(
                "feature matrix contains non-finite values".to_string(),
            ));
        }
        Ok(Self { columns, values })
    }

    /// Build from row vectors (convenient in tests and generators).
    pub fn from_rows(columns: Vec<String>, rows: &[Vec<f64>]) -> Result<Self, AppError> {
        let d = columns.len();
        if let Some(bad) = rows.iter().position(|r| r.len() != d) {
            return Err(AppError::InvalidArgument(format!(
                "row {} has {} value(s), expected {d}",
                bad + 1,
                rows[bad].len()
            )));
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Self::new(columns, DMatrix::from_row_slice(rows.len(), d, &flat))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    /// Copy of row `i`.
    pub fn row(&self, i: usize) -> Vec<f64> {
        self.values.row(i).iter().copied().collect()
    }

    /// Materialize every row; classifiers score row slices.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.n_rows()).map(|i| self.row(i)).collect()
    }

    /// New matrix holding the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            values: self.values.select_rows(indices.iter()),
        }
    }
}

/// Prediction for a single input row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Label with maximal probability (first class wins exact ties).
    pub prediction: String,
    /// Probability per class label; sums to ~1.0.
    pub proba: BTreeMap<String, f64>,
}

/// Knobs for the retrain pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrainParams {
    pub min_rows: usize,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for RetrainParams {
    fn default() -> Self {
        Self {
            min_rows: 40,
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

impl RetrainParams {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.test_fraction.is_finite() && self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(AppError::InvalidArgument(format!(
                "test fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        Ok(())
    }
}

/// Held-out evaluation of a freshly trained classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub test_accuracy: f64,
    pub test_f1_macro: f64,
    pub rows_used: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Result of an explain call. Unsupported is a normal answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Explanation {
    Ranked(Vec<FeatureImportance>),
    Unsupported { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackReceipt {
    pub stored_rows: usize,
}

/// Liveness snapshot of the running service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub ok: bool,
    pub model_loaded: bool,
    pub n_features: usize,
    pub version: &'static str,
    pub model_kind: ModelKind,
    pub trained_at: DateTime<Utc>,
}

/// Concrete classifier families that can be trained and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Gradient-boosted decision stumps (probabilities + importances).
    Gbdt,
    /// Nearest class centroid (hard labels only).
    NearestCentroid,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Gbdt => "gbdt",
            ModelKind::NearestCentroid => "nearest_centroid",
        }
    }
}

/// How an uploaded table is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    /// `.json` files are JSON; everything else is treated as CSV.
    pub fn from_path(path: &Path) -> Self {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json { InputFormat::Json } else { InputFormat::Csv }
    }
}

/// File locations used by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub model_path: PathBuf,
    pub card_path: PathBuf,
    pub feedback_path: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            card_path: PathBuf::from(DEFAULT_CARD_PATH),
            feedback_path: PathBuf::from(DEFAULT_FEEDBACK_PATH),
        }
    }
}

impl ServiceConfig {
    /// Read `MODEL_PATH`, `MODEL_CARD` and `FEEDBACK_CSV` (a `.env` file is honored).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let path_or = |key: &str, default: PathBuf| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default)
        };
        Self {
            model_path: path_or("MODEL_PATH", defaults.model_path),
            card_path: path_or("MODEL_CARD", defaults.card_path),
            feedback_path: path_or("FEEDBACK_CSV", defaults.feedback_path),
        }
    }

    /// Apply explicit overrides (CLI flags win over the environment).
    pub fn with_overrides(
        mut self,
        model_path: Option<PathBuf>,
        card_path: Option<PathBuf>,
        feedback_path: Option<PathBuf>,
    ) -> Self {
        if let Some(p) = model_path {
            self.model_path = p;
        }
        if let Some(p) = card_path {
            self.card_path = p;
        }
        if let Some(p) = feedback_path {
            self.feedback_path = p;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn card_defaults_target_and_classes() {
        let card: ModelCard = serde_json::from_str(r#"{"features":["a","b"]}"#).unwrap();
        assert_eq!(card.target, "label");
        assert!(card.classes.is_empty());
        assert_eq!(card.labeled_columns(), names(&["a", "b", "label"]));
    }

    #[test]
    fn feature_matrix_rejects_non_finite() {
        let err = FeatureMatrix::from_rows(names(&["a"]), &[vec![f64::NAN]]).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn select_rows_keeps_requested_order() {
        let m = FeatureMatrix::from_rows(
            names(&["a", "b"]),
            &[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]],
        )
        .unwrap();
        let picked = m.select_rows(&[2, 0]);
        assert_eq!(picked.to_rows(), vec![vec![5.0, 6.0], vec![1.0, 2.0]]);
        assert_eq!(picked.columns(), m.columns());
    }

    #[test]
    fn retrain_params_reject_bad_fraction() {
        let params = RetrainParams {
            test_fraction: 1.0,
            ..RetrainParams::default()
        };
        assert!(params.validate().is_err());
        assert!(RetrainParams::default().validate().is_ok());
    }

    #[test]
    fn config_lookup_falls_back_to_defaults() {
        let cfg = ServiceConfig::from_lookup(|key| match key {
            "MODEL_PATH" => Some("/tmp/m.json".to_string()),
            "MODEL_CARD" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(cfg.model_path, PathBuf::from("/tmp/m.json"));
        assert_eq!(cfg.card_path, PathBuf::from(DEFAULT_CARD_PATH));
        assert_eq!(cfg.feedback_path, PathBuf::from(DEFAULT_FEEDBACK_PATH));
    }

    #[test]
    fn input_format_from_extension() {
        assert_eq!(InputFormat::from_path(Path::new("x.JSON")), InputFormat::Json);
        assert_eq!(InputFormat::from_path(Path::new("x.csv")), InputFormat::Csv);
        assert_eq!(InputFormat::from_path(Path::new("-")), InputFormat::Csv);
    }
}
