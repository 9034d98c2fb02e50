//! Crate-wide error type.
//!
//! Every failure the service can report maps to one `AppError` variant. The
//! CLI turns non-fatal variants into a structured JSON response; `Config` is
//! the only variant that prevents the service from starting.

use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppError {
    /// Model card or model artifact missing/invalid at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Caller input lacks required columns.
    #[error("missing required column(s): {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    /// The uploaded table could not be read at all.
    #[error("unreadable input: {0}")]
    UnreadableInput(String),

    /// Feedback rows whose label cell is empty (1-based data row numbers).
    #[error("empty label value in row(s): {}", join_rows(.rows))]
    EmptyLabels { rows: Vec<usize> },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unexpected failure while scoring rows.
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("no feedback data yet ({} does not exist)", .path.display())]
    NoFeedbackData { path: PathBuf },

    #[error("insufficient feedback data: {rows} row(s), at least {min_rows} required")]
    InsufficientData { rows: usize, min_rows: usize },

    /// Labels cannot be split while preserving class proportions.
    #[error("cannot stratify split: {0}")]
    Stratification(String),

    #[error("training failed: {0}")]
    Training(String),

    /// The model artifact could not be written; the previous model stays live.
    #[error("could not persist model: {0}")]
    Persistence(String),

    /// The feedback table could not be read or appended to.
    #[error("feedback storage error: {0}")]
    Storage(String),

    /// A failure inside the service itself, not caused by the caller's input.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Structured error body returned across the service boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
}

impl AppError {
    pub fn missing_columns(missing: Vec<String>) -> Self {
        Self::MissingColumns { missing }
    }

    /// Stable machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::MissingColumns { .. } => "missing_columns",
            AppError::UnreadableInput(_) => "unreadable_input",
            AppError::EmptyLabels { .. } => "empty_labels",
            AppError::InvalidArgument(_) => "invalid_argument",
            AppError::Inference(_) => "inference_error",
            AppError::NoFeedbackData { .. } => "no_feedback_data",
            AppError::InsufficientData { .. } => "insufficient_data",
            AppError::Stratification(_) => "stratification_error",
            AppError::Training(_) => "training_error",
            AppError::Persistence(_) => "persistence_error",
            AppError::Storage(_) => "storage_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_)
            | AppError::MissingColumns { .. }
            | AppError::UnreadableInput(_)
            | AppError::EmptyLabels { .. }
            | AppError::InvalidArgument(_) => 2,
            AppError::NoFeedbackData { .. }
            | AppError::InsufficientData { .. }
            | AppError::Stratification(_) => 3,
            AppError::Inference(_)
            | AppError::Training(_)
            | AppError::Persistence(_)
            | AppError::Storage(_)
            | AppError::Internal(_) => 4,
        }
    }

    /// Only configuration failures are fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Config(_))
    }

    pub fn to_response(&self) -> ErrorResponse {
        let missing = match self {
            AppError::MissingColumns { missing } => Some(missing.clone()),
            _ => None,
        };
        ErrorResponse {
            ok: false,
            error: self.kind(),
            message: self.to_string(),
            missing,
        }
    }
}

fn join_rows(rows: &[usize]) -> String {
    rows.iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_columns_response_lists_names() {
        let err = AppError::missing_columns(vec!["a".to_string(), "c".to_string()]);
        let resp = err.to_response();
        assert!(!resp.ok);
        assert_eq!(resp.error, "missing_columns");
        assert_eq!(resp.missing, Some(vec!["a".to_string(), "c".to_string()]));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn only_config_is_fatal() {
        assert!(AppError::Config("x".into()).is_fatal());
        assert!(!AppError::Persistence("x".into()).is_fatal());
        assert!(
            !AppError::InsufficientData {
                rows: 1,
                min_rows: 40
            }
            .is_fatal()
        );
    }

    #[test]
    fn response_omits_missing_for_other_kinds() {
        let json = serde_json::to_value(AppError::Inference("boom".into()).to_response()).unwrap();
        assert_eq!(json["error"], "inference_error");
        assert!(json.get("missing").is_none());
    }

    #[test]
    fn internal_errors_are_runtime_failures() {
        let err = AppError::Internal("encode".into());
        assert_eq!(err.kind(), "internal_error");
        assert_eq!(err.exit_code(), 4);
        assert!(!err.is_fatal());
    }
}
