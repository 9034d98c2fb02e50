//! Append-only feedback table.
//!
//! The table is a CSV file whose columns are the card's features followed by
//! its target column. The header is written once, by the first append; later
//! appends only add rows. Rows are never rewritten, deduplicated or deleted.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::ModelCard;
use crate::error::AppError;
use crate::io::{FileLock, RawTable, parse_csv};

#[derive(Debug, Clone)]
pub struct FeedbackStore {
    path: PathBuf,
}

impl FeedbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Validate and append a batch of labeled rows; returns the number stored.
    ///
    /// `label_column` names the label column in `table` (defaults to the card's
    /// target). Stored rows always use the card's target as the header.
    /// Validation happens before the file is touched, and the batch is written
    /// with a single append, so a rejected batch leaves the table unchanged.
    /// The header check and the append run under the store's cross-process
    /// lock, so concurrent writers produce exactly one header.
    pub fn append(&self, card: &ModelCard, table: &RawTable, label_column: Option<&str>) -> Result<usize, AppError> {
        let label_column = label_column.unwrap_or(&card.target);

        let mut required = card.features.clone();
        required.push(label_column.to_string());
        table.require_columns(&required)?;

        let feature_idx: Vec<usize> = card
            .features
            .iter()
            .filter_map(|f| table.column_index(f))
            .collect();
        let label_idx = table
            .column_index(label_column)
            .ok_or_else(|| AppError::missing_columns(vec![label_column.to_string()]))?;

        let empty_labels: Vec<usize> = table
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, row)| row[label_idx].trim().is_empty())
            .map(|(i, _)| i + 1)
            .collect();
        if !empty_labels.is_empty() {
            return Err(AppError::EmptyLabels { rows: empty_labels });
        }

        if table.is_empty() {
            return Ok(0);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Storage(format!("failed to create '{}': {e}", parent.display())))?;
        }
        let _lock = self.lock()?;

        let write_header = self.is_new()?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        let storage_err = |e: csv::Error| AppError::Storage(format!("failed to encode feedback rows: {e}"));
        if write_header {
            writer.write_record(card.labeled_columns()).map_err(storage_err)?;
        }
        for row in table.rows() {
            let record = feature_idx
                .iter()
                .map(|&i| row[i].as_str())
                .chain(std::iter::once(row[label_idx].as_str()));
            writer.write_record(record).map_err(storage_err)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| AppError::Storage(format!("failed to encode feedback rows: {e}")))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::Storage(format!("failed to open '{}': {e}", self.path.display())))?;
        file.write_all(&bytes)
            .and_then(|_| file.flush())
            .map_err(|e| AppError::Storage(format!("failed to append to '{}': {e}", self.path.display())))?;

        tracing::info!(
            rows = table.len(),
            path = %self.path.display(),
            header = write_header,
            "stored feedback rows"
        );
        Ok(table.len())
    }

    /// Load the whole table. A store that was never written is `NoFeedbackData`.
    pub fn load(&self) -> Result<RawTable, AppError> {
        if !self.path.exists() {
            return Err(AppError::NoFeedbackData {
                path: self.path.clone(),
            });
        }
        let bytes = {
            let _lock = self.lock()?;
            fs::read(&self.path)
                .map_err(|e| AppError::Storage(format!("failed to read '{}': {e}", self.path.display())))?
        };
        if bytes.is_empty() {
            return Err(AppError::NoFeedbackData {
                path: self.path.clone(),
            });
        }
        parse_csv(&bytes).map_err(|e| AppError::Storage(format!("corrupt feedback table: {e}")))
    }

    fn lock(&self) -> Result<FileLock, AppError> {
        FileLock::acquire(&self.path)
            .map_err(|e| AppError::Storage(format!("failed to lock '{}': {e}", self.path.display())))
    }

    fn is_new(&self) -> Result<bool, AppError> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len() == 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(AppError::Storage(format!(
                "failed to inspect '{}': {e}",
                self.path.display()
            ))),
        }
    }
}
