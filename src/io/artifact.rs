//! Read/write model artifact JSON files.
//!
//! An artifact is the portable form of a trained classifier:
//! - the classifier itself (tagged by kind)
//! - the feature order it was trained on
//! - training provenance (timestamp, rows, held-out metrics)
//!
//! Writes keep the previous artifact as `<path>.bak` and move the new file into
//! place with a rename, so an interrupted write never leaves the live path
//! half-written and the previous model stays recoverable from the backup.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::domain::{ModelCard, TrainReport};
use crate::error::AppError;
use crate::models::{LoadedModel, ModelArtifact};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    pub features: Vec<String>,
    pub rows_used: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrainReport>,
    pub model: ModelArtifact,
}

impl ModelFile {
    pub fn new(features: Vec<String>, model: ModelArtifact, report: TrainReport) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            trained_at: Utc::now(),
            features,
            rows_used: report.rows_used,
            metrics: Some(report),
            model,
        }
    }

    /// Resolve capabilities and hand the classifier over for serving.
    pub fn into_loaded(self) -> LoadedModel {
        LoadedModel::from_artifact(self.model, self.trained_at, self.rows_used)
    }
}

/// `<path>.bak`
pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, "bak")
}

pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Read an artifact and check it against the model card. Every failure is fatal.
pub fn read_model_file(path: &Path, card: &ModelCard) -> Result<ModelFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::Config(format!("failed to open model '{}': {e}", path.display())))?;
    let model_file: ModelFile = serde_json::from_reader(file)
        .map_err(|e| AppError::Config(format!("invalid model '{}': {e}", path.display())))?;

    if model_file.format_version != FORMAT_VERSION {
        return Err(AppError::Config(format!(
            "unsupported model format version {} (expected {FORMAT_VERSION})",
            model_file.format_version
        )));
    }
    if model_file.features != card.features {
        return Err(AppError::Config(format!(
            "model was trained on features [{}] but the model card declares [{}]",
            model_file.features.join(", "),
            card.features.join(", ")
        )));
    }
    model_file
        .model
        .validate(card.features.len())
        .map_err(|e| AppError::Config(format!("invalid model '{}': {e}", path.display())))?;

    Ok(model_file)
}

/// Persist an artifact: back up the current file, write a temp file, rename it into place.
///
/// The temp file is unique per call and lives next to `path`, so the rename
/// stays on one filesystem. The directory is synced after the rename. Callers
/// that may race with other processes hold the artifact's `FileLock`.
/// Any failure is a `Persistence` error; the caller must not swap the live model.
pub fn write_model_file(path: &Path, model_file: &ModelFile) -> Result<(), AppError> {
    let persist_err = |what: &str, e: &dyn std::fmt::Display| {
        AppError::Persistence(format!("{what} '{}': {e}", path.display()))
    };

    let dir = parent_dir(path);
    fs::create_dir_all(dir).map_err(|e| persist_err("failed to create directory for", &e))?;

    let bytes = serde_json::to_vec_pretty(model_file).map_err(|e| persist_err("failed to serialize", &e))?;

    if path.exists() {
        let backup = backup_path(path);
        fs::copy(path, &backup).map_err(|e| persist_err("failed to back up", &e))?;
        tracing::info!(backup = %backup.display(), "backed up previous model");
    }

    // Dropping the temp file on any early return removes it.
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| persist_err("failed to create temp file for", &e))?;
    tmp.write_all(&bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| persist_err("failed to write", &e))?;
    tmp.persist(path)
        .map_err(|e| persist_err("failed to move new model into", &e.error))?;
    sync_dir(dir).map_err(|e| persist_err("failed to sync directory of", &e))?;
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Flush directory entries so a completed rename survives a crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
