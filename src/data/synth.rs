//! Synthetic labeled dataset generation.
//!
//! Produces one Gaussian blob per model-card class: class `k` is centred at
//! `k * spread` on every feature, with independent `N(0, noise²)` jitter. The
//! output has the feedback-table schema (`features` + `target`), so it can be
//! fed straight into `bootstrap` or `feedback`.

use std::path::Path;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::ModelCard;
use crate::error::AppError;
use crate::io::RawTable;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthOptions {
    pub rows_per_class: usize,
    pub seed: u64,
    pub spread: f64,
    pub noise: f64,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            rows_per_class: 25,
            seed: 42,
            spread: 4.0,
            noise: 1.0,
        }
    }
}

/// Generate a shuffled labeled table for the card's classes.
pub fn generate_labeled(card: &ModelCard, opts: &SynthOptions) -> Result<RawTable, AppError> {
    if card.classes.is_empty() {
        return Err(AppError::InvalidArgument(
            "model card lists no classes to synthesize".to_string(),
        ));
    }
    if opts.rows_per_class == 0 {
        return Err(AppError::InvalidArgument("rows per class must be > 0".to_string()));
    }
    if !(opts.spread.is_finite() && opts.noise.is_finite() && opts.noise >= 0.0) {
        return Err(AppError::InvalidArgument("invalid spread/noise settings".to_string()));
    }

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let normal = Normal::new(0.0, opts.noise)
        .map_err(|e| AppError::InvalidArgument(format!("noise distribution error: {e}")))?;

    let mut rows = Vec::with_capacity(card.classes.len() * opts.rows_per_class);
    for (k, label) in card.classes.iter().enumerate() {
        let centre = k as f64 * opts.spread;
        for _ in 0..opts.rows_per_class {
            let mut row: Vec<String> = card
                .features
                .iter()
                .map(|_| format!("{:.6}", centre + normal.sample(&mut rng)))
                .collect();
            row.push(label.clone());
            rows.push(row);
        }
    }
    rows.shuffle(&mut rng);

    Ok(RawTable::new(card.labeled_columns(), rows))
}

/// Write a table as CSV with a header row, replacing any existing file.
pub fn write_csv(path: &Path, table: &RawTable) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::Storage(format!("failed to create '{}': {e}", parent.display())))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::Storage(format!("failed to create '{}': {e}", path.display())))?;
    let write_err = |e: csv::Error| AppError::Storage(format!("failed to write '{}': {e}", path.display()));
    writer.write_record(table.headers()).map_err(write_err)?;
    for row in table.rows() {
        writer.write_record(row).map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::Storage(format!("failed to flush '{}': {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> ModelCard {
        ModelCard {
            features: vec!["a".into(), "b".into()],
            classes: vec!["X".into(), "Y".into()],
            target: "label".into(),
        }
    }

    #[test]
    fn generates_balanced_blobs() {
        let table = generate_labeled(&card(), &SynthOptions::default()).unwrap();
        assert_eq!(table.headers(), &["a", "b", "label"]);
        assert_eq!(table.len(), 50);
        let labels = table.column("label").unwrap();
        assert_eq!(labels.iter().filter(|l| **l == "X").count(), 25);
        assert_eq!(labels.iter().filter(|l| **l == "Y").count(), 25);
    }

    #[test]
    fn same_seed_same_table() {
        let a = generate_labeled(&card(), &SynthOptions::default()).unwrap();
        let b = generate_labeled(&card(), &SynthOptions::default()).unwrap();
        assert_eq!(a, b);
        let c = generate_labeled(
            &card(),
            &SynthOptions {
                seed: 7,
                ..SynthOptions::default()
            },
        )
        .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn card_without_classes_is_rejected() {
        let card = ModelCard {
            classes: vec![],
            ..card()
        };
        let err = generate_labeled(&card, &SynthOptions::default()).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn written_csv_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("synth.csv");
        let table = generate_labeled(&card(), &SynthOptions::default()).unwrap();
        write_csv(&path, &table).unwrap();
        let back = crate::io::parse_csv(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back, table);
    }
}
