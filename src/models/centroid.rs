//! Nearest-centroid classifier.
//!
//! Each class is summarised by the mean of its training rows; a row is
//! assigned to the closest mean (Euclidean). It only yields hard labels.

use std::collections::BTreeMap;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::Classifier;
use crate::domain::{FeatureMatrix, ModelKind};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidClassifier {
    pub n_features: usize,
    pub classes: Vec<String>,
    /// One mean vector per class, aligned with `classes`.
    pub centroids: Vec<Vec<f64>>,
}

impl CentroidClassifier {
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.n_features != n_features {
            return Err(format!(
                "model expects {} feature(s) but the card declares {n_features}",
                self.n_features
            ));
        }
        if self.classes.is_empty() || self.classes.len() != self.centroids.len() {
            return Err("centroids must be non-empty and aligned with classes".to_string());
        }
        if self.centroids.iter().any(|c| c.len() != n_features) {
            return Err("centroid width does not match feature count".to_string());
        }
        Ok(())
    }

    fn nearest(&self, row: &DVector<f64>) -> usize {
        let mut best = (0usize, f64::INFINITY);
        for (idx, c) in self.centroids.iter().enumerate() {
            let dist = (DVector::from_column_slice(c) - row).norm();
            if dist < best.1 {
                best = (idx, dist);
            }
        }
        best.0
    }
}

impl Classifier for CentroidClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::NearestCentroid
    }

    fn predict_labels(&self, x: &FeatureMatrix) -> Result<Vec<String>, AppError> {
        if x.n_cols() != self.n_features {
            return Err(AppError::Inference(format!(
                "model expects {} feature(s), got {}",
                self.n_features,
                x.n_cols()
            )));
        }
        Ok(x
            .values()
            .row_iter()
            .map(|row| {
                let v = DVector::from_iterator(row.len(), row.iter().copied());
                self.classes[self.nearest(&v)].clone()
            })
            .collect())
    }

    fn classes(&self) -> Option<&[String]> {
        Some(&self.classes)
    }
}

pub fn train_centroid(x: &FeatureMatrix, y: &[String]) -> Result<CentroidClassifier, AppError> {
    if x.n_rows() != y.len() {
        return Err(AppError::Training(format!(
            "{} feature row(s) but {} label(s)",
            x.n_rows(),
            y.len()
        )));
    }
    if y.is_empty() {
        return Err(AppError::Training("empty training set".to_string()));
    }

    let d = x.n_cols();
    let mut sums: BTreeMap<&str, (DVector<f64>, usize)> = BTreeMap::new();
    for (row, label) in x.values().row_iter().zip(y) {
        let entry = sums
            .entry(label.as_str())
            .or_insert_with(|| (DVector::zeros(d), 0));
        entry.0 += row.transpose();
        entry.1 += 1;
    }

    let (classes, centroids) = sums
        .into_iter()
        .map(|(label, (sum, count))| {
            let mean = sum / count as f64;
            (label.to_string(), mean.iter().copied().collect::<Vec<f64>>())
        })
        .unzip();

    Ok(CentroidClassifier {
        n_features: d,
        classes,
        centroids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_rows_to_closest_mean() {
        let x = FeatureMatrix::from_rows(
            vec!["a".into(), "b".into()],
            &[vec![0.0, 0.0], vec![2.0, 0.0], vec![10.0, 10.0], vec![12.0, 10.0]],
        )
        .unwrap();
        let y: Vec<String> = ["lo", "lo", "hi", "hi"].iter().map(|s| s.to_string()).collect();
        let model = train_centroid(&x, &y).unwrap();
        assert_eq!(model.classes, vec!["hi", "lo"]);
        assert_eq!(model.centroids[1], vec![1.0, 0.0]);

        let probe = FeatureMatrix::from_rows(
            vec!["a".into(), "b".into()],
            &[vec![1.0, 1.0], vec![9.0, 9.0]],
        )
        .unwrap();
        assert_eq!(model.predict_labels(&probe).unwrap(), vec!["lo", "hi"]);
    }

    #[test]
    fn validate_rejects_misaligned_centroids() {
        let model = CentroidClassifier {
            n_features: 2,
            classes: vec!["a".into()],
            centroids: vec![vec![0.0]],
        };
        assert!(model.validate(2).is_err());
    }
}
