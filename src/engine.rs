//! Prediction engine: scores feature matrices against the live model.
//!
//! The live model sits behind `RwLock<Arc<LoadedModel>>`. A prediction clones
//! the `Arc` under a short read lock and scores without holding it, so a
//! concurrent `swap` never waits on scoring and a scoring call always sees one
//! model in full.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use nalgebra::DMatrix;

use crate::domain::{Explanation, FeatureImportance, FeatureMatrix, ModelCard, PredictionResult};
use crate::error::AppError;
use crate::models::{Classifier, LoadedModel, ProbabilisticClassifier, Scorer, gbdt::argmax};

pub struct PredictionEngine {
    card: Arc<ModelCard>,
    model: RwLock<Arc<LoadedModel>>,
}

impl PredictionEngine {
    pub fn new(card: Arc<ModelCard>, model: LoadedModel) -> Self {
        Self {
            card,
            model: RwLock::new(Arc::new(model)),
        }
    }

    pub fn card(&self) -> &ModelCard {
        &self.card
    }

    /// Snapshot of the live model.
    pub fn current(&self) -> Arc<LoadedModel> {
        let guard = self.model.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replace the live model; returns the previous one.
    pub fn swap(&self, model: LoadedModel) -> Arc<LoadedModel> {
        let next = Arc::new(model);
        let meta = next.meta().clone();
        let mut guard = self.model.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *guard, next);
        drop(guard);
        tracing::info!(
            kind = meta.kind.as_str(),
            trained_at = %meta.trained_at,
            rows_used = meta.rows_used,
            "swapped live model"
        );
        previous
    }

    /// One result per input row, in input order.
    pub fn predict(&self, x: &FeatureMatrix) -> Result<Vec<PredictionResult>, AppError> {
        let model = self.current();
        if x.n_rows() == 0 {
            return Ok(Vec::new());
        }
        let (classes, proba) = match model.scorer() {
            Scorer::Probabilities(m) => self.score_probabilities(m.as_ref(), x)?,
            Scorer::HardLabels(m) => self.score_hard_labels(m.as_ref(), x)?,
        };
        let results = assemble(&classes, &proba)?;
        tracing::debug!(rows = results.len(), kind = model.meta().kind.as_str(), "scored batch");
        Ok(results)
    }

    fn score_probabilities(
        &self,
        model: &dyn ProbabilisticClassifier,
        x: &FeatureMatrix,
    ) -> Result<(Vec<String>, DMatrix<f64>), AppError> {
        let proba = model.predict_proba(x).map_err(as_inference)?;
        let classes = match model.classes() {
            Some(learned) => learned.to_vec(),
            None if !self.card.classes.is_empty() => self.card.classes.clone(),
            None => (0..proba.ncols()).map(|j| j.to_string()).collect(),
        };
        if proba.nrows() != x.n_rows() || proba.ncols() != classes.len() {
            return Err(AppError::Inference(format!(
                "model returned a {}x{} probability matrix for {} row(s) and {} class(es)",
                proba.nrows(),
                proba.ncols(),
                x.n_rows(),
                classes.len()
            )));
        }
        Ok((classes, proba))
    }

    fn score_hard_labels(
        &self,
        model: &dyn Classifier,
        x: &FeatureMatrix,
    ) -> Result<(Vec<String>, DMatrix<f64>), AppError> {
        let labels = model.predict_labels(x).map_err(as_inference)?;
        if labels.len() != x.n_rows() {
            return Err(AppError::Inference(format!(
                "model returned {} label(s) for {} row(s)",
                labels.len(),
                x.n_rows()
            )));
        }

        let classes: Vec<String> = if !self.card.classes.is_empty() {
            self.card.classes.clone()
        } else if let Some(learned) = model.classes().filter(|c| !c.is_empty()) {
            learned.to_vec()
        } else {
            let mut seen = HashSet::new();
            labels.iter().filter(|l| seen.insert(l.as_str())).cloned().collect()
        };

        let mut proba = DMatrix::zeros(labels.len(), classes.len());
        for (i, label) in labels.iter().enumerate() {
            let j = match classes.iter().position(|c| c == label) {
                Some(j) => j,
                None => {
                    tracing::warn!(
                        label = %label,
                        assigned = %classes[0],
                        "predicted label not in class list; one-hot mass placed on first class"
                    );
                    0
                }
            };
            proba[(i, j)] = 1.0;
        }
        Ok((classes, proba))
    }

    /// Up to `top_k` features by descending importance; ties keep card order.
    pub fn explain(&self, top_k: usize) -> Explanation {
        let model = self.current();
        let Some(importances) = model.importances() else {
            return Explanation::Unsupported {
                message: format!(
                    "{} models do not provide feature importances",
                    model.meta().kind.as_str()
                ),
            };
        };
        let mut ranked: Vec<FeatureImportance> = self
            .card
            .features
            .iter()
            .zip(importances)
            .map(|(feature, &importance)| FeatureImportance {
                feature: feature.clone(),
                importance,
            })
            .collect();
        ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        ranked.truncate(top_k);
        Explanation::Ranked(ranked)
    }
}

fn as_inference(err: AppError) -> AppError {
    match err {
        AppError::Inference(_) => err,
        other => AppError::Inference(other.to_string()),
    }
}

fn assemble(classes: &[String], proba: &DMatrix<f64>) -> Result<Vec<PredictionResult>, AppError> {
    if classes.is_empty() {
        return Err(AppError::Inference("no class labels available".to_string()));
    }
    proba
        .row_iter()
        .enumerate()
        .map(|(i, row)| {
            let values: Vec<f64> = row.iter().copied().collect();
            if values.iter().any(|p| !p.is_finite()) {
                return Err(AppError::Inference(format!(
                    "non-finite probability in row {}",
                    i + 1
                )));
            }
            let prediction = classes[argmax(&values)].clone();
            let proba: BTreeMap<String, f64> = classes.iter().cloned().zip(values).collect();
            Ok(PredictionResult { prediction, proba })
        })
        .collect()
}
