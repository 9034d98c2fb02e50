//! Classifier implementations and their capability interface.
//!
//! Every classifier can produce hard labels. Some also expose per-class
//! probabilities and/or per-feature importances. Which capabilities a model
//! has is decided once, when a persisted `ModelArtifact` is turned into a
//! `LoadedModel`; scoring code then matches on `Scorer` instead of probing
//! the model on every call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::{FeatureMatrix, ModelKind};
use crate::error::AppError;

pub mod centroid;
pub mod gbdt;

pub use centroid::{CentroidClassifier, train_centroid};
pub use gbdt::{GbdtClassifier, GbdtOptions, Stump, softmax, train_gbdt};

/// Minimal classifier contract: one label per row.
pub trait Classifier: Send + Sync {
    fn kind(&self) -> ModelKind;

    fn predict_labels(&self, x: &FeatureMatrix) -> Result<Vec<String>, AppError>;

    /// Labels learned during training, if the model tracks them.
    fn classes(&self) -> Option<&[String]> {
        None
    }
}

/// Classifiers that can score every class.
pub trait ProbabilisticClassifier: Classifier {
    /// `n_rows × n_classes` matrix; column order follows `classes()`.
    fn predict_proba(&self, x: &FeatureMatrix) -> Result<DMatrix<f64>, AppError>;
}

/// Classifiers that can rank their input features.
pub trait FeatureImportances {
    /// One value per input feature, positionally aligned with the training columns.
    fn feature_importances(&self) -> Vec<f64>;
}

/// Scoring capability resolved at load time.
#[derive(Clone)]
pub enum Scorer {
    Probabilities(Arc<dyn ProbabilisticClassifier>),
    HardLabels(Arc<dyn Classifier>),
}

impl Scorer {
    pub fn kind(&self) -> ModelKind {
        match self {
            Scorer::Probabilities(m) => m.kind(),
            Scorer::HardLabels(m) => m.kind(),
        }
    }
}

/// Persistable classifier, tagged by kind in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    Gbdt(GbdtClassifier),
    NearestCentroid(CentroidClassifier),
}

impl ModelArtifact {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelArtifact::Gbdt(_) => ModelKind::Gbdt,
            ModelArtifact::NearestCentroid(_) => ModelKind::NearestCentroid,
        }
    }

    /// Structural checks run on freshly loaded artifacts.
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        match self {
            ModelArtifact::Gbdt(m) => m.validate(n_features),
            ModelArtifact::NearestCentroid(m) => m.validate(n_features),
        }
    }

    /// Hard-label predictions, used when evaluating a model before it goes live.
    pub fn predict_labels(&self, x: &FeatureMatrix) -> Result<Vec<String>, AppError> {
        match self {
            ModelArtifact::Gbdt(m) => m.predict_labels(x),
            ModelArtifact::NearestCentroid(m) => m.predict_labels(x),
        }
    }

    fn into_capabilities(self) -> (Scorer, Option<Vec<f64>>) {
        match self {
            ModelArtifact::Gbdt(m) => {
                let importances = m.feature_importances();
                (Scorer::Probabilities(Arc::new(m)), Some(importances))
            }
            ModelArtifact::NearestCentroid(m) => (Scorer::HardLabels(Arc::new(m)), None),
        }
    }
}

/// Provenance carried next to a live model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMeta {
    pub kind: ModelKind,
    pub trained_at: DateTime<Utc>,
    pub rows_used: usize,
}

/// A classifier ready to serve, with its capabilities resolved.
#[derive(Clone)]
pub struct LoadedModel {
    scorer: Scorer,
    importances: Option<Vec<f64>>,
    meta: ModelMeta,
}

impl LoadedModel {
    pub fn new(scorer: Scorer, importances: Option<Vec<f64>>, meta: ModelMeta) -> Self {
        Self {
            scorer,
            importances,
            meta,
        }
    }

    pub fn from_artifact(artifact: ModelArtifact, trained_at: DateTime<Utc>, rows_used: usize) -> Self {
        let kind = artifact.kind();
        let (scorer, importances) = artifact.into_capabilities();
        Self::new(
            scorer,
            importances,
            ModelMeta {
                kind,
                trained_at,
                rows_used,
            },
        )
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn importances(&self) -> Option<&[f64]> {
        self.importances.as_deref()
    }

    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("kind", &self.meta.kind)
            .field("trained_at", &self.meta.trained_at)
            .field("rows_used", &self.meta.rows_used)
            .field("has_importances", &self.importances.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[Vec<f64>]) -> FeatureMatrix {
        FeatureMatrix::from_rows(vec!["a".into(), "b".into()], rows).unwrap()
    }

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn gbdt_resolves_to_probabilities_with_importances() {
        let x = matrix(&[vec![0.0, 0.0], vec![0.1, 0.0], vec![5.0, 0.0], vec![5.1, 0.0]]);
        let y = labels(&["n", "n", "p", "p"]);
        let model = train_gbdt(&x, &y, &GbdtOptions::default()).unwrap();
        let loaded = LoadedModel::from_artifact(ModelArtifact::Gbdt(model), Utc::now(), 4);
        assert!(matches!(loaded.scorer(), Scorer::Probabilities(_)));
        assert_eq!(loaded.importances().map(<[f64]>::len), Some(2));
        assert_eq!(loaded.meta().kind, ModelKind::Gbdt);
    }

    #[test]
    fn centroid_resolves_to_hard_labels_without_importances() {
        let x = matrix(&[vec![0.0, 0.0], vec![5.0, 5.0]]);
        let model = train_centroid(&x, &labels(&["n", "p"])).unwrap();
        let loaded = LoadedModel::from_artifact(ModelArtifact::NearestCentroid(model), Utc::now(), 2);
        assert!(matches!(loaded.scorer(), Scorer::HardLabels(_)));
        assert!(loaded.importances().is_none());
    }

    #[test]
    fn artifact_json_is_tagged_by_kind() {
        let x = matrix(&[vec![0.0, 0.0], vec![5.0, 5.0]]);
        let model = train_centroid(&x, &labels(&["n", "p"])).unwrap();
        let json = serde_json::to_value(ModelArtifact::NearestCentroid(model)).unwrap();
        assert_eq!(json["kind"], "nearest_centroid");
        let back: ModelArtifact = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), ModelKind::NearestCentroid);
    }
}
