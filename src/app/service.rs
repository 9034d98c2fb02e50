//! Service facade: the boundary operations, wired to their collaborators.
//!
//! A `Service` owns the model card, the prediction engine (live model handle)
//! and the feedback store. Front-ends (the CLI today) only talk to this type.

use std::sync::{Arc, Mutex, PoisonError};

use crate::data::coerce;
use crate::domain::{
    Explanation, FeedbackReceipt, Health, ModelCard, ModelKind, PredictionResult, RetrainParams, ServiceConfig,
    TrainReport,
};
use crate::engine::PredictionEngine;
use crate::error::AppError;
use crate::io::{RawTable, read_model_card, read_model_file};
use crate::store::FeedbackStore;
use crate::train;

pub struct Service {
    config: ServiceConfig,
    card: Arc<ModelCard>,
    engine: PredictionEngine,
    feedback: FeedbackStore,
    retrain_lock: Mutex<()>,
}

impl Service {
    /// Load the model card and the model artifact. Any failure here is fatal.
    pub fn open(config: ServiceConfig) -> Result<Self, AppError> {
        let card = Arc::new(read_model_card(&config.card_path)?);
        let model = read_model_file(&config.model_path, &card)?.into_loaded();
        tracing::info!(
            card = %config.card_path.display(),
            model = %config.model_path.display(),
            kind = model.meta().kind.as_str(),
            features = card.features.len(),
            "service ready"
        );
        Ok(Self {
            engine: PredictionEngine::new(Arc::clone(&card), model),
            feedback: FeedbackStore::new(config.feedback_path.clone()),
            card,
            config,
            retrain_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn engine(&self) -> &PredictionEngine {
        &self.engine
    }

    /// Features, classes and target, exactly as loaded.
    pub fn feature_schema(&self) -> &ModelCard {
        &self.card
    }

    pub fn health(&self) -> Health {
        let model = self.engine.current();
        Health {
            ok: true,
            model_loaded: true,
            n_features: self.card.features.len(),
            version: env!("CARGO_PKG_VERSION"),
            model_kind: model.meta().kind,
            trained_at: model.meta().trained_at,
        }
    }

    pub fn predict(&self, table: &RawTable) -> Result<Vec<PredictionResult>, AppError> {
        let x = coerce(table, &self.card.features)?;
        self.engine.predict(&x)
    }

    pub fn submit_feedback(&self, table: &RawTable, label_column: Option<&str>) -> Result<FeedbackReceipt, AppError> {
        let stored_rows = self.feedback.append(&self.card, table, label_column)?;
        Ok(FeedbackReceipt { stored_rows })
    }

    /// Retrain from all stored feedback. Concurrent calls run one at a time.
    pub fn retrain(&self, params: &RetrainParams) -> Result<TrainReport, AppError> {
        let _guard = self.retrain_lock.lock().unwrap_or_else(PoisonError::into_inner);
        train::retrain(
            &self.card,
            &self.feedback,
            &self.config.model_path,
            &self.engine,
            params,
        )
    }

    pub fn explain(&self, top_k: usize) -> Explanation {
        self.engine.explain(top_k)
    }
}

/// Train and persist the first model. Only the model card needs to exist.
pub fn bootstrap(
    config: &ServiceConfig,
    table: &RawTable,
    kind: ModelKind,
    params: &RetrainParams,
) -> Result<TrainReport, AppError> {
    let card = read_model_card(&config.card_path)?;
    train::bootstrap(&card, table, &config.model_path, kind, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{backup_path, parse_csv};

    fn setup(dir: &std::path::Path, classes: &str) -> ServiceConfig {
        let config = ServiceConfig {
            model_path: dir.join("models").join("model.json"),
            card_path: dir.join("models").join("model_card.json"),
            feedback_path: dir.join("data").join("feedback.csv"),
        };
        std::fs::create_dir_all(dir.join("models")).unwrap();
        std::fs::write(
            &config.card_path,
            format!(r#"{{"features":["a","b"],"classes":{classes},"target":"label"}}"#),
        )
        .unwrap();
        config
    }

    fn seed_table() -> RawTable {
        parse_csv(b"a,b,label\n0,0,X\n0,1,X\n9,9,Y\n9,8,Y\n1,0,X\n8,9,Y\n").unwrap()
    }

    fn service(dir: &std::path::Path) -> Service {
        let config = setup(dir, r#"["X","Y"]"#);
        let params = RetrainParams {
            test_fraction: 0.34,
            ..train::bootstrap_params()
        };
        bootstrap(&config, &seed_table(), ModelKind::Gbdt, &params).unwrap();
        Service::open(config).unwrap()
    }

    #[test]
    fn open_without_model_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(dir.path(), "[]");
        let err = Service::open(config).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn health_and_schema_reflect_loaded_state() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let health = svc.health();
        assert!(health.ok && health.model_loaded);
        assert_eq!(health.n_features, 2);
        assert_eq!(health.model_kind, ModelKind::Gbdt);
        assert_eq!(svc.feature_schema().target, "label");
    }

    #[test]
    fn schema_is_stable_across_predict_and_feedback() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let before = svc.feature_schema().clone();

        svc.predict(&parse_csv(b"a,b\n1,2\n").unwrap()).unwrap();
        svc.submit_feedback(&parse_csv(b"b,a,label\n2,1,X\n").unwrap(), None)
            .unwrap();

        assert_eq!(svc.feature_schema(), &before);
        assert_eq!(before.features, vec!["a", "b"]);
    }

    #[test]
    fn predict_reports_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let err = svc.predict(&parse_csv(b"a\n1\n").unwrap()).unwrap_err();
        assert_eq!(err.to_response().missing, Some(vec!["b".to_string()]));
    }

    #[test]
    fn retrain_without_feedback_keeps_model() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let before = svc.engine().current();
        let err = svc.retrain(&RetrainParams::default()).unwrap_err();
        assert_eq!(err.kind(), "no_feedback_data");
        assert!(Arc::ptr_eq(&before, &svc.engine().current()));
    }

    #[test]
    fn persistence_failure_keeps_old_model_live() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let mut text = String::from("a,b,label\n");
        for _ in 0..10 {
            text.push_str("0,0,X\n9,9,Y\n");
        }
        svc.submit_feedback(&parse_csv(text.as_bytes()).unwrap(), None).unwrap();

        // A directory where the backup should go makes the backup copy fail.
        std::fs::create_dir(backup_path(&svc.config().model_path)).unwrap();
        let before = svc.engine().current();
        let params = RetrainParams {
            min_rows: 10,
            ..RetrainParams::default()
        };
        let err = svc.retrain(&params).unwrap_err();
        assert_eq!(err.kind(), "persistence_error");
        assert!(Arc::ptr_eq(&before, &svc.engine().current()));
    }

    #[test]
    fn explain_is_supported_for_gbdt() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let Explanation::Ranked(ranked) = svc.explain(15) else {
            panic!("gbdt exposes importances");
        };
        assert_eq!(ranked.len(), 2);
    }
}
