//! Fit-evaluate-persist pipeline shared by `retrain` and `bootstrap`.

use std::path::Path;

use crate::data::coerce;
use crate::domain::{ModelCard, ModelKind, RetrainParams, TrainReport};
use crate::engine::PredictionEngine;
use crate::error::AppError;
use crate::io::{FileLock, ModelFile, RawTable, write_model_file};
use crate::models::{GbdtOptions, ModelArtifact, train_centroid, train_gbdt};
use crate::store::FeedbackStore;

use super::metrics::{ConfusionMatrix, accuracy, macro_f1};
use super::split::stratified_split;

/// Train a fresh classifier on a labeled table and evaluate it on a held-out split.
///
/// The table must carry the card's features and target. Coercion runs over
/// the whole table; the returned `ModelFile` is ready to be persisted.
pub fn fit_from_table(
    card: &ModelCard,
    table: &RawTable,
    params: &RetrainParams,
    kind: ModelKind,
) -> Result<(ModelFile, TrainReport), AppError> {
    params.validate()?;
    table.require_columns(&card.labeled_columns())?;

    let rows = table.len();
    if rows < params.min_rows {
        return Err(AppError::InsufficientData {
            rows,
            min_rows: params.min_rows,
        });
    }

    let x = coerce(table, &card.features)?;
    let y = labels(table, &card.target)?;

    let split = stratified_split(&y, params.test_fraction, params.seed)?;
    tracing::debug!(
        train = split.train.len(),
        test = split.test.len(),
        seed = params.seed,
        "stratified split"
    );

    let x_train = x.select_rows(&split.train);
    let y_train: Vec<String> = split.train.iter().map(|&i| y[i].clone()).collect();
    let artifact = match kind {
        ModelKind::Gbdt => ModelArtifact::Gbdt(train_gbdt(&x_train, &y_train, &GbdtOptions::default())?),
        ModelKind::NearestCentroid => ModelArtifact::NearestCentroid(train_centroid(&x_train, &y_train)?),
    };

    let x_test = x.select_rows(&split.test);
    let y_test: Vec<String> = split.test.iter().map(|&i| y[i].clone()).collect();
    let predicted = artifact
        .predict_labels(&x_test)
        .map_err(|e| AppError::Training(format!("evaluation failed: {e}")))?;
    let cm = ConfusionMatrix::from_labels(&y_test, &predicted);

    let report = TrainReport {
        test_accuracy: accuracy(&cm),
        test_f1_macro: macro_f1(&cm),
        rows_used: rows,
    };
    tracing::info!(
        kind = kind.as_str(),
        rows,
        accuracy = report.test_accuracy,
        f1_macro = report.test_f1_macro,
        "trained classifier"
    );

    Ok((ModelFile::new(card.features.clone(), artifact, report), report))
}

/// Trimmed target labels; empty labels are rejected with their 1-based row numbers.
fn labels(table: &RawTable, target: &str) -> Result<Vec<String>, AppError> {
    let column = table
        .column(target)
        .ok_or_else(|| AppError::missing_columns(vec![target.to_string()]))?;
    let y: Vec<String> = column.iter().map(|l| l.trim().to_string()).collect();
    let empty: Vec<usize> = y
        .iter()
        .enumerate()
        .filter(|(_, l)| l.is_empty())
        .map(|(i, _)| i + 1)
        .collect();
    if !empty.is_empty() {
        return Err(AppError::EmptyLabels { rows: empty });
    }
    Ok(y)
}

/// Retrain from the feedback store, persist, then swap the live model.
///
/// Runs under the artifact's cross-process lock, so two processes never
/// retrain the same model at once. Nothing is written and nothing is swapped
/// unless every earlier stage succeeded; a persistence failure leaves the old
/// model serving.
pub fn retrain(
    card: &ModelCard,
    store: &FeedbackStore,
    model_path: &Path,
    engine: &PredictionEngine,
    params: &RetrainParams,
) -> Result<TrainReport, AppError> {
    let _lock = lock_artifact(model_path)?;
    let table = store.load()?;
    tracing::info!(rows = table.len(), path = %store.path().display(), "loaded feedback");

    let (model_file, report) = fit_from_table(card, &table, params, ModelKind::Gbdt)?;
    write_model_file(model_path, &model_file)?;
    tracing::info!(path = %model_path.display(), "persisted retrained model");

    engine.swap(model_file.into_loaded());
    Ok(report)
}

/// Train the first classifier from a labeled table and persist it.
pub fn bootstrap(
    card: &ModelCard,
    table: &RawTable,
    model_path: &Path,
    kind: ModelKind,
    params: &RetrainParams,
) -> Result<TrainReport, AppError> {
    let _lock = lock_artifact(model_path)?;
    let (model_file, report) = fit_from_table(card, table, params, kind)?;
    write_model_file(model_path, &model_file)?;
    tracing::info!(path = %model_path.display(), kind = kind.as_str(), "persisted bootstrap model");
    Ok(report)
}

fn lock_artifact(model_path: &Path) -> Result<FileLock, AppError> {
    FileLock::acquire(model_path).map_err(|e| {
        AppError::Persistence(format!("failed to lock '{}': {e}", model_path.display()))
    })
}

/// Defaults for `bootstrap`: like retrain, but any table with two rows per class will do.
pub fn bootstrap_params() -> RetrainParams {
    RetrainParams {
        min_rows: 2,
        ..RetrainParams::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{parse_csv, read_model_file};

    fn card() -> ModelCard {
        ModelCard {
            features: vec!["a".into(), "b".into()],
            classes: vec!["X".into(), "Y".into()],
            target: "label".into(),
        }
    }

    fn blobs(per_class: usize) -> RawTable {
        let mut text = String::from("a,b,label\n");
        for _ in 0..per_class {
            text.push_str("1,2,X\n5,6,Y\n");
        }
        parse_csv(text.as_bytes()).unwrap()
    }

    #[test]
    fn separable_blobs_score_perfectly() {
        let (file, report) = fit_from_table(&card(), &blobs(25), &RetrainParams::default(), ModelKind::Gbdt).unwrap();
        assert_eq!(report.rows_used, 50);
        assert_eq!(report.test_accuracy, 1.0);
        assert_eq!(report.test_f1_macro, 1.0);
        assert_eq!(file.metrics, Some(report));
        assert_eq!(file.features, card().features);
    }

    #[test]
    fn centroid_kind_trains_too() {
        let (file, report) =
            fit_from_table(&card(), &blobs(5), &bootstrap_params(), ModelKind::NearestCentroid).unwrap();
        assert_eq!(file.model.kind(), ModelKind::NearestCentroid);
        assert_eq!(report.test_accuracy, 1.0);
    }

    #[test]
    fn below_min_rows_is_insufficient() {
        let err = fit_from_table(&card(), &blobs(10), &RetrainParams::default(), ModelKind::Gbdt).unwrap_err();
        assert_eq!(err, AppError::InsufficientData { rows: 20, min_rows: 40 });
    }

    #[test]
    fn missing_target_is_reported() {
        let table = parse_csv(b"a,b\n1,2\n").unwrap();
        let err = fit_from_table(&card(), &table, &bootstrap_params(), ModelKind::Gbdt).unwrap_err();
        assert_eq!(err, AppError::missing_columns(vec!["label".to_string()]));
    }

    #[test]
    fn labels_are_trimmed() {
        let table = parse_csv(b"a,b,label\n1,2, X\n1,2,X \n5,6,Y\n5,6, Y \n").unwrap();
        let params = RetrainParams {
            test_fraction: 0.5,
            ..bootstrap_params()
        };
        let (file, _) = fit_from_table(&card(), &table, &params, ModelKind::NearestCentroid).unwrap();
        let ModelArtifact::NearestCentroid(model) = file.model else {
            panic!("expected centroid model");
        };
        assert_eq!(model.classes, vec!["X", "Y"]);
    }

    #[test]
    fn unstratifiable_data_fails_explicitly() {
        let table = parse_csv(b"a,b,label\n1,2,X\n1,2,X\n1,2,X\n5,6,Y\n").unwrap();
        let err = fit_from_table(&card(), &table, &bootstrap_params(), ModelKind::Gbdt).unwrap_err();
        assert_eq!(err.kind(), "stratification_error");
    }

    #[test]
    fn bootstrap_persists_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let report = bootstrap(&card(), &blobs(10), &path, ModelKind::Gbdt, &bootstrap_params()).unwrap();
        assert_eq!(report.rows_used, 20);
        let file = read_model_file(&path, &card()).unwrap();
        assert_eq!(file.model.kind(), ModelKind::Gbdt);
    }
}
