//! Gradient-boosted decision-stump classifier.
//!
//! Multi-class softmax boosting where every round fits one stump per class to
//! the residuals `onehot(y) - softmax(raw)`. Split search runs on binned
//! features, in parallel across features. Training is deterministic for a
//! given training set: ties between equally good splits go to the lower
//! feature index.
//!
//! Feature importance is the total squared-error reduction contributed by
//! each feature's splits, normalised to sum to 1.

use std::collections::BTreeSet;

use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{Classifier, FeatureImportances, ProbabilisticClassifier};
use crate::domain::{FeatureMatrix, ModelKind};
use crate::error::AppError;

/// Single-split tree used as the weak learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    pub feature_index: usize,
    pub threshold: f64,
    /// Output for `feature <= threshold`.
    pub left_value: f64,
    /// Output for `feature > threshold`.
    pub right_value: f64,
}

impl Stump {
    pub fn predict(&self, features: &[f64]) -> f64 {
        let value = features.get(self.feature_index).copied().unwrap_or(0.0);
        if value <= self.threshold {
            self.left_value
        } else {
            self.right_value
        }
    }
}

/// Training hyperparameters.
#[derive(Debug, Clone)]
pub struct GbdtOptions {
    pub rounds: usize,
    pub learning_rate: f64,
    /// Number of bins used for split search (clamped to 2..=256).
    pub bins: usize,
}

impl Default for GbdtOptions {
    fn default() -> Self {
        Self {
            rounds: 100,
            learning_rate: 0.1,
            bins: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtClassifier {
    pub n_features: usize,
    /// Sorted class labels; probability columns follow this order.
    pub classes: Vec<String>,
    pub learning_rate: f64,
    /// Log class priors the boosting starts from.
    pub init_raw: Vec<f64>,
    /// Shape: `[n_rounds][n_classes]`.
    pub stumps: Vec<Vec<Stump>>,
    pub importances: Vec<f64>,
}

impl GbdtClassifier {
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.n_features != n_features {
            return Err(format!(
                "model expects {} feature(s) but the card declares {n_features}",
                self.n_features
            ));
        }
        if self.classes.len() < 2 {
            return Err("model must contain at least 2 classes".to_string());
        }
        if self.init_raw.len() != self.classes.len() {
            return Err("init_raw length must match classes length".to_string());
        }
        if self.importances.len() != self.n_features {
            return Err("importances length must match feature count".to_string());
        }
        for (round_idx, round) in self.stumps.iter().enumerate() {
            if round.len() != self.classes.len() {
                return Err(format!(
                    "round {round_idx} has {} stumps but expected {}",
                    round.len(),
                    self.classes.len()
                ));
            }
            if let Some(s) = round.iter().find(|s| s.feature_index >= self.n_features) {
                return Err(format!(
                    "round {round_idx} splits on feature {} (only {} exist)",
                    s.feature_index, self.n_features
                ));
            }
        }
        Ok(())
    }

    pub fn predict_raw(&self, features: &[f64]) -> Vec<f64> {
        let mut raw = self.init_raw.clone();
        for round in &self.stumps {
            for (class_idx, stump) in round.iter().enumerate() {
                raw[class_idx] += self.learning_rate * stump.predict(features);
            }
        }
        raw
    }

    pub fn predict_row_proba(&self, features: &[f64]) -> Vec<f64> {
        softmax(&self.predict_raw(features))
    }

    fn check_width(&self, x: &FeatureMatrix) -> Result<(), AppError> {
        if x.n_cols() != self.n_features {
            return Err(AppError::Inference(format!(
                "model expects {} feature(s), got {}",
                self.n_features,
                x.n_cols()
            )));
        }
        Ok(())
    }
}

impl Classifier for GbdtClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::Gbdt
    }

    fn predict_labels(&self, x: &FeatureMatrix) -> Result<Vec<String>, AppError> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .row_iter()
            .map(|row| {
                let values: Vec<f64> = row.iter().copied().collect();
                self.classes[argmax(&values)].clone()
            })
            .collect())
    }

    fn classes(&self) -> Option<&[String]> {
        Some(&self.classes)
    }
}

impl ProbabilisticClassifier for GbdtClassifier {
    fn predict_proba(&self, x: &FeatureMatrix) -> Result<DMatrix<f64>, AppError> {
        self.check_width(x)?;
        let rows = x.to_rows();
        let probs: Vec<Vec<f64>> = rows.par_iter().map(|r| self.predict_row_proba(r)).collect();
        let k = self.classes.len();
        Ok(DMatrix::from_fn(rows.len(), k, |i, j| probs[i][j]))
    }
}

impl FeatureImportances for GbdtClassifier {
    fn feature_importances(&self) -> Vec<f64> {
        self.importances.clone()
    }
}

/// Numerically stable softmax.
pub fn softmax(raw: &[f64]) -> Vec<f64> {
    if raw.is_empty() {
        return Vec::new();
    }
    let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = raw.iter().map(|&v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![1.0 / raw.len() as f64; raw.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the first strictly maximal value.
pub fn argmax(values: &[f64]) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f64::NEG_INFINITY;
    for (idx, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = idx;
        }
    }
    best_idx
}

/// Train a classifier from scratch on `x` with string labels `y`.
pub fn train_gbdt(x: &FeatureMatrix, y: &[String], options: &GbdtOptions) -> Result<GbdtClassifier, AppError> {
    if x.n_rows() != y.len() {
        return Err(AppError::Training(format!(
            "{} feature row(s) but {} label(s)",
            x.n_rows(),
            y.len()
        )));
    }
    if y.is_empty() || x.n_cols() == 0 {
        return Err(AppError::Training("empty training set".to_string()));
    }
    let classes: Vec<String> = y.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
    let n_classes = classes.len();
    if n_classes < 2 {
        return Err(AppError::Training(format!(
            "need at least 2 classes, found {n_classes}"
        )));
    }
    let y_idx: Vec<usize> = y
        .iter()
        .map(|label| classes.binary_search(label).unwrap_or(0))
        .collect();

    let n = x.n_rows();
    let d = x.n_cols();
    let bins = options.bins.clamp(2, 256);
    let rows = x.to_rows();
    let (mins, maxs) = feature_min_max(&rows, d);
    let binned = bin_features(&rows, &mins, &maxs, bins);

    let init_raw: Vec<f64> = class_priors(&y_idx, n_classes)
        .iter()
        .map(|&p| p.max(1e-6).ln())
        .collect();
    let mut raw = vec![init_raw.clone(); n];
    let mut gains = vec![0.0f64; d];

    let mut rounds_out: Vec<Vec<Stump>> = Vec::with_capacity(options.rounds);
    for _ in 0..options.rounds {
        let probs: Vec<Vec<f64>> = raw.par_iter().map(|r| softmax(r)).collect();
        let residuals = compute_residuals(&y_idx, &probs, n_classes);

        let mut stumps_for_round = Vec::with_capacity(n_classes);
        for class_residuals in &residuals {
            let best = (0..d)
                .into_par_iter()
                .map(|f| best_split_for_feature(&binned[f], class_residuals, f, bins))
                .reduce(BestSplit::identity, BestSplit::better);

            if best.gain.is_finite() && best.gain > 0.0 {
                gains[best.feature_index] += best.gain;
            }

            let feature_idx = best.feature_index.min(d - 1);
            let threshold = threshold_for_bin(mins[feature_idx], maxs[feature_idx], best.split_bin, bins);
            let (left_value, right_value) = leaf_means(&rows, class_residuals, feature_idx, threshold);
            stumps_for_round.push(Stump {
                feature_index: feature_idx,
                threshold,
                left_value,
                right_value,
            });
        }

        for (i, row) in rows.iter().enumerate() {
            for (class_idx, stump) in stumps_for_round.iter().enumerate() {
                raw[i][class_idx] += options.learning_rate * stump.predict(row);
            }
        }
        rounds_out.push(stumps_for_round);
    }

    let total_gain: f64 = gains.iter().sum();
    let importances = if total_gain > 0.0 {
        gains.iter().map(|g| g / total_gain).collect()
    } else {
        vec![0.0; d]
    };

    tracing::debug!(
        rows = n,
        features = d,
        classes = n_classes,
        rounds = options.rounds,
        "trained gradient-boosted stumps"
    );

    Ok(GbdtClassifier {
        n_features: d,
        classes,
        learning_rate: options.learning_rate,
        init_raw,
        stumps: rounds_out,
        importances,
    })
}

fn class_priors(y: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &label in y {
        counts[label] += 1;
    }
    let total = y.len().max(1) as f64;
    counts.into_iter().map(|c| c as f64 / total).collect()
}

/// Residuals laid out as `[class][row]`.
fn compute_residuals(y: &[usize], probs: &[Vec<f64>], n_classes: usize) -> Vec<Vec<f64>> {
    let mut residuals = vec![vec![0.0f64; y.len()]; n_classes];
    for (i, &yi) in y.iter().enumerate() {
        for k in 0..n_classes {
            let target = if yi == k { 1.0 } else { 0.0 };
            residuals[k][i] = target - probs[i][k];
        }
    }
    residuals
}

fn feature_min_max(rows: &[Vec<f64>], d: usize) -> (Vec<f64>, Vec<f64>) {
    let mut mins = vec![f64::INFINITY; d];
    let mut maxs = vec![f64::NEG_INFINITY; d];
    for row in rows {
        for (j, &v) in row.iter().take(d).enumerate() {
            mins[j] = mins[j].min(v);
            maxs[j] = maxs[j].max(v);
        }
    }
    for j in 0..d {
        if !mins[j].is_finite() || !maxs[j].is_finite() {
            mins[j] = 0.0;
            maxs[j] = 0.0;
        }
        if mins[j] == maxs[j] {
            maxs[j] = mins[j] + 1.0;
        }
    }
    (mins, maxs)
}

/// Bin indices laid out as `[feature][row]`.
fn bin_features(rows: &[Vec<f64>], mins: &[f64], maxs: &[f64], bins: usize) -> Vec<Vec<u8>> {
    let top = (bins - 1) as f64;
    (0..mins.len())
        .map(|j| {
            let (min, max) = (mins[j], maxs[j]);
            rows.iter()
                .map(|row| {
                    let t = ((row[j] - min) / (max - min)).clamp(0.0, 1.0);
                    (t * top).round() as u8
                })
                .collect()
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct BestSplit {
    score: f64,
    gain: f64,
    feature_index: usize,
    split_bin: usize,
}

impl BestSplit {
    fn identity() -> Self {
        Self {
            score: f64::INFINITY,
            gain: 0.0,
            feature_index: usize::MAX,
            split_bin: 0,
        }
    }

    /// Lower score wins; equal scores go to the lower feature index.
    fn better(a: Self, b: Self) -> Self {
        if b.score < a.score || (b.score == a.score && b.feature_index < a.feature_index) {
            b
        } else {
            a
        }
    }
}

fn best_split_for_feature(binned: &[u8], residuals: &[f64], feature_idx: usize, bins: usize) -> BestSplit {
    let mut counts = vec![0u32; bins];
    let mut sums = vec![0f64; bins];
    let mut sums_sq = vec![0f64; bins];
    for (&b, &r) in binned.iter().zip(residuals) {
        let b = b as usize;
        counts[b] += 1;
        sums[b] += r;
        sums_sq[b] += r * r;
    }
    let total_count: u32 = counts.iter().sum();
    let mut out = BestSplit {
        feature_index: feature_idx,
        ..BestSplit::identity()
    };
    if total_count == 0 {
        return out;
    }
    let total_sum: f64 = sums.iter().sum();
    let total_sum_sq: f64 = sums_sq.iter().sum();
    let total_sse = total_sum_sq - (total_sum * total_sum) / total_count as f64;

    let mut left_count = 0u32;
    let mut left_sum = 0f64;
    let mut left_sum_sq = 0f64;

    for split_bin in 0..(bins - 1) {
        left_count += counts[split_bin];
        left_sum += sums[split_bin];
        left_sum_sq += sums_sq[split_bin];
        let right_count = total_count - left_count;
        if left_count == 0 || right_count == 0 {
            continue;
        }
        let right_sum = total_sum - left_sum;
        let right_sum_sq = total_sum_sq - left_sum_sq;
        let left_sse = left_sum_sq - (left_sum * left_sum) / left_count as f64;
        let right_sse = right_sum_sq - (right_sum * right_sum) / right_count as f64;
        let score = left_sse + right_sse;
        if score < out.score {
            out.score = score;
            out.split_bin = split_bin;
        }
    }

    if out.score.is_finite() {
        out.gain = total_sse - out.score;
    }
    out
}

fn threshold_for_bin(min: f64, max: f64, split_bin: usize, bins: usize) -> f64 {
    // Bins are centred on round(t * (bins - 1)); the edge between bin b and
    // b + 1 sits at t = (b + 0.5) / (bins - 1).
    let t = (split_bin as f64 + 0.5) / (bins - 1) as f64;
    min + t * (max - min)
}

fn leaf_means(rows: &[Vec<f64>], residuals: &[f64], feature_idx: usize, threshold: f64) -> (f64, f64) {
    let (mut left_sum, mut left_count) = (0.0f64, 0u32);
    let (mut right_sum, mut right_count) = (0.0f64, 0u32);
    for (row, &r) in rows.iter().zip(residuals) {
        if row[feature_idx] <= threshold {
            left_sum += r;
            left_count += 1;
        } else {
            right_sum += r;
            right_count += 1;
        }
    }
    let mean = |sum: f64, count: u32| if count == 0 { 0.0 } else { sum / count as f64 };
    (mean(left_sum, left_count), mean(right_sum, right_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> (FeatureMatrix, Vec<String>) {
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            let jitter = i as f64 * 0.01;
            rows.push(vec![1.0 + jitter, 2.0]);
            y.push("X".to_string());
            rows.push(vec![5.0 + jitter, 6.0]);
            y.push("Y".to_string());
        }
        (
            FeatureMatrix::from_rows(vec!["a".into(), "b".into()], &rows).unwrap(),
            y,
        )
    }

    #[test]
    fn stump_predict_branches() {
        let stump = Stump {
            feature_index: 0,
            threshold: 0.5,
            left_value: -1.0,
            right_value: 2.0,
        };
        assert_eq!(stump.predict(&[0.0]), -1.0);
        assert_eq!(stump.predict(&[0.5]), -1.0);
        assert_eq!(stump.predict(&[0.6]), 2.0);
    }

    #[test]
    fn softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p[2] > p[1] && p[1] > p[0]);
    }

    #[test]
    fn argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
    }

    #[test]
    fn separates_two_blobs() {
        let (x, y) = two_blobs();
        let model = train_gbdt(&x, &y, &GbdtOptions::default()).unwrap();
        assert_eq!(model.classes, vec!["X", "Y"]);
        let probe = FeatureMatrix::from_rows(
            vec!["a".into(), "b".into()],
            &[vec![1.0, 2.0], vec![5.0, 6.0]],
        )
        .unwrap();
        let proba = model.predict_proba(&probe).unwrap();
        assert!(proba[(0, 0)] > proba[(0, 1)]);
        assert!(proba[(1, 1)] > proba[(1, 0)]);
        for i in 0..2 {
            let s: f64 = proba.row(i).iter().sum();
            assert!((s - 1.0).abs() < 1e-9);
        }
        assert_eq!(model.predict_labels(&probe).unwrap(), vec!["X", "Y"]);
    }

    #[test]
    fn importances_sum_to_one_and_favor_informative_feature() {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![if i % 2 == 0 { 0.0 } else { 10.0 }, 3.0])
            .collect();
        let y: Vec<String> = (0..40)
            .map(|i| if i % 2 == 0 { "lo" } else { "hi" }.to_string())
            .collect();
        let x = FeatureMatrix::from_rows(vec!["signal".into(), "constant".into()], &rows).unwrap();
        let model = train_gbdt(&x, &y, &GbdtOptions::default()).unwrap();
        let imp = model.feature_importances();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn training_is_deterministic() {
        let (x, y) = two_blobs();
        let a = train_gbdt(&x, &y, &GbdtOptions::default()).unwrap();
        let b = train_gbdt(&x, &y, &GbdtOptions::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_class_is_rejected() {
        let x = FeatureMatrix::from_rows(vec!["a".into()], &[vec![1.0], vec![2.0]]).unwrap();
        let err = train_gbdt(&x, &["X".to_string(), "X".to_string()], &GbdtOptions::default()).unwrap_err();
        assert_eq!(err.kind(), "training_error");
    }

    #[test]
    fn validate_catches_shape_mismatch() {
        let (x, y) = two_blobs();
        let model = train_gbdt(&x, &y, &GbdtOptions { rounds: 3, ..GbdtOptions::default() }).unwrap();
        assert!(model.validate(2).is_ok());
        assert!(model.validate(3).is_err());
    }

    #[test]
    fn wrong_width_is_inference_error() {
        let (x, y) = two_blobs();
        let model = train_gbdt(&x, &y, &GbdtOptions { rounds: 2, ..GbdtOptions::default() }).unwrap();
        let narrow = FeatureMatrix::from_rows(vec!["a".into()], &[vec![1.0]]).unwrap();
        assert_eq!(model.predict_proba(&narrow).unwrap_err().kind(), "inference_error");
    }
}
