//! Held-out evaluation metrics.

use std::collections::BTreeSet;

/// Confusion matrix over string labels.
///
/// The label set is the sorted union of the true and predicted labels, so a
/// class that only ever appears as a (wrong) prediction still counts.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    pub fn from_labels(truth: &[String], predicted: &[String]) -> Self {
        let labels: Vec<String> = truth
            .iter()
            .chain(predicted)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let k = labels.len();
        let mut cm = Self {
            labels,
            counts: vec![0; k * k],
        };
        for (t, p) in truth.iter().zip(predicted) {
            let (Some(ti), Some(pi)) = (cm.index_of(t), cm.index_of(p)) else {
                continue;
            };
            let idx = ti * k + pi;
            cm.counts[idx] = cm.counts[idx].saturating_add(1);
        }
        cm
    }

    pub fn n_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes() + predicted]
    }

    fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.binary_search_by(|l| l.as_str().cmp(label)).ok()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    pub fn correct(&self) -> u64 {
        (0..self.n_classes()).map(|i| u64::from(self.get(i, i))).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerClassStats {
    /// `TP / (TP + FP)`.
    pub precision: f64,
    /// `TP / (TP + FN)`.
    pub recall: f64,
    pub f1: f64,
    pub support: u32,
}

pub fn per_class_stats(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    let k = cm.n_classes();
    (0..k)
        .map(|c| {
            let tp = f64::from(cm.get(c, c));
            let mut fp = 0.0;
            let mut fn_ = 0.0;
            let mut support = 0u32;
            for j in 0..k {
                let v = cm.get(c, j);
                support = support.saturating_add(v);
                if j != c {
                    fn_ += f64::from(v);
                    fp += f64::from(cm.get(j, c));
                }
            }
            let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
            let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
            let f1 = if precision + recall == 0.0 {
                0.0
            } else {
                2.0 * precision * recall / (precision + recall)
            };
            PerClassStats {
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect()
}

pub fn accuracy(cm: &ConfusionMatrix) -> f64 {
    let total = cm.total();
    if total == 0 {
        0.0
    } else {
        cm.correct() as f64 / total as f64
    }
}

/// Unweighted mean of per-class F1 (undefined precision/recall count as 0).
pub fn macro_f1(cm: &ConfusionMatrix) -> f64 {
    let stats = per_class_stats(cm);
    if stats.is_empty() {
        return 0.0;
    }
    stats.iter().map(|s| s.f1).sum::<f64>() / stats.len() as f64
}
