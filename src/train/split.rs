//! Seeded stratified train/test split.
//!
//! Each class contributes to the test partition in proportion to its share of
//! the data (largest-remainder rounding). A split that cannot keep every class
//! on both sides is an error; there is no silent fallback to a plain split.

use std::collections::BTreeMap;

use rand::prelude::*;
use rand::rngs::StdRng;

use crate::error::AppError;

/// Row indices of each partition, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

pub fn stratified_split(labels: &[String], test_fraction: f64, seed: u64) -> Result<Split, AppError> {
    let n = labels.len();
    if !(test_fraction.is_finite() && test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(AppError::InvalidArgument(format!(
            "test fraction must be in (0, 1), got {test_fraction}"
        )));
    }

    let mut by_class: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(label.as_str()).or_default().push(i);
    }
    let n_classes = by_class.len();

    if let Some((label, members)) = by_class.iter().find(|(_, m)| m.len() < 2) {
        return Err(AppError::Stratification(format!(
            "class `{label}` has only {} example(s); every class needs at least 2",
            members.len()
        )));
    }

    // Small epsilon so e.g. 0.2 * 50 does not round up to 11.
    let n_test = ((test_fraction * n as f64) - 1e-9).ceil().max(0.0) as usize;
    let n_train = n.saturating_sub(n_test);
    if n_test < n_classes || n_train < n_classes {
        return Err(AppError::Stratification(format!(
            "{n_test} test / {n_train} train row(s) cannot hold all {n_classes} classes"
        )));
    }

    let quotas = allocate_test_quotas(&by_class, n_test, n);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);
    for ((_, members), quota) in by_class.iter().zip(quotas) {
        let mut shuffled = members.clone();
        shuffled.shuffle(&mut rng);
        let (t, rest) = shuffled.split_at(quota);
        test.extend_from_slice(t);
        train.extend_from_slice(rest);
    }
    train.sort_unstable();
    test.sort_unstable();

    Ok(Split { train, test })
}

/// Per-class test counts summing to `n_test`, each within `1..=count-1`.
fn allocate_test_quotas(by_class: &BTreeMap<&str, Vec<usize>>, n_test: usize, n: usize) -> Vec<usize> {
    let exact: Vec<f64> = by_class
        .values()
        .map(|m| m.len() as f64 * n_test as f64 / n as f64)
        .collect();
    let mut quotas: Vec<usize> = by_class
        .values()
        .zip(&exact)
        .map(|(m, e)| (e.floor() as usize).clamp(1, m.len() - 1))
        .collect();

    // Hand out (or take back) rows by largest remainder; ties go to the earlier class.
    let mut order: Vec<usize> = (0..quotas.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    let sizes: Vec<usize> = by_class.values().map(Vec::len).collect();

    let mut assigned: usize = quotas.iter().sum();
    while assigned < n_test {
        let Some(&k) = order.iter().find(|&&k| quotas[k] < sizes[k] - 1) else {
            break;
        };
        quotas[k] += 1;
        assigned += 1;
        order.rotate_left(1);
    }
    while assigned > n_test {
        let Some(&k) = order.iter().rev().find(|&&k| quotas[k] > 1) else {
            break;
        };
        quotas[k] -= 1;
        assigned -= 1;
        order.rotate_right(1);
    }
    quotas
}
