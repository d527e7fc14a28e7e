//! Seeded stratified splitting

use crate::error::{Result, StressError};
use crate::types::Label;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of a train/test partition, each sorted ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Count of (relaxed, stressed) labels
pub fn class_counts(labels: &[Label]) -> (usize, usize) {
    let stressed = labels.iter().filter(|l| l.is_stressed()).count();
    (labels.len() - stressed, stressed)
}

fn class_indices(labels: &[Label]) -> [Vec<usize>; 2] {
    let mut relaxed = Vec::new();
    let mut stressed = Vec::new();
    for (i, label) in labels.iter().enumerate() {
        if label.is_stressed() {
            stressed.push(i);
        } else {
            relaxed.push(i);
        }
    }
    [relaxed, stressed]
}

/// Split so each class keeps its proportion in both halves.
///
/// Every class contributes at least one row to each side, so both classes
/// need two or more rows.
pub fn stratified_split(labels: &[Label], test_ratio: f64, seed: u64) -> Result<SplitIndices> {
    if !test_ratio.is_finite() || test_ratio <= 0.0 || test_ratio >= 1.0 {
        return Err(StressError::Validation(format!(
            "test_ratio must be in (0, 1), got {test_ratio}"
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for (class, mut indices) in class_indices(labels).into_iter().enumerate() {
        if indices.len() < 2 {
            return Err(StressError::Validation(format!(
                "class {} has {} rows; at least 2 are needed to split",
                Label::from_stressed(class == 1),
                indices.len()
            )));
        }
        indices.shuffle(&mut rng);
        let n_test = ((indices.len() as f64 * test_ratio).round() as usize).clamp(1, indices.len() - 1);
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(SplitIndices { train, test })
}

/// Stratified k-fold: returns `k` (train, test) partitions.
///
/// Rows of each class are shuffled then dealt round-robin across folds.
pub fn stratified_k_fold(labels: &[Label], k: usize, seed: u64) -> Result<Vec<SplitIndices>> {
    if k < 2 {
        return Err(StressError::Validation(format!(
            "k-fold needs k >= 2, got {k}"
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut fold_of = vec![0usize; labels.len()];

    for (class, mut indices) in class_indices(labels).into_iter().enumerate() {
        if indices.len() < k {
            return Err(StressError::Validation(format!(
                "class {} has {} rows, fewer than {k} folds",
                Label::from_stressed(class == 1),
                indices.len()
            )));
        }
        indices.shuffle(&mut rng);
        for (pos, idx) in indices.into_iter().enumerate() {
            fold_of[idx] = pos % k;
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| fold_of[i] == fold);
            SplitIndices { train, test }
        })
        .collect())
}
