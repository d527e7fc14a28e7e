//! Evaluation metrics for binary stress classification
//!
//! All functions take 0/1 ground truth as [`Label`]s and either predicted
//! labels or stressed-class scores.

use crate::types::Label;
use serde::{Deserialize, Serialize};

/// Fraction of matching labels; 0 for empty input
pub fn accuracy(truth: &[Label], predicted: &[Label]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = truth.iter().zip(predicted).filter(|(a, b)| a == b).count();
    correct as f64 / truth.len() as f64
}

/// Area under the ROC curve (Mann-Whitney U with average ranks for ties).
///
/// Returns `None` when only one class is present.
pub fn roc_auc(truth: &[Label], scores: &[f64]) -> Option<f64> {
    let positives = truth.iter().filter(|l| l.is_stressed()).count();
    let negatives = truth.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        // 1-based average rank of the tie group
        let rank = (start + end) as f64 / 2.0 + 1.0;
        for &idx in &order[start..=end] {
            ranks[idx] = rank;
        }
        start = end + 1;
    }

    let positive_rank_sum: f64 = truth
        .iter()
        .zip(&ranks)
        .filter(|(l, _)| l.is_stressed())
        .map(|(_, r)| r)
        .sum();
    let p = positives as f64;
    let u = positive_rank_sum - p * (p + 1.0) / 2.0;
    Some(u / (p * negatives as f64))
}

/// One operating point on the ROC curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub fpr: f64,
    pub tpr: f64,
    /// Scores `>= threshold` are called stressed; `None` for the origin
    pub threshold: Option<f64>,
}

/// ROC curve from the origin to (1, 1), one point per distinct score
pub fn roc_curve(truth: &[Label], scores: &[f64]) -> Vec<RocPoint> {
    let positives = truth.iter().filter(|l| l.is_stressed()).count() as f64;
    let negatives = truth.len() as f64 - positives;

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut points = vec![RocPoint {
        fpr: 0.0,
        tpr: 0.0,
        threshold: None,
    }];
    let (mut tp, mut fp) = (0.0, 0.0);
    for (pos, &idx) in order.iter().enumerate() {
        if truth[idx].is_stressed() {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let last_of_group = order
            .get(pos + 1)
            .map_or(true, |&next| scores[next] != scores[idx]);
        if last_of_group {
            points.push(RocPoint {
                fpr: if negatives > 0.0 { fp / negatives } else { 0.0 },
                tpr: if positives > 0.0 { tp / positives } else { 0.0 },
                threshold: Some(scores[idx]),
            });
        }
    }
    points
}

/// 2x2 confusion matrix with stressed as the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(truth: &[Label], predicted: &[Label]) -> Self {
        let mut m = Self::default();
        for (t, p) in truth.iter().zip(predicted) {
            match (t, p) {
                (Label::Relaxed, Label::Relaxed) => m.true_negative += 1,
                (Label::Relaxed, Label::Stressed) => m.false_positive += 1,
                (Label::Stressed, Label::Relaxed) => m.false_negative += 1,
                (Label::Stressed, Label::Stressed) => m.true_positive += 1,
            }
        }
        m
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }
}

/// Precision, recall and F1 for one class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn from_counts(tp: usize, fp: usize, fn_: usize) -> Self {
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
            support: tp + fn_,
        }
    }
}

/// Per-class report plus accuracy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub relaxed: ClassMetrics,
    pub stressed: ClassMetrics,
    pub accuracy: f64,
}

impl ClassificationReport {
    pub fn from_confusion(m: &ConfusionMatrix) -> Self {
        let total = m.total();
        Self {
            relaxed: ClassMetrics::from_counts(m.true_negative, m.false_negative, m.false_positive),
            stressed: ClassMetrics::from_counts(m.true_positive, m.false_positive, m.false_negative),
            accuracy: if total == 0 {
                0.0
            } else {
                (m.true_negative + m.true_positive) as f64 / total as f64
            },
        }
    }
}

/// Population mean and standard deviation
pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
