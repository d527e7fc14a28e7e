//! Feature ranking and frozen selection
//!
//! Ranks every derived feature by the absolute Pearson correlation of its
//! column with the stressed/relaxed label, then freezes the top K names.
//! The frozen list is captured once at training time and stored in the
//! artifact; inference never ranks.

use crate::error::{Result, StressError};
use crate::features::{feature_index, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use crate::types::Label;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Default number of features kept after ranking
pub const DEFAULT_TOP_K: usize = 15;

/// Scores are compared at this many decimal places before the name tie-break
const SCORE_DECIMALS: i32 = 12;

/// One feature and its correlation with the label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFeature {
    pub name: String,
    /// Signed Pearson correlation with the stressed indicator
    pub score: f64,
}

/// Features sorted by descending |score|, ties broken by name (ascending)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRanking {
    pub ranked: Vec<RankedFeature>,
    /// Zero-variance columns left out of the ranking
    pub dropped: Vec<String>,
}

impl FeatureRanking {
    /// Freeze the first `k` names
    pub fn freeze(&self, k: usize) -> FrozenFeatureSet {
        FrozenFeatureSet {
            names: self
                .ranked
                .iter()
                .take(k)
                .map(|f| f.name.clone())
                .collect(),
        }
    }
}

/// Ordered feature names selected at training time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenFeatureSet {
    names: Vec<String>,
}

impl FrozenFeatureSet {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Map names to positions in a [`FeatureVector`].
    ///
    /// Fails if a name is not produced by the feature deriver, which means the
    /// artifact came from an incompatible build.
    pub fn resolve(&self) -> Result<Vec<usize>> {
        self.names
            .iter()
            .map(|name| {
                feature_index(name).ok_or_else(|| {
                    StressError::ArtifactMismatch(format!(
                        "feature '{name}' is not produced by this feature deriver"
                    ))
                })
            })
            .collect()
    }

    /// Project derived vectors onto the frozen columns, row-major
    pub fn project(&self, vectors: &[FeatureVector]) -> Result<Vec<Vec<f64>>> {
        let indices = self.resolve()?;
        Ok(vectors.iter().map(|v| v.select(&indices)).collect())
    }
}

/// Correlation-based ranker (training only)
pub struct FeatureRanker;

impl FeatureRanker {
    /// Rank all features of `vectors` against `labels`
    pub fn rank(vectors: &[FeatureVector], labels: &[Label]) -> Result<FeatureRanking> {
        if vectors.len() != labels.len() {
            return Err(StressError::Validation(format!(
                "{} feature rows but {} labels",
                vectors.len(),
                labels.len()
            )));
        }
        if vectors.len() < 2 {
            return Err(StressError::Validation(
                "at least two rows are needed to rank features".to_string(),
            ));
        }

        let target: Vec<f64> = labels.iter().map(Label::as_target).collect();
        let (target_mean, target_ss) = centered_sum_of_squares(&target);
        if is_degenerate(target_ss, target_mean, target.len()) {
            return Err(StressError::Validation(
                "labels contain a single class; correlation is undefined".to_string(),
            ));
        }

        let mut ranked = Vec::with_capacity(FEATURE_COUNT);
        let mut dropped = Vec::new();

        for (col, name) in FEATURE_NAMES.iter().enumerate() {
            let column: Vec<f64> = vectors.iter().map(|v| v.values()[col]).collect();
            let (mean, ss) = centered_sum_of_squares(&column);

            if is_degenerate(ss, mean, column.len()) {
                debug!(feature = *name, "dropping zero-variance feature from ranking");
                dropped.push(name.to_string());
                continue;
            }

            let cross: f64 = column
                .iter()
                .zip(target.iter())
                .map(|(x, y)| (x - mean) * (y - target_mean))
                .sum();
            let score = cross / (ss.sqrt() * target_ss.sqrt());

            ranked.push(RankedFeature {
                name: name.to_string(),
                score,
            });
        }

        if ranked.is_empty() {
            return Err(StressError::Validation(
                "every feature column has zero variance".to_string(),
            ));
        }

        ranked.sort_by(compare_ranked);

        Ok(FeatureRanking { ranked, dropped })
    }
}

/// Descending |score| (rounded), then ascending name
fn compare_ranked(a: &RankedFeature, b: &RankedFeature) -> Ordering {
    let scale = 10f64.powi(SCORE_DECIMALS);
    let ka = (a.score.abs() * scale).round();
    let kb = (b.score.abs() * scale).round();
    kb.total_cmp(&ka).then_with(|| a.name.cmp(&b.name))
}

fn centered_sum_of_squares(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss = values.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, ss)
}

fn is_degenerate(sum_of_squares: f64, mean: f64, n: usize) -> bool {
    let variance = sum_of_squares / n as f64;
    variance <= 1e-24 * (1.0 + mean * mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureDeriver;
    use crate::test_support::synthetic_dataset;
    use pretty_assertions::assert_eq;

    fn derived_dataset(n: usize, seed: u64) -> (Vec<FeatureVector>, Vec<Label>) {
        let rows = synthetic_dataset(n, seed);
        let samples: Vec<_> = rows.iter().map(|r| r.sample).collect();
        let labels = rows.iter().map(|r| r.label).collect();
        (FeatureDeriver::derive_batch(&samples).unwrap(), labels)
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let (vectors, labels) = derived_dataset(120, 7);

        let first = FeatureRanker::rank(&vectors, &labels).unwrap();
        let second = FeatureRanker::rank(&vectors, &labels).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.freeze(15), second.freeze(15));
    }

    #[test]
    fn test_constant_column_is_dropped() {
        let (vectors, labels) = derived_dataset(80, 3);
        let ranking = FeatureRanker::rank(&vectors, &labels).unwrap();

        assert_eq!(ranking.dropped, vec!["Max_HR_Estimated".to_string()]);
        assert_eq!(ranking.ranked.len(), FEATURE_COUNT - 1);
        assert!(ranking.ranked.iter().all(|f| f.score.is_finite()));
    }

    #[test]
    fn test_sorted_by_descending_absolute_score() {
        let (vectors, labels) = derived_dataset(100, 11);
        let ranking = FeatureRanker::rank(&vectors, &labels).unwrap();

        for pair in ranking.ranked.windows(2) {
            assert!(pair[0].score.abs() >= pair[1].score.abs() - 1e-12);
        }
    }

    #[test]
    fn test_rescaled_features_tie_break_by_name() {
        // HR_Reserve_Used is heart rate times a positive constant, so both
        // columns share one correlation and must come out in name order.
        let (vectors, labels) = derived_dataset(100, 5);
        let ranking = FeatureRanker::rank(&vectors, &labels).unwrap();

        let pos = |name: &str| ranking.ranked.iter().position(|f| f.name == name).unwrap();
        let hr = pos("HR_Reserve_Used");
        let raw = pos("Heart_Rate");
        assert_eq!(hr + 1, raw);
    }

    #[test]
    fn test_compare_ranked_uses_name_on_equal_scores() {
        let a = RankedFeature {
            name: "b_feature".to_string(),
            score: -0.5,
        };
        let b = RankedFeature {
            name: "a_feature".to_string(),
            score: 0.5,
        };
        assert_eq!(compare_ranked(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_freeze_takes_top_k_in_order() {
        let (vectors, labels) = derived_dataset(90, 2);
        let ranking = FeatureRanker::rank(&vectors, &labels).unwrap();
        let frozen = ranking.freeze(DEFAULT_TOP_K);

        assert_eq!(frozen.len(), DEFAULT_TOP_K);
        let expected: Vec<String> = ranking.ranked[..DEFAULT_TOP_K]
            .iter()
            .map(|f| f.name.clone())
            .collect();
        assert_eq!(frozen.names(), expected.as_slice());
    }

    #[test]
    fn test_single_class_is_validation_error() {
        let (vectors, _) = derived_dataset(20, 1);
        let labels = vec![Label::Stressed; vectors.len()];
        assert!(matches!(
            FeatureRanker::rank(&vectors, &labels),
            Err(StressError::Validation(_))
        ));
    }

    #[test]
    fn test_resolve_unknown_name_is_mismatch() {
        let frozen = FrozenFeatureSet::new(vec!["MAP".to_string(), "Cortisol".to_string()]);
        assert!(matches!(
            frozen.resolve(),
            Err(StressError::ArtifactMismatch(_))
        ));
    }
}
