//! Random forest (bagging of CART trees)

use super::tree::{RegressionTree, TreeData, TreeParams};
use crate::error::{Result, StressError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for the random forest member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Reweight classes to `n / (2 * n_class)`
    pub balanced_class_weight: bool,
    /// Draw a bootstrap sample per tree
    pub bootstrap: bool,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 12,
            min_samples_split: 2,
            min_samples_leaf: 1,
            balanced_class_weight: true,
            bootstrap: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    trees: Vec<RegressionTree>,
    /// Mean normalized impurity decrease per input column
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn fit(
        rows: &[Vec<f64>],
        targets: &[f64],
        config: &RandomForestConfig,
        seed: u64,
    ) -> Result<Self> {
        if config.n_estimators == 0 {
            return Err(StressError::Validation(
                "random forest needs at least one tree".to_string(),
            ));
        }
        let n = rows.len();
        let n_features = rows.first().map_or(0, Vec::len);

        let weights = if config.balanced_class_weight {
            balanced_weights(targets)
        } else {
            vec![1.0; n]
        };
        let data = TreeData {
            rows,
            targets,
            weights: &weights,
        };
        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: Some(((n_features as f64).sqrt() as usize).max(1)),
        };

        let fitted: Vec<(RegressionTree, Vec<f64>)> = (0..config.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(tree_seed(seed, t));
                let samples: Vec<usize> = if config.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                let mut importances = vec![0.0; n_features];
                let tree = RegressionTree::fit(&data, samples, &params, &mut rng, &mut importances);
                (tree, importances)
            })
            .collect();

        let mut feature_importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(fitted.len());
        for (tree, importances) in fitted {
            let total: f64 = importances.iter().sum();
            if total > 0.0 {
                for (acc, v) in feature_importances.iter_mut().zip(importances) {
                    *acc += v / total;
                }
            }
            trees.push(tree);
        }
        let total: f64 = feature_importances.iter().sum();
        if total > 0.0 {
            feature_importances.iter_mut().for_each(|v| *v /= total);
        }

        Ok(Self {
            n_features,
            trees,
            feature_importances,
        })
    }

    /// Mean of the trees' leaf stressed fractions
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        (sum / self.trees.len() as f64).clamp(0.0, 1.0)
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(StressError::ArtifactMismatch(
                "random forest has no trees".to_string(),
            ));
        }
        if self.feature_importances.len() != self.n_features {
            return Err(StressError::ArtifactMismatch(format!(
                "random forest has {} importances for {} features",
                self.feature_importances.len(),
                self.n_features
            )));
        }
        self.trees.iter().try_for_each(|t| t.validate(self.n_features))
    }
}

/// Class weights `n / (2 * n_class)` per row
fn balanced_weights(targets: &[f64]) -> Vec<f64> {
    let n = targets.len() as f64;
    let positives = targets.iter().filter(|&&y| y > 0.5).count() as f64;
    let negatives = n - positives;
    targets
        .iter()
        .map(|&y| {
            let class_count = if y > 0.5 { positives } else { negatives };
            n / (2.0 * class_count)
        })
        .collect()
}

fn tree_seed(seed: u64, tree: usize) -> u64 {
    seed.wrapping_add((tree as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for i in 0..40 {
            let x = i as f64 / 4.0;
            rows.push(vec![x, (i % 3) as f64]);
            targets.push(if x > 5.0 { 1.0 } else { 0.0 });
        }
        (rows, targets)
    }

    fn small() -> RandomForestConfig {
        RandomForestConfig {
            n_estimators: 15,
            max_depth: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_balanced_weights() {
        let weights = balanced_weights(&[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(weights, vec![2.0, 2.0 / 3.0, 2.0 / 3.0, 2.0 / 3.0]);
    }

    #[test]
    fn test_forest_learns_threshold() {
        let (rows, targets) = toy();
        let forest = RandomForest::fit(&rows, &targets, &small(), 42).unwrap();

        assert_eq!(forest.n_trees(), 15);
        assert!(forest.predict_proba(&[9.0, 1.0]) > 0.8);
        assert!(forest.predict_proba(&[1.0, 1.0]) < 0.2);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (rows, targets) = toy();
        let a = RandomForest::fit(&rows, &targets, &small(), 7).unwrap();
        let b = RandomForest::fit(&rows, &targets, &small(), 7).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_importances_favor_informative_column() {
        let (rows, targets) = toy();
        let forest = RandomForest::fit(&rows, &targets, &small(), 1).unwrap();
        let importances = forest.feature_importances();

        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
    }
}
