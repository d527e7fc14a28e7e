//! Gradient boosted trees with binomial deviance

use super::tree::{RegressionTree, TreeData, TreeParams};
use crate::error::{Result, StressError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Configuration for the gradient boosting member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 250,
            max_depth: 6,
            learning_rate: 0.08,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    n_features: usize,
    /// Prior log-odds of the stressed class
    init: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub fn fit(
        rows: &[Vec<f64>],
        targets: &[f64],
        config: &GradientBoostingConfig,
        seed: u64,
    ) -> Result<Self> {
        if !config.learning_rate.is_finite() || config.learning_rate <= 0.0 {
            return Err(StressError::Validation(format!(
                "learning_rate must be positive, got {}",
                config.learning_rate
            )));
        }
        let n = rows.len();
        let n_features = rows.first().map_or(0, Vec::len);

        let prior = (targets.iter().sum::<f64>() / n as f64).clamp(1e-15, 1.0 - 1e-15);
        let init = (prior / (1.0 - prior)).ln();

        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: None,
        };
        let weights = vec![1.0; n];
        let mut rng = StdRng::seed_from_u64(seed);
        let mut importances = vec![0.0; n_features];

        let mut raw = vec![init; n];
        let mut trees = Vec::with_capacity(config.n_estimators);

        for _ in 0..config.n_estimators {
            let probs: Vec<f64> = raw.iter().map(|&r| sigmoid(r)).collect();
            let residuals: Vec<f64> = targets.iter().zip(&probs).map(|(y, p)| y - p).collect();

            let data = TreeData {
                rows,
                targets: &residuals,
                weights: &weights,
            };
            let mut tree =
                RegressionTree::fit(&data, (0..n).collect(), &params, &mut rng, &mut importances);

            // Newton step per leaf: sum(residual) / sum(p * (1 - p))
            let leaves: Vec<usize> = rows.iter().map(|r| tree.leaf_index(r)).collect();
            let mut numerators = vec![0.0; tree.node_count()];
            let mut denominators = vec![0.0; tree.node_count()];
            let mut counts = vec![0usize; tree.node_count()];
            for i in 0..n {
                numerators[leaves[i]] += residuals[i];
                denominators[leaves[i]] += probs[i] * (1.0 - probs[i]);
                counts[leaves[i]] += 1;
            }
            for (leaf, (num, den)) in numerators.iter().zip(&denominators).enumerate() {
                if counts[leaf] > 0 {
                    let step = if den.abs() < 1e-150 { 0.0 } else { num / den };
                    tree.set_leaf_value(leaf, step);
                }
            }

            for (r, row) in raw.iter_mut().zip(rows) {
                *r += config.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            n_features,
            init,
            learning_rate: config.learning_rate,
            trees,
        })
    }

    pub fn decision_function(&self, row: &[f64]) -> f64 {
        self.init
            + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.decision_function(row))
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Zero rounds is a valid prior-only model
    pub fn validate(&self) -> Result<()> {
        if !self.init.is_finite() || !self.learning_rate.is_finite() {
            return Err(StressError::ArtifactMismatch(
                "gradient boosting has a non-finite init or learning rate".to_string(),
            ));
        }
        self.trees.iter().try_for_each(|t| t.validate(self.n_features))
    }
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64, ((i * 7) % 5) as f64]).collect();
        let targets = rows.iter().map(|r| if r[0] >= 15.0 { 1.0 } else { 0.0 }).collect();
        (rows, targets)
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(800.0) <= 1.0);
    }

    #[test]
    fn test_zero_rounds_returns_prior() {
        let (rows, targets) = toy();
        let config = GradientBoostingConfig {
            n_estimators: 0,
            ..Default::default()
        };
        let model = GradientBoosting::fit(&rows, &targets, &config, 0).unwrap();

        assert!((model.predict_proba(&[3.0, 0.0]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_boosting_separates_classes() {
        let (rows, targets) = toy();
        let config = GradientBoostingConfig {
            n_estimators: 30,
            max_depth: 2,
            ..Default::default()
        };
        let model = GradientBoosting::fit(&rows, &targets, &config, 0).unwrap();

        assert!(model.predict_proba(&[25.0, 1.0]) > 0.8);
        assert!(model.predict_proba(&[2.0, 1.0]) < 0.2);
    }

    #[test]
    fn test_rejects_non_positive_learning_rate() {
        let (rows, targets) = toy();
        let config = GradientBoostingConfig {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(GradientBoosting::fit(&rows, &targets, &config, 0).is_err());
    }
}
