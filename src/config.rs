//! Training configuration
//!
//! Every field has a default, so a partial JSON file only needs to name
//! what it overrides.

use crate::ensemble::EnsembleConfig;
use crate::error::{Result, StressError};
use crate::ranking::DEFAULT_TOP_K;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Share of each class held out for evaluation
    pub test_ratio: f64,
    /// Number of ranked features kept
    pub top_k: usize,
    /// Stratified cross-validation folds; 0 disables cross-validation
    pub cv_folds: usize,
    pub seed: u64,
    pub ensemble: EnsembleConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.25,
            top_k: DEFAULT_TOP_K,
            cv_folds: 5,
            seed: 42,
            ensemble: EnsembleConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.test_ratio.is_finite() || self.test_ratio <= 0.0 || self.test_ratio >= 1.0 {
            return Err(StressError::Validation(format!(
                "test_ratio must be in (0, 1), got {}",
                self.test_ratio
            )));
        }
        if self.top_k == 0 {
            return Err(StressError::Validation("top_k must be at least 1".to_string()));
        }
        if self.cv_folds == 1 {
            return Err(StressError::Validation(
                "cv_folds must be 0 (disabled) or at least 2".to_string(),
            ));
        }
        Ok(())
    }

    /// Rows each class needs before training can start
    pub fn min_class_rows(&self) -> usize {
        self.cv_folds.max(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.test_ratio, 0.25);
        assert_eq!(config.top_k, 15);
        assert_eq!(config.cv_folds, 5);
        assert_eq!(config.seed, 42);
        assert_eq!(config.ensemble.random_forest.n_estimators, 300);
        assert_eq!(config.ensemble.mlp.hidden_layers, vec![150, 75, 30]);
        assert_eq!(config.min_class_rows(), 5);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{"top_k": 10, "ensemble": {"gradient_boosting": {"n_estimators": 50}}}"#;
        let config = TrainingConfig::from_json(json).unwrap();

        assert_eq!(config.top_k, 10);
        assert_eq!(config.ensemble.gradient_boosting.n_estimators, 50);
        assert_eq!(config.ensemble.gradient_boosting.max_depth, 6);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_round_trip() {
        let config = TrainingConfig::default();
        let back = TrainingConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(TrainingConfig::from_json(r#"{"test_ratio": 0.0}"#).is_err());
        assert!(TrainingConfig::from_json(r#"{"top_k": 0}"#).is_err());
        assert!(TrainingConfig::from_json(r#"{"cv_folds": 1}"#).is_err());
        assert!(TrainingConfig::from_json(r#"{"cv_folds": 0}"#).is_ok());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"seed": 7}"#).unwrap();

        assert_eq!(TrainingConfig::from_file(&path).unwrap().seed, 7);
    }
}
