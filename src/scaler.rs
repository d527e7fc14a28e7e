//! Feature standardization
//!
//! The scaler is fitted once on the training split and then applied,
//! unchanged, to every vector that reaches the ensemble: training rows,
//! held-out rows and single inference samples alike.

use crate::error::{Result, StressError};
use serde::{Deserialize, Serialize};

/// Mean and standard deviation for one selected feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub mean: f64,
    /// Population standard deviation (ddof = 0)
    pub std: f64,
}

/// Fitted scaler parameters, one entry per frozen feature, in frozen order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    stats: Vec<FeatureStats>,
}

impl ScalerParams {
    /// Fit on row-major training data.
    ///
    /// `names` label the columns in error messages and must have one entry per
    /// column. A constant column is rejected rather than silently scaled by 1.
    pub fn fit(rows: &[Vec<f64>], names: &[String]) -> Result<Self> {
        if rows.is_empty() {
            return Err(StressError::Validation(
                "cannot fit scaler on an empty matrix".to_string(),
            ));
        }
        let width = names.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(StressError::Validation(format!(
                "row has {} columns, expected {width}",
                bad.len()
            )));
        }

        let n = rows.len() as f64;
        let mut stats = Vec::with_capacity(width);

        for (col, name) in names.iter().enumerate() {
            let mean = rows.iter().map(|r| r[col]).sum::<f64>() / n;
            let variance = rows.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();

            if !std.is_finite() || std <= f64::EPSILON * mean.abs().max(1.0) {
                return Err(StressError::Validation(format!(
                    "feature '{name}' has zero variance in the training split"
                )));
            }

            stats.push(FeatureStats { mean, std });
        }

        Ok(Self { stats })
    }

    pub fn stats(&self) -> &[FeatureStats] {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Standardize one vector: `(x - mean) / std`
    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.stats.len() {
            return Err(StressError::Validation(format!(
                "vector has {} features, scaler expects {}",
                row.len(),
                self.stats.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.stats.iter())
            .map(|(x, s)| (x - s.mean) / s.std)
            .collect())
    }

    /// Standardize every row
    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }

    /// Load scaler parameters from JSON
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize scaler parameters to JSON
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    #[test]
    fn test_fit_population_std() {
        let rows = vec![vec![2.0, 10.0], vec![4.0, 10.5], vec![6.0, 11.0]];
        let scaler = ScalerParams::fit(&rows, &names(2)).unwrap();

        assert_eq!(scaler.stats()[0].mean, 4.0);
        // population std of 2, 4, 6 = sqrt(8/3)
        assert!((scaler.stats()[0].std - (8.0_f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((scaler.stats()[1].mean - 10.5).abs() < 1e-12);
    }

    #[test]
    fn test_transform_standardizes() {
        let rows = vec![vec![1.0], vec![3.0]];
        let scaler = ScalerParams::fit(&rows, &names(1)).unwrap();
        let scaled = scaler.transform_all(&rows).unwrap();

        assert_eq!(scaled, vec![vec![-1.0], vec![1.0]]);
    }

    #[test]
    fn test_transform_does_not_refit() {
        let train = vec![vec![1.0, 5.0], vec![3.0, 7.0]];
        let scaler = ScalerParams::fit(&train, &names(2)).unwrap();
        let before = scaler.clone();

        let outlier = scaler.transform(&[1000.0, -1000.0]).unwrap();

        assert_eq!(scaler, before);
        assert_eq!(outlier[0], (1000.0 - 2.0) / 1.0);
    }

    #[test]
    fn test_constant_column_rejected() {
        let rows = vec![vec![1.0, 195.0], vec![2.0, 195.0], vec![3.0, 195.0]];
        let err = ScalerParams::fit(&rows, &names(2)).unwrap_err();
        assert!(matches!(err, StressError::Validation(msg) if msg.contains("f1")));
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let scaler = ScalerParams::fit(&[vec![1.0], vec![2.0]], &names(1)).unwrap();
        assert!(scaler.transform(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_serialization_is_exact() {
        let rows = vec![vec![0.1, 1.0 / 3.0], vec![0.7, 2.0 / 7.0], vec![0.3, 5.0]];
        let scaler = ScalerParams::fit(&rows, &names(2)).unwrap();

        let json = scaler.to_json().unwrap();
        let loaded = ScalerParams::from_json(&json).unwrap();

        for (a, b) in scaler.stats().iter().zip(loaded.stats()) {
            assert_eq!(a.mean.to_bits(), b.mean.to_bits());
            assert_eq!(a.std.to_bits(), b.std.to_bits());
        }
    }
}
