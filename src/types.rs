//! Core types for the stress pipeline
//!
//! This module defines the values that flow through each stage: raw vital
//! samples, labels, labeled training rows and prediction results.

use crate::error::{Result, StressError};
use serde::{Deserialize, Serialize};

/// One reading of the five raw vitals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalSample {
    /// Heart rate variability (ms)
    pub hrv: f64,
    /// Heart rate (bpm)
    pub heart_rate: f64,
    /// Systolic blood pressure (mmHg)
    pub systolic: f64,
    /// Diastolic blood pressure (mmHg)
    pub diastolic: f64,
    /// Blood oxygen saturation (percentage, 0-100)
    pub spo2: f64,
}

impl VitalSample {
    pub fn new(hrv: f64, heart_rate: f64, systolic: f64, diastolic: f64, spo2: f64) -> Self {
        Self {
            hrv,
            heart_rate,
            systolic,
            diastolic,
            spo2,
        }
    }

    /// Check that every vital lies in its physiological domain.
    ///
    /// Used by ingestion and the CLI. Feature derivation does not call this;
    /// it only rejects values that would break a formula.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("hrv", self.hrv),
            ("heart_rate", self.heart_rate),
            ("systolic", self.systolic),
            ("diastolic", self.diastolic),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(StressError::Validation(format!(
                    "{name} must be a positive finite number, got {value}"
                )));
            }
        }
        if !self.spo2.is_finite() || self.spo2 <= 0.0 || self.spo2 > 100.0 {
            return Err(StressError::Validation(format!(
                "spo2 must be in (0, 100], got {}",
                self.spo2
            )));
        }
        Ok(())
    }
}

/// Psychological state label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Relaxed,
    Stressed,
}

impl Label {
    pub fn from_stressed(stressed: bool) -> Self {
        if stressed {
            Label::Stressed
        } else {
            Label::Relaxed
        }
    }

    pub fn is_stressed(&self) -> bool {
        matches!(self, Label::Stressed)
    }

    /// Positive-class indicator used as a regression target
    pub fn as_target(&self) -> f64 {
        if self.is_stressed() {
            1.0
        } else {
            0.0
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Relaxed => "Relaxed",
            Label::Stressed => "Stressed",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A training row: vitals plus the observed label
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub sample: VitalSample,
    pub label: Label,
}

/// Ensemble output for one sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: Label,
    /// Probability of the stressed class, in [0, 1]
    pub probability: f64,
}

impl PredictionResult {
    /// Apply the decision rule: stressed iff probability > 0.5
    pub fn from_probability(probability: f64) -> Self {
        Self {
            label: Label::from_stressed(probability > 0.5),
            probability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_normal_vitals() {
        let sample = VitalSample::new(65.0, 72.0, 120.0, 80.0, 99.0);
        assert!(sample.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_spo2() {
        let sample = VitalSample::new(65.0, 72.0, 120.0, 80.0, 101.0);
        assert!(matches!(sample.validate(), Err(StressError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_zero_hrv() {
        let sample = VitalSample::new(0.0, 72.0, 120.0, 80.0, 99.0);
        assert!(sample.validate().is_err());
    }

    #[test]
    fn test_decision_threshold_is_strict() {
        assert_eq!(PredictionResult::from_probability(0.5).label, Label::Relaxed);
        assert_eq!(
            PredictionResult::from_probability(0.5001).label,
            Label::Stressed
        );
    }
}
