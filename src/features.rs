//! Feature derivation
//!
//! This module derives the engineered feature vector from raw vitals:
//! - Cardiovascular ratios (HR/HRV, pulse pressure, MAP, rate-pressure product)
//! - Heart rate reserve against a fixed reference age
//! - Polynomial and log expansions of HRV, heart rate and HR/HRV
//! - Interaction terms between heart rate, HRV, pressure and oxygen
//!
//! Training and inference both go through [`FeatureDeriver::derive`]; the batch
//! entry point is a plain map over it so the two paths cannot drift apart.

use crate::error::{Result, StressError};
use crate::types::VitalSample;
use serde::{Deserialize, Serialize};

/// Reference age used for the estimated maximum heart rate
pub const REFERENCE_AGE_YEARS: f64 = 25.0;

/// Estimated maximum heart rate: 220 - age
pub const MAX_HR_ESTIMATED: f64 = 220.0 - REFERENCE_AGE_YEARS;

/// Number of features produced per sample
pub const FEATURE_COUNT: usize = 27;

/// Feature names, in the order values are stored in a [`FeatureVector`]
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "HRV",
    "Heart_Rate",
    "Systolic",
    "Diastolic",
    "SpO2",
    "HR_HRV_Ratio",
    "Pulse_Pressure",
    "MAP",
    "RPP",
    "Max_HR_Estimated",
    "HR_Reserve_Used",
    "HRV_Complexity",
    "HRV_squared",
    "HRV_cubed",
    "log_HRV",
    "Heart_Rate_squared",
    "Heart_Rate_cubed",
    "log_Heart_Rate",
    "HR_HRV_Ratio_squared",
    "HR_HRV_Ratio_cubed",
    "log_HR_HRV_Ratio",
    "HR_Systolic_Interaction",
    "HR_Oxygen_Interaction",
    "HRV_Oxygen_Interaction",
    "HRV_Diastolic",
    "Oxygen_BP_Ratio",
    "HR_BP_Product",
];

/// Position of a feature name in [`FEATURE_NAMES`]
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|n| *n == name)
}

/// Derived features for one sample, ordered as [`FEATURE_NAMES`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    /// Look a feature up by name
    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|i| self.values[i])
    }

    /// Iterate `(name, value)` pairs in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }

    /// Pick values at the given positions, in the given order
    pub fn select(&self, indices: &[usize]) -> Vec<f64> {
        indices.iter().map(|&i| self.values[i]).collect()
    }
}

/// Feature deriver for computing engineered features
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Derive the full feature vector for one sample
    pub fn derive(sample: &VitalSample) -> Result<FeatureVector> {
        let VitalSample {
            hrv,
            heart_rate,
            systolic,
            diastolic,
            spo2,
        } = *sample;

        for (name, value) in [
            ("hrv", hrv),
            ("heart_rate", heart_rate),
            ("systolic", systolic),
            ("diastolic", diastolic),
            ("spo2", spo2),
        ] {
            if !value.is_finite() {
                return Err(StressError::NumericDomain(format!(
                    "{name} is not finite ({value})"
                )));
            }
        }

        let hr_hrv_ratio = ratio("HR_HRV_Ratio", heart_rate, hrv)?;
        let pulse_pressure = systolic - diastolic;
        let map = diastolic + pulse_pressure / 3.0;
        let rpp = heart_rate * systolic / 100.0;
        let hr_reserve_used = heart_rate / MAX_HR_ESTIMATED * 100.0;
        let hrv_complexity = ratio("HRV_Complexity", hrv, heart_rate)? * 10.0;
        let hrv_diastolic = ratio("HRV_Diastolic", hrv, diastolic)?;
        let oxygen_bp_ratio = ratio("Oxygen_BP_Ratio", spo2, map)?;

        let values = [
            hrv,
            heart_rate,
            systolic,
            diastolic,
            spo2,
            hr_hrv_ratio,
            pulse_pressure,
            map,
            rpp,
            MAX_HR_ESTIMATED,
            hr_reserve_used,
            hrv_complexity,
            hrv.powi(2),
            hrv.powi(3),
            log_abs(hrv),
            heart_rate.powi(2),
            heart_rate.powi(3),
            log_abs(heart_rate),
            hr_hrv_ratio.powi(2),
            hr_hrv_ratio.powi(3),
            log_abs(hr_hrv_ratio),
            heart_rate * systolic,
            heart_rate * spo2,
            hrv * spo2,
            hrv_diastolic,
            oxygen_bp_ratio,
            heart_rate * map / 100.0,
        ];

        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(StressError::NumericDomain(format!(
                "{} overflows for {sample:?}",
                FEATURE_NAMES[i]
            )));
        }

        Ok(FeatureVector { values })
    }

    /// Derive features for a batch, failing on the first bad sample
    pub fn derive_batch(samples: &[VitalSample]) -> Result<Vec<FeatureVector>> {
        samples.iter().map(Self::derive).collect()
    }
}

fn ratio(name: &str, numerator: f64, denominator: f64) -> Result<f64> {
    if denominator == 0.0 {
        return Err(StressError::NumericDomain(format!(
            "{name}: denominator is zero"
        )));
    }
    Ok(numerator / denominator)
}

/// `ln(1 + |x|)`, defined for every finite x
fn log_abs(x: f64) -> f64 {
    x.abs().ln_1p()
}
