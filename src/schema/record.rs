//! Dataset record schema
//!
//! One record per observation, keyed by the column headers of the stress
//! survey dataset. Columns other than the five below are ignored.

use crate::error::{Result, StressError};
use crate::types::{Label, VitalSample};
use serde::{Deserialize, Serialize};

/// Psychological state column; anything besides the two trained classes is
/// kept as `Other` and excluded from training
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PsychologicalState {
    Relaxed,
    Stressed,
    #[serde(untagged)]
    Other(String),
}

impl PsychologicalState {
    pub fn label(&self) -> Option<Label> {
        match self {
            PsychologicalState::Relaxed => Some(Label::Relaxed),
            PsychologicalState::Stressed => Some(Label::Stressed),
            PsychologicalState::Other(_) => None,
        }
    }
}

/// A single dataset row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    #[serde(rename = "HRV (ms)")]
    pub hrv: f64,

    #[serde(rename = "Heart Rate (BPM)")]
    pub heart_rate: f64,

    /// `"systolic/diastolic"`, e.g. `"120/80"`
    #[serde(rename = "Blood Pressure (mmHg)")]
    pub blood_pressure: String,

    #[serde(rename = "Oxygen Saturation (%)")]
    pub spo2: f64,

    #[serde(rename = "Psychological State")]
    pub state: PsychologicalState,
}

impl DatasetRecord {
    /// Split the blood pressure column into (systolic, diastolic)
    pub fn blood_pressure(&self) -> Result<(f64, f64)> {
        parse_blood_pressure(&self.blood_pressure)
    }

    /// Vitals of this record, domain-checked
    pub fn to_sample(&self) -> Result<VitalSample> {
        let (systolic, diastolic) = self.blood_pressure()?;
        let sample = VitalSample::new(self.hrv, self.heart_rate, systolic, diastolic, self.spo2);
        sample.validate()?;
        Ok(sample)
    }
}

/// Parse `"sys/dia"` into two numbers
pub fn parse_blood_pressure(value: &str) -> Result<(f64, f64)> {
    let invalid = || StressError::Validation(format!("invalid blood pressure '{value}', expected 'sys/dia'"));

    let (sys, dia) = value.trim().split_once('/').ok_or_else(invalid)?;
    let systolic: f64 = sys.trim().parse().map_err(|_| invalid())?;
    let diastolic: f64 = dia.trim().parse().map_err(|_| invalid())?;
    if !systolic.is_finite() || !diastolic.is_finite() {
        return Err(invalid());
    }
    Ok((systolic, diastolic))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROW: &str = r#"{
        "HRV (ms)": 25.0,
        "Heart Rate (BPM)": 110,
        "Blood Pressure (mmHg)": "150/95",
        "Oxygen Saturation (%)": 96,
        "Psychological State": "Stressed",
        "Sleep Duration (hours)": 5.5
    }"#;

    #[test]
    fn test_record_deserializes() {
        let record: DatasetRecord = serde_json::from_str(ROW).unwrap();

        assert_eq!(record.state, PsychologicalState::Stressed);
        assert_eq!(record.blood_pressure().unwrap(), (150.0, 95.0));
        assert_eq!(
            record.to_sample().unwrap(),
            VitalSample::new(25.0, 110.0, 150.0, 95.0, 96.0)
        );
    }

    #[test]
    fn test_other_state_is_kept() {
        let json = ROW.replace("\"Stressed\"", "\"Anxious\"");
        let record: DatasetRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(record.state, PsychologicalState::Other("Anxious".to_string()));
        assert_eq!(record.state.label(), None);
    }

    #[test]
    fn test_blood_pressure_parsing() {
        assert_eq!(parse_blood_pressure(" 118 / 76 ").unwrap(), (118.0, 76.0));
        assert!(parse_blood_pressure("120").is_err());
        assert!(parse_blood_pressure("120/abc").is_err());
        assert!(parse_blood_pressure("").is_err());
    }
}
