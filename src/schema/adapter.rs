//! Adapter from dataset records to labeled training rows

use crate::error::{Result, StressError};
use crate::schema::record::DatasetRecord;
use crate::types::LabeledSample;
use tracing::warn;

/// Parses dataset files and filters them to the two trained classes
pub struct DatasetAdapter;

impl DatasetAdapter {
    /// Parse a JSON string containing an array of records
    pub fn parse_array(json: &str) -> Result<Vec<DatasetRecord>> {
        let records: Vec<DatasetRecord> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse NDJSON (newline-delimited JSON) records
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<DatasetRecord>> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<DatasetRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(StressError::Validation(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Parse either format: a leading `[` means a JSON array
    pub fn parse(input: &str) -> Result<Vec<DatasetRecord>> {
        if input.trim_start().starts_with('[') {
            Self::parse_array(input)
        } else {
            Self::parse_ndjson(input)
        }
    }

    /// Keep Relaxed/Stressed records and turn them into labeled samples.
    ///
    /// A malformed blood pressure or out-of-domain vital in a kept record
    /// fails the whole conversion.
    pub fn to_training_rows(records: &[DatasetRecord]) -> Result<Vec<LabeledSample>> {
        let mut rows = Vec::with_capacity(records.len());
        let mut skipped = 0usize;

        for (idx, record) in records.iter().enumerate() {
            let Some(label) = record.state.label() else {
                skipped += 1;
                continue;
            };
            let sample = record
                .to_sample()
                .map_err(|e| StressError::Validation(format!("record {}: {e}", idx + 1)))?;
            rows.push(LabeledSample { sample, label });
        }

        if skipped > 0 {
            warn!(skipped, kept = rows.len(), "excluded records outside Relaxed/Stressed");
        }
        Ok(rows)
    }

    /// Check every record without building rows; returns the errors found
    pub fn validate_records(records: &[DatasetRecord]) -> Vec<String> {
        records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state.label().is_some())
            .filter_map(|(idx, r)| r.to_sample().err().map(|e| format!("record {}: {e}", idx + 1)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Label;

    const NDJSON: &str = r#"
{"HRV (ms)": 25, "Heart Rate (BPM)": 110, "Blood Pressure (mmHg)": "150/95", "Oxygen Saturation (%)": 96, "Psychological State": "Stressed"}
{"HRV (ms)": 65, "Heart Rate (BPM)": 72, "Blood Pressure (mmHg)": "120/80", "Oxygen Saturation (%)": 99, "Psychological State": "Relaxed"}

{"HRV (ms)": 40, "Heart Rate (BPM)": 90, "Blood Pressure (mmHg)": "130/85", "Oxygen Saturation (%)": 97, "Psychological State": "Anxious"}
"#;

    #[test]
    fn test_parse_ndjson_and_filter() {
        let records = DatasetAdapter::parse(NDJSON).unwrap();
        assert_eq!(records.len(), 3);

        let rows = DatasetAdapter::to_training_rows(&records).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, Label::Stressed);
        assert_eq!(rows[1].label, Label::Relaxed);
        assert_eq!(rows[1].sample.systolic, 120.0);
    }

    #[test]
    fn test_parse_array() {
        let lines: Vec<&str> = NDJSON.lines().filter(|l| !l.trim().is_empty()).collect();
        let json = format!("[{}]", lines.join(","));
        assert_eq!(DatasetAdapter::parse(&json).unwrap().len(), 3);
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let err = DatasetAdapter::parse_ndjson("{\"HRV (ms)\": 1}\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_bad_blood_pressure_fails_conversion() {
        let input = NDJSON.replace("150/95", "150-95");
        let records = DatasetAdapter::parse(&input).unwrap();

        assert!(DatasetAdapter::to_training_rows(&records).is_err());
        assert_eq!(DatasetAdapter::validate_records(&records).len(), 1);
    }

    #[test]
    fn test_excluded_state_is_not_validated() {
        let input = NDJSON.replace("130/85", "garbage");
        let records = DatasetAdapter::parse(&input).unwrap();
        assert!(DatasetAdapter::validate_records(&records).is_empty());
    }
}
