//! Trained artifact bundle
//!
//! An artifact is everything inference needs: the frozen feature names, the
//! scaler fitted on the training split and the trained ensemble, plus
//! provenance and evaluation metadata. It is immutable once built; a
//! retrained model is a new artifact.

use crate::ensemble::TrainedEnsemble;
use crate::error::{Result, StressError};
use crate::ranking::FrozenFeatureSet;
use crate::scaler::ScalerParams;
use crate::{PRODUCER_NAME, VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Current artifact schema version
pub const ARTIFACT_SCHEMA_VERSION: &str = "stress.artifact.v1";

/// Who built the artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactProducer {
    pub name: String,
    pub version: String,
}

impl Default for ArtifactProducer {
    fn default() -> Self {
        Self {
            name: PRODUCER_NAME.to_string(),
            version: VERSION.to_string(),
        }
    }
}

/// Evaluation summary recorded at training time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Held-out accuracy
    pub accuracy: f64,
    /// Held-out ROC AUC
    pub auc: Option<f64>,
    pub cv_mean_accuracy: Option<f64>,
    pub cv_std_accuracy: Option<f64>,
    pub train_samples: usize,
    pub test_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    schema_version: String,
    artifact_id: Uuid,
    trained_at: DateTime<Utc>,
    producer: ArtifactProducer,
    features: FrozenFeatureSet,
    scaler: ScalerParams,
    ensemble: TrainedEnsemble,
    metadata: ArtifactMetadata,
}

impl Artifact {
    /// Bundle trained components under a fresh id
    pub fn new(
        features: FrozenFeatureSet,
        scaler: ScalerParams,
        ensemble: TrainedEnsemble,
        metadata: ArtifactMetadata,
    ) -> Result<Self> {
        let artifact = Self {
            schema_version: ARTIFACT_SCHEMA_VERSION.to_string(),
            artifact_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            producer: ArtifactProducer::default(),
            features,
            scaler,
            ensemble,
            metadata,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Check that the parts agree with each other and with this build
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != ARTIFACT_SCHEMA_VERSION {
            return Err(StressError::ArtifactMismatch(format!(
                "schema version '{}' is not supported, expected '{ARTIFACT_SCHEMA_VERSION}'",
                self.schema_version
            )));
        }
        if self.features.is_empty() {
            return Err(StressError::ArtifactMismatch(
                "artifact selects no features".to_string(),
            ));
        }
        self.features.resolve()?;
        if self.scaler.len() != self.features.len() {
            return Err(StressError::ArtifactMismatch(format!(
                "scaler covers {} features but {} are selected",
                self.scaler.len(),
                self.features.len()
            )));
        }
        if let Some((name, s)) = self
            .features
            .names()
            .iter()
            .zip(self.scaler.stats())
            .find(|(_, s)| !s.mean.is_finite() || !s.std.is_finite() || s.std <= 0.0)
        {
            return Err(StressError::ArtifactMismatch(format!(
                "scaler for {name} has mean {} and std {}",
                s.mean, s.std
            )));
        }
        self.ensemble.validate(self.features.len())
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub fn artifact_id(&self) -> Uuid {
        self.artifact_id
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn producer(&self) -> &ArtifactProducer {
        &self.producer
    }

    pub fn features(&self) -> &FrozenFeatureSet {
        &self.features
    }

    pub fn scaler(&self) -> &ScalerParams {
        &self.scaler
    }

    pub fn ensemble(&self) -> &TrainedEnsemble {
        &self.ensemble
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    /// Parse and validate an artifact
    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: Self = serde_json::from_str(json)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write to `path` through a uniquely named sibling temp file, so readers
    /// never see a half-written artifact and concurrent saves never share one
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(".{}.tmp", Uuid::new_v4()));

        let written = std::fs::write(&tmp, json).and_then(|()| std::fs::rename(&tmp, path));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::trained_artifact;
    use crate::types::VitalSample;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_json_round_trip_is_exact() {
        let artifact = trained_artifact();
        let back = Artifact::from_json(&artifact.to_json().unwrap()).unwrap();

        assert_eq!(&back, artifact);
        assert_eq!(back.schema_version(), ARTIFACT_SCHEMA_VERSION);
        assert_eq!(back.producer().name, PRODUCER_NAME);
    }

    #[test]
    fn test_save_load_same_prediction() {
        let artifact = trained_artifact();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        artifact.save(&path).unwrap();
        let loaded = Artifact::load(&path).unwrap();

        let sample = VitalSample::new(25.0, 110.0, 150.0, 95.0, 96.0);
        let before = crate::inference::infer(artifact, &sample).unwrap();
        let after = crate::inference::infer(&loaded, &sample).unwrap();
        assert_eq!(before.probability.to_bits(), after.probability.to_bits());
        assert_eq!(before.label, after.label);
    }

    #[test]
    fn test_wrong_schema_version_rejected() {
        let json = trained_artifact()
            .to_json()
            .unwrap()
            .replace(ARTIFACT_SCHEMA_VERSION, "stress.artifact.v0");

        let err = Artifact::from_json(&json).unwrap_err();
        assert!(matches!(err, StressError::ArtifactMismatch(_)));
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let artifact = trained_artifact();
        let first = artifact.features().names()[0].clone();
        let json = artifact
            .to_json()
            .unwrap()
            .replacen(&format!("\"{first}\""), "\"Cortisol\"", 1);

        let err = Artifact::from_json(&json).unwrap_err();
        assert!(matches!(err, StressError::ArtifactMismatch(_)));
    }

    #[test]
    fn test_mismatched_scaler_rejected() {
        let artifact = trained_artifact();
        let names: Vec<String> = artifact.features().names()[1..].to_vec();
        let err = Artifact::new(
            FrozenFeatureSet::new(names),
            artifact.scaler().clone(),
            artifact.ensemble().clone(),
            ArtifactMetadata::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StressError::ArtifactMismatch(_)));
    }

    /// Serialize the shared artifact after `edit` rewrites its JSON tree
    fn edited(edit: impl FnOnce(&mut serde_json::Value)) -> String {
        let mut value = serde_json::to_value(trained_artifact()).unwrap();
        edit(&mut value);
        serde_json::to_string(&value).unwrap()
    }

    fn member<'a>(value: &'a mut serde_json::Value, kind: &str) -> &'a mut serde_json::Value {
        value["ensemble"]["members"]
            .as_array_mut()
            .unwrap()
            .iter_mut()
            .find(|m| m["kind"] == kind)
            .map(|m| &mut m["model"])
            .unwrap()
    }

    fn first_split(tree: &mut serde_json::Value) -> &mut serde_json::Value {
        tree["nodes"]
            .as_array_mut()
            .unwrap()
            .iter_mut()
            .find(|n| n["type"] == "split")
            .unwrap()
    }

    #[test]
    fn test_out_of_range_tree_feature_rejected() {
        let json = edited(|v| {
            let tree = &mut member(v, "random_forest")["trees"][0];
            first_split(tree)["feature"] = 999.into();
        });

        let err = Artifact::from_json(&json).unwrap_err();
        assert!(matches!(err, StressError::ArtifactMismatch(_)));
        assert!(err.to_string().contains("random_forest"));
    }

    #[test]
    fn test_out_of_range_tree_child_rejected() {
        let json = edited(|v| {
            let tree = &mut member(v, "gradient_boosting")["trees"][0];
            first_split(tree)["right"] = 100_000.into();
        });

        let err = Artifact::from_json(&json).unwrap_err();
        assert!(matches!(err, StressError::ArtifactMismatch(_)));
    }

    #[test]
    fn test_short_mlp_weight_row_rejected() {
        let json = edited(|v| {
            let row = &mut member(v, "mlp")["layers"][0]["weights"][0];
            row.as_array_mut().unwrap().pop();
        });

        let err = Artifact::from_json(&json).unwrap_err();
        assert!(matches!(err, StressError::ArtifactMismatch(_)));
        assert!(err.to_string().contains("mlp"));
    }

    #[test]
    fn test_short_support_vector_rejected() {
        let json = edited(|v| {
            let sv = &mut member(v, "svm_rbf")["support_vectors"][0];
            sv.as_array_mut().unwrap().pop();
        });

        let err = Artifact::from_json(&json).unwrap_err();
        assert!(matches!(err, StressError::ArtifactMismatch(_)));
    }

    #[test]
    fn test_zero_scaler_std_rejected() {
        let json = edited(|v| {
            v["scaler"]["stats"][0]["std"] = 0.0.into();
        });

        let err = Artifact::from_json(&json).unwrap_err();
        assert!(matches!(err, StressError::ArtifactMismatch(_)));
    }

    #[test]
    fn test_concurrent_saves_leave_one_valid_file() {
        let artifact = trained_artifact();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| artifact.save(&path).unwrap());
            }
        });

        assert_eq!(&Artifact::load(&path).unwrap(), artifact);
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_failed_save_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        let err = trained_artifact().save(&path).unwrap_err();
        assert!(matches!(err, StressError::Io(_)));
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
