//! Inference over a trained artifact
//!
//! Single samples go through the same [`FeatureDeriver`] used in training,
//! are projected onto the artifact's frozen features, standardized with the
//! stored scaler and scored by the ensemble.

use crate::artifact::Artifact;
use crate::error::{Result, StressError};
use crate::features::FeatureDeriver;
use crate::types::{PredictionResult, VitalSample};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Classify one sample with `artifact`
pub fn infer(artifact: &Artifact, sample: &VitalSample) -> Result<PredictionResult> {
    let vector = FeatureDeriver::derive(sample)?;
    let indices = artifact.features().resolve()?;
    let row = artifact.scaler().transform(&vector.select(&indices))?;
    let probability = artifact.ensemble().predict_proba(&row);

    if !probability.is_finite() {
        return Err(StressError::NumericDomain(format!(
            "ensemble produced a non-finite probability for {sample:?}"
        )));
    }
    Ok(PredictionResult::from_probability(probability.clamp(0.0, 1.0)))
}

/// Holds the active artifact and serves predictions.
///
/// Readers clone the `Arc` under a short read lock and score without holding
/// it, so [`replace`](Self::replace) never waits on a prediction and a
/// prediction always sees one whole artifact.
pub struct InferenceService {
    slot: RwLock<Arc<Artifact>>,
}

impl InferenceService {
    pub fn new(artifact: Artifact) -> Self {
        Self {
            slot: RwLock::new(Arc::new(artifact)),
        }
    }

    /// Load and validate an artifact file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Artifact::load(path)?))
    }

    /// The artifact currently serving predictions
    pub fn current(&self) -> Arc<Artifact> {
        Arc::clone(&self.slot.read())
    }

    pub fn predict(&self, sample: &VitalSample) -> Result<PredictionResult> {
        let artifact = self.current();
        infer(&artifact, sample)
    }

    /// Score several samples against the same artifact snapshot
    pub fn predict_batch(&self, samples: &[VitalSample]) -> Result<Vec<PredictionResult>> {
        let artifact = self.current();
        samples.iter().map(|s| infer(&artifact, s)).collect()
    }

    /// Swap in a new artifact; returns the previous one
    pub fn replace(&self, artifact: Artifact) -> Arc<Artifact> {
        let next = Arc::new(artifact);
        info!(artifact_id = %next.artifact_id(), "artifact replaced");
        std::mem::replace(&mut *self.slot.write(), next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::trained_artifact;
    use crate::types::Label;

    #[test]
    fn test_infer_matches_manual_pipeline() {
        let artifact = trained_artifact();
        let sample = VitalSample::new(40.0, 90.0, 130.0, 85.0, 97.0);

        let vector = FeatureDeriver::derive(&sample).unwrap();
        let indices = artifact.features().resolve().unwrap();
        let row = artifact.scaler().transform(&vector.select(&indices)).unwrap();
        let expected = artifact.ensemble().predict_proba(&row);

        assert_eq!(infer(artifact, &sample).unwrap().probability, expected);
    }

    #[test]
    fn test_zero_hrv_is_numeric_domain_error() {
        let sample = VitalSample::new(0.0, 72.0, 120.0, 80.0, 99.0);
        let err = infer(trained_artifact(), &sample).unwrap_err();
        assert!(matches!(err, StressError::NumericDomain(_)));
    }

    #[test]
    fn test_service_predict_and_batch() {
        let service = InferenceService::new(trained_artifact().clone());
        let samples = [
            VitalSample::new(25.0, 110.0, 150.0, 95.0, 96.0),
            VitalSample::new(65.0, 72.0, 120.0, 80.0, 99.0),
        ];

        let batch = service.predict_batch(&samples).unwrap();
        assert_eq!(batch[0].label, Label::Stressed);
        assert_eq!(batch[1].label, Label::Relaxed);
        assert_eq!(service.predict(&samples[0]).unwrap(), batch[0]);
    }

    #[test]
    fn test_replace_swaps_artifact() {
        let original = trained_artifact().clone();
        let service = InferenceService::new(original.clone());
        let replacement = Artifact::from_json(&original.to_json().unwrap()).unwrap();

        let before = service.current();
        let previous = service.replace(replacement);

        assert!(Arc::ptr_eq(&before, &previous));
        assert!(!Arc::ptr_eq(&previous, &service.current()));
        assert_eq!(service.current().as_ref(), &original);
    }

    #[test]
    fn test_concurrent_predictions_during_replace() {
        let service = Arc::new(InferenceService::new(trained_artifact().clone()));
        let sample = VitalSample::new(25.0, 110.0, 150.0, 95.0, 96.0);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let service = Arc::clone(&service);
                scope.spawn(move || {
                    for _ in 0..50 {
                        assert_eq!(service.predict(&sample).unwrap().label, Label::Stressed);
                    }
                });
            }
            service.replace(trained_artifact().clone());
        });
    }
}
