//! Stress Ensemble - Deterministic relaxed/stressed classification from vitals
//!
//! Five raw vitals (HRV, heart rate, systolic and diastolic blood pressure,
//! SpO2) flow through a fixed pipeline: feature derivation → frozen feature
//! selection → standardization → soft-voting ensemble of five classifiers.
//!
//! ## Modules
//!
//! - **Training**: [`pipeline::train`] turns labeled samples into an [`Artifact`]
//! - **Inference**: [`inference::infer`] and [`InferenceService`] classify
//!   single samples with a trained artifact
//!
//! Training and inference derive features with the same [`FeatureDeriver`].

pub mod artifact;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod inference;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod ranking;
pub mod scaler;
pub mod schema;
pub mod split;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

#[cfg(test)]
mod test_support;

pub use artifact::{Artifact, ARTIFACT_SCHEMA_VERSION};
pub use config::TrainingConfig;
pub use ensemble::{EnsembleConfig, TrainedEnsemble};
pub use error::StressError;
pub use features::{FeatureDeriver, FeatureVector, FEATURE_NAMES};
pub use inference::{infer, InferenceService};
pub use pipeline::{train, TrainingPipeline, TrainingReport};
pub use ranking::{FeatureRanker, FrozenFeatureSet};
pub use scaler::ScalerParams;
pub use types::{Label, LabeledSample, PredictionResult, VitalSample};

// Dataset exports
pub use schema::{DatasetAdapter, DatasetRecord};

/// Library version recorded in every artifact
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name recorded in every artifact
pub const PRODUCER_NAME: &str = "stress-ensemble";
