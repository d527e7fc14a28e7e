//! Training pipeline orchestration
//!
//! This module provides the training entry point. It runs the full sequence
//! from labeled vitals to a validated [`Artifact`]:
//! split → derive → rank (train split only) → freeze → scale → fit ensemble
//! → evaluate on the held-out split → cross-validate.
//!
//! Nothing is returned unless every stage succeeds.

use crate::artifact::{Artifact, ArtifactMetadata};
use crate::config::TrainingConfig;
use crate::ensemble::TrainedEnsemble;
use crate::error::{Result, StressError};
use crate::features::{FeatureDeriver, FeatureVector};
use crate::metrics::{
    accuracy, mean_std, roc_auc, roc_curve, ClassificationReport, ConfusionMatrix, RocPoint,
};
use crate::models::{BaseModel, BaseModelKind};
use crate::ranking::{FeatureRanker, FeatureRanking, FrozenFeatureSet};
use crate::scaler::ScalerParams;
use crate::schema::{DatasetAdapter, DatasetRecord};
use crate::split::{class_counts, stratified_k_fold, stratified_split};
use crate::types::{Label, LabeledSample, VitalSample};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Held-out accuracy of one ensemble member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberScore {
    pub model: BaseModelKind,
    pub accuracy: f64,
}

/// Random forest importance of one selected feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationSummary {
    pub fold_accuracies: Vec<f64>,
    pub mean_accuracy: f64,
    /// Population standard deviation across folds
    pub std_accuracy: f64,
}

/// Everything measured during a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub ranking: FeatureRanking,
    pub selected_features: Vec<String>,
    pub train_samples: usize,
    pub test_samples: usize,
    pub accuracy: f64,
    pub auc: Option<f64>,
    pub confusion_matrix: ConfusionMatrix,
    pub classification_report: ClassificationReport,
    pub roc_curve: Vec<RocPoint>,
    pub member_scores: Vec<MemberScore>,
    pub feature_importances: Vec<FeatureImportance>,
    pub cross_validation: Option<CrossValidationSummary>,
}

/// Train an artifact from labeled samples
pub fn train(dataset: &[LabeledSample], config: &TrainingConfig) -> Result<(Artifact, TrainingReport)> {
    TrainingPipeline::new(config.clone()).train(dataset)
}

/// Reusable training entry point holding a validated configuration
#[derive(Debug, Clone, Default)]
pub struct TrainingPipeline {
    config: TrainingConfig,
}

impl TrainingPipeline {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train from raw dataset records; non Relaxed/Stressed rows are excluded
    pub fn train_records(&self, records: &[DatasetRecord]) -> Result<(Artifact, TrainingReport)> {
        let rows = DatasetAdapter::to_training_rows(records)?;
        self.train(&rows)
    }

    pub fn train(&self, dataset: &[LabeledSample]) -> Result<(Artifact, TrainingReport)> {
        let config = &self.config;
        config.validate()?;

        let labels: Vec<Label> = dataset.iter().map(|r| r.label).collect();
        let (relaxed, stressed) = class_counts(&labels);
        let needed = config.min_class_rows();
        if relaxed < needed || stressed < needed {
            return Err(StressError::Validation(format!(
                "each class needs at least {needed} rows (relaxed: {relaxed}, stressed: {stressed})"
            )));
        }
        info!(rows = dataset.len(), relaxed, stressed, "training started");

        let samples: Vec<VitalSample> = dataset.iter().map(|r| r.sample).collect();
        let vectors = FeatureDeriver::derive_batch(&samples)?;

        let split = stratified_split(&labels, config.test_ratio, config.seed)?;
        let train_vectors = pick(&vectors, &split.train);
        let train_labels = pick(&labels, &split.train);
        let test_vectors = pick(&vectors, &split.test);
        let test_labels = pick(&labels, &split.test);
        info!(train = split.train.len(), test = split.test.len(), "stratified split");

        let ranking = FeatureRanker::rank(&train_vectors, &train_labels)?;
        let features = ranking.freeze(config.top_k);
        info!(selected = ?features.names(), dropped = ?ranking.dropped, "features frozen");

        let stage = fit_stage(&features, &train_vectors, &train_labels, config, config.seed)?;

        let test_rows = stage.scaler.transform_all(&features.project(&test_vectors)?)?;
        let scores: Vec<f64> = test_rows.iter().map(|r| stage.ensemble.predict_proba(r)).collect();
        let predicted: Vec<Label> = scores.iter().map(|&p| Label::from_stressed(p > 0.5)).collect();

        let test_accuracy = accuracy(&test_labels, &predicted);
        let auc = roc_auc(&test_labels, &scores);
        let confusion_matrix = ConfusionMatrix::from_labels(&test_labels, &predicted);
        info!(accuracy = test_accuracy, auc = ?auc, "held-out evaluation");

        let member_scores = member_scores(&stage.ensemble, &test_rows, &test_labels);
        for score in &member_scores {
            debug!(model = %score.model, accuracy = score.accuracy, "member evaluation");
        }

        let cross_validation = if config.cv_folds >= 2 {
            Some(cross_validate(&features, &vectors, &labels, config)?)
        } else {
            None
        };

        let metadata = ArtifactMetadata {
            accuracy: test_accuracy,
            auc,
            cv_mean_accuracy: cross_validation.as_ref().map(|cv| cv.mean_accuracy),
            cv_std_accuracy: cross_validation.as_ref().map(|cv| cv.std_accuracy),
            train_samples: split.train.len(),
            test_samples: split.test.len(),
        };

        let report = TrainingReport {
            selected_features: features.names().to_vec(),
            train_samples: split.train.len(),
            test_samples: split.test.len(),
            accuracy: test_accuracy,
            auc,
            confusion_matrix,
            classification_report: ClassificationReport::from_confusion(&confusion_matrix),
            roc_curve: roc_curve(&test_labels, &scores),
            member_scores,
            feature_importances: forest_importances(&stage.ensemble, &features),
            cross_validation,
            ranking,
        };

        let artifact = Artifact::new(features, stage.scaler, stage.ensemble, metadata)?;
        info!(artifact_id = %artifact.artifact_id(), "training finished");
        Ok((artifact, report))
    }
}

struct FittedStage {
    scaler: ScalerParams,
    ensemble: TrainedEnsemble,
}

/// Project onto the frozen features, fit the scaler and the ensemble
fn fit_stage(
    features: &FrozenFeatureSet,
    vectors: &[FeatureVector],
    labels: &[Label],
    config: &TrainingConfig,
    seed: u64,
) -> Result<FittedStage> {
    let projected = features.project(vectors)?;
    let scaler = ScalerParams::fit(&projected, features.names())?;
    let rows = scaler.transform_all(&projected)?;
    let ensemble = TrainedEnsemble::fit(&rows, labels, &config.ensemble, seed)?;
    Ok(FittedStage { scaler, ensemble })
}

/// Stratified k-fold over the whole dataset with the frozen features; each
/// fold fits its own scaler and ensemble
fn cross_validate(
    features: &FrozenFeatureSet,
    vectors: &[FeatureVector],
    labels: &[Label],
    config: &TrainingConfig,
) -> Result<CrossValidationSummary> {
    let folds = stratified_k_fold(labels, config.cv_folds, config.seed)?;
    let mut fold_accuracies = Vec::with_capacity(folds.len());

    for (fold, split) in folds.iter().enumerate() {
        let seed = config.seed.wrapping_add(100 * (fold as u64 + 1));
        let stage = fit_stage(
            features,
            &pick(vectors, &split.train),
            &pick(labels, &split.train),
            config,
            seed,
        )?;

        let held_out = stage
            .scaler
            .transform_all(&features.project(&pick(vectors, &split.test))?)?;
        let predicted: Vec<Label> = held_out.iter().map(|r| stage.ensemble.predict(r).label).collect();
        let fold_accuracy = accuracy(&pick(labels, &split.test), &predicted);
        debug!(fold, accuracy = fold_accuracy, "cross-validation fold");
        fold_accuracies.push(fold_accuracy);
    }

    let (mean_accuracy, std_accuracy) = mean_std(&fold_accuracies);
    info!(folds = folds.len(), mean_accuracy, std_accuracy, "cross-validation");
    Ok(CrossValidationSummary {
        fold_accuracies,
        mean_accuracy,
        std_accuracy,
    })
}

fn member_scores(ensemble: &TrainedEnsemble, rows: &[Vec<f64>], labels: &[Label]) -> Vec<MemberScore> {
    ensemble
        .members()
        .iter()
        .map(|member| {
            let predicted: Vec<Label> = rows
                .iter()
                .map(|r| Label::from_stressed(member.predict_proba(r) > 0.5))
                .collect();
            MemberScore {
                model: member.kind(),
                accuracy: accuracy(labels, &predicted),
            }
        })
        .collect()
}

/// Forest importances by feature, highest first
fn forest_importances(ensemble: &TrainedEnsemble, features: &FrozenFeatureSet) -> Vec<FeatureImportance> {
    let Some(BaseModel::RandomForest(forest)) = ensemble.member(BaseModelKind::RandomForest) else {
        return Vec::new();
    };
    let mut out: Vec<FeatureImportance> = features
        .names()
        .iter()
        .zip(forest.feature_importances())
        .map(|(name, &importance)| FeatureImportance {
            name: name.clone(),
            importance,
        })
        .collect();
    out.sort_by(|a, b| b.importance.total_cmp(&a.importance).then_with(|| a.name.cmp(&b.name)));
    out
}

fn pick<T: Clone>(items: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| items[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::infer;
    use crate::test_support::{small_training_config, synthetic_dataset, trained_artifact};

    #[test]
    fn test_scenario_a_is_stressed() {
        let sample = VitalSample::new(25.0, 110.0, 150.0, 95.0, 96.0);
        let result = infer(trained_artifact(), &sample).unwrap();

        assert_eq!(result.label, Label::Stressed);
        assert!(result.probability > 0.5);
    }

    #[test]
    fn test_scenario_b_is_relaxed() {
        let sample = VitalSample::new(65.0, 72.0, 120.0, 80.0, 99.0);
        let result = infer(trained_artifact(), &sample).unwrap();

        assert_eq!(result.label, Label::Relaxed);
        assert!(result.probability < 0.5);
    }

    #[test]
    fn test_report_and_metadata_agree() {
        let dataset = synthetic_dataset(120, 5);
        let (artifact, report) = train(&dataset, &small_training_config()).unwrap();

        let metadata = artifact.metadata();
        assert_eq!(metadata.accuracy, report.accuracy);
        assert_eq!(metadata.train_samples + metadata.test_samples, 120);
        assert_eq!(metadata.test_samples, 30);
        assert_eq!(report.selected_features.len(), 15);
        assert_eq!(artifact.features().names(), report.selected_features.as_slice());
        assert!(report.accuracy > 0.8);
        assert_eq!(report.member_scores.len(), 5);
        assert_eq!(report.confusion_matrix.total(), 30);
        assert!(report.ranking.dropped.contains(&"Max_HR_Estimated".to_string()));

        let cv = report.cross_validation.unwrap();
        assert_eq!(cv.fold_accuracies.len(), 3);
        assert_eq!(metadata.cv_mean_accuracy, Some(cv.mean_accuracy));
    }

    #[test]
    fn test_cross_validation_can_be_disabled() {
        let config = TrainingConfig {
            cv_folds: 0,
            ..small_training_config()
        };
        let (artifact, report) = train(&synthetic_dataset(60, 2), &config).unwrap();

        assert!(report.cross_validation.is_none());
        assert_eq!(artifact.metadata().cv_mean_accuracy, None);
    }

    #[test]
    fn test_small_class_rejected() {
        let mut dataset = synthetic_dataset(40, 1);
        dataset.retain(|r| r.label == Label::Relaxed);
        dataset.extend(synthetic_dataset(4, 1).into_iter().filter(|r| r.label == Label::Stressed));

        let err = train(&dataset, &small_training_config()).unwrap_err();
        assert!(matches!(err, StressError::Validation(_)));
    }

    #[test]
    fn test_zero_hrv_fails_training() {
        let mut dataset = synthetic_dataset(60, 3);
        dataset[7].sample.hrv = 0.0;

        let err = train(&dataset, &small_training_config()).unwrap_err();
        assert!(matches!(err, StressError::NumericDomain(_)));
    }

    #[test]
    fn test_same_seed_same_models() {
        let dataset = synthetic_dataset(60, 9);
        let config = TrainingConfig {
            cv_folds: 0,
            ..small_training_config()
        };
        let (a, _) = train(&dataset, &config).unwrap();
        let (b, _) = train(&dataset, &config).unwrap();

        assert_eq!(a.features(), b.features());
        assert_eq!(a.scaler(), b.scaler());
        assert_eq!(a.ensemble(), b.ensemble());
        assert_ne!(a.artifact_id(), b.artifact_id());
    }
}
