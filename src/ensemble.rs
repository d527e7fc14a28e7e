//! Soft-voting ensemble of the five base models

use crate::error::{Result, StressError};
use crate::models::{
    BaseModel, BaseModelKind, GradientBoosting, GradientBoostingConfig, Mlp, MlpConfig,
    RandomForest, RandomForestConfig, SupportVectorMachine, SvmConfig,
};
use crate::types::{Label, PredictionResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Combination rule stored with every trained ensemble
pub const COMBINATION_RULE: &str = "soft_voting_mean";

/// Hyperparameters for every member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub random_forest: RandomForestConfig,
    pub gradient_boosting: GradientBoostingConfig,
    pub mlp: MlpConfig,
    pub svm_rbf: SvmConfig,
    pub svm_linear: SvmConfig,
    /// Fit the members concurrently
    pub parallel: bool,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            random_forest: RandomForestConfig::default(),
            gradient_boosting: GradientBoostingConfig::default(),
            mlp: MlpConfig::default(),
            svm_rbf: SvmConfig::rbf(),
            svm_linear: SvmConfig::linear(),
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedEnsemble {
    combination: String,
    members: Vec<BaseModel>,
}

impl TrainedEnsemble {
    /// Fit all five members on the same scaled matrix.
    ///
    /// Any member failure fails the whole fit; no partial ensemble is
    /// returned.
    pub fn fit(
        rows: &[Vec<f64>],
        labels: &[Label],
        config: &EnsembleConfig,
        seed: u64,
    ) -> Result<Self> {
        validate_matrix(rows, labels)?;
        let targets: Vec<f64> = labels.iter().map(Label::as_target).collect();

        let fit_one = |(idx, kind): (usize, BaseModelKind)| -> Result<BaseModel> {
            let member_seed = seed.wrapping_add(idx as u64);
            let model = match kind {
                BaseModelKind::RandomForest => BaseModel::RandomForest(RandomForest::fit(
                    rows,
                    &targets,
                    &config.random_forest,
                    member_seed,
                )?),
                BaseModelKind::GradientBoosting => BaseModel::GradientBoosting(
                    GradientBoosting::fit(rows, &targets, &config.gradient_boosting, member_seed)?,
                ),
                BaseModelKind::Mlp => {
                    BaseModel::Mlp(Mlp::fit(rows, &targets, &config.mlp, member_seed)?)
                }
                BaseModelKind::SvmRbf => BaseModel::SvmRbf(SupportVectorMachine::fit(
                    rows,
                    &targets,
                    &config.svm_rbf,
                )?),
                BaseModelKind::SvmLinear => BaseModel::SvmLinear(SupportVectorMachine::fit(
                    rows,
                    &targets,
                    &config.svm_linear,
                )?),
            };
            debug!(model = %kind, "member fitted");
            Ok(model)
        };

        let kinds = BaseModelKind::ALL.into_iter().enumerate();
        let members: Vec<BaseModel> = if config.parallel {
            kinds.collect::<Vec<_>>().into_par_iter().map(fit_one).collect::<Result<_>>()?
        } else {
            kinds.map(fit_one).collect::<Result<_>>()?
        };

        info!(rows = rows.len(), features = rows[0].len(), "ensemble fitted");
        Ok(Self {
            combination: COMBINATION_RULE.to_string(),
            members,
        })
    }

    pub fn members(&self) -> &[BaseModel] {
        &self.members
    }

    pub fn combination(&self) -> &str {
        &self.combination
    }

    pub fn member(&self, kind: BaseModelKind) -> Option<&BaseModel> {
        self.members.iter().find(|m| m.kind() == kind)
    }

    /// Width expected by every member
    pub fn n_features(&self) -> usize {
        self.members.first().map_or(0, BaseModel::n_features)
    }

    /// Per-member stressed probabilities, in member order
    pub fn member_probabilities(&self, row: &[f64]) -> Vec<(BaseModelKind, f64)> {
        self.members
            .iter()
            .map(|m| (m.kind(), m.predict_proba(row)))
            .collect()
    }

    /// Unweighted mean of the members' probabilities
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let sum: f64 = self.members.iter().map(|m| m.predict_proba(row)).sum();
        sum / self.members.len() as f64
    }

    pub fn predict(&self, row: &[f64]) -> PredictionResult {
        PredictionResult::from_probability(self.predict_proba(row))
    }

    /// Structural checks for an ensemble read back from an artifact
    pub fn validate(&self, n_features: usize) -> Result<()> {
        if self.combination != COMBINATION_RULE {
            return Err(StressError::ArtifactMismatch(format!(
                "unsupported combination rule '{}'",
                self.combination
            )));
        }
        for kind in BaseModelKind::ALL {
            if self.members.iter().filter(|m| m.kind() == kind).count() != 1 {
                return Err(StressError::ArtifactMismatch(format!(
                    "ensemble must contain exactly one {kind} member"
                )));
            }
        }
        if self.members.len() != BaseModelKind::ALL.len() {
            return Err(StressError::ArtifactMismatch(format!(
                "ensemble has {} members, expected {}",
                self.members.len(),
                BaseModelKind::ALL.len()
            )));
        }
        if let Some(m) = self.members.iter().find(|m| m.n_features() != n_features) {
            return Err(StressError::ArtifactMismatch(format!(
                "{} expects {} features but {} are selected",
                m.kind(),
                m.n_features(),
                n_features
            )));
        }
        for m in &self.members {
            m.validate().map_err(|e| match e {
                StressError::ArtifactMismatch(msg) => {
                    StressError::ArtifactMismatch(format!("{}: {msg}", m.kind()))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

fn validate_matrix(rows: &[Vec<f64>], labels: &[Label]) -> Result<()> {
    if rows.len() != labels.len() {
        return Err(StressError::Validation(format!(
            "{} rows but {} labels",
            rows.len(),
            labels.len()
        )));
    }
    let width = rows.first().map_or(0, Vec::len);
    if width == 0 {
        return Err(StressError::Validation(
            "ensemble needs at least one row and one feature".to_string(),
        ));
    }
    if rows.iter().any(|r| r.len() != width) {
        return Err(StressError::Validation(
            "feature rows have inconsistent widths".to_string(),
        ));
    }
    if rows.iter().flatten().any(|v| !v.is_finite()) {
        return Err(StressError::NumericDomain(
            "feature matrix contains non-finite values".to_string(),
        ));
    }
    let stressed = labels.iter().filter(|l| l.is_stressed()).count();
    if stressed == 0 || stressed == labels.len() {
        return Err(StressError::Validation(
            "both relaxed and stressed rows are required".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> EnsembleConfig {
        EnsembleConfig {
            random_forest: RandomForestConfig {
                n_estimators: 10,
                max_depth: 4,
                ..Default::default()
            },
            gradient_boosting: GradientBoostingConfig {
                n_estimators: 10,
                max_depth: 2,
                ..Default::default()
            },
            mlp: MlpConfig {
                hidden_layers: vec![6],
                learning_rate: 0.01,
                batch_size: 16,
                max_epochs: 100,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn toy() -> (Vec<Vec<f64>>, Vec<Label>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let offset = (i % 5) as f64 * 0.15;
            let stressed = i % 2 == 0;
            let sign = if stressed { 1.0 } else { -1.0 };
            rows.push(vec![sign * (1.0 + offset), sign * 0.5 - offset * 0.2]);
            labels.push(Label::from_stressed(stressed));
        }
        (rows, labels)
    }

    #[test]
    fn test_probability_is_mean_of_members() {
        let (rows, labels) = toy();
        let ensemble = TrainedEnsemble::fit(&rows, &labels, &small_config(), 42).unwrap();

        let row = [0.3, -0.2];
        let members = ensemble.member_probabilities(&row);
        assert_eq!(members.len(), 5);
        let mean = members.iter().map(|(_, p)| p).sum::<f64>() / 5.0;
        let p = ensemble.predict_proba(&row);

        assert!((p - mean).abs() < 1e-15);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn test_ensemble_separates_toy_data() {
        let (rows, labels) = toy();
        let ensemble = TrainedEnsemble::fit(&rows, &labels, &small_config(), 42).unwrap();

        assert_eq!(ensemble.predict(&[1.3, 0.5]).label, Label::Stressed);
        assert_eq!(ensemble.predict(&[-1.3, -0.5]).label, Label::Relaxed);
        assert!(ensemble.validate(2).is_ok());
        assert_eq!(ensemble.combination(), COMBINATION_RULE);
    }

    #[test]
    fn test_parallel_and_serial_fits_agree() {
        let (rows, labels) = toy();
        let parallel = TrainedEnsemble::fit(&rows, &labels, &small_config(), 3).unwrap();
        let serial_config = EnsembleConfig {
            parallel: false,
            ..small_config()
        };
        let serial = TrainedEnsemble::fit(&rows, &labels, &serial_config, 3).unwrap();

        assert_eq!(parallel, serial);
    }

    #[test]
    fn test_single_class_rejected() {
        let (rows, _) = toy();
        let labels = vec![Label::Stressed; rows.len()];
        let err = TrainedEnsemble::fit(&rows, &labels, &small_config(), 0).unwrap_err();
        assert!(matches!(err, StressError::Validation(_)));
    }

    #[test]
    fn test_member_failure_aborts_fit() {
        let (rows, labels) = toy();
        let mut config = small_config();
        config.svm_linear.c = -1.0;
        assert!(TrainedEnsemble::fit(&rows, &labels, &config, 0).is_err());
    }

    #[test]
    fn test_validate_catches_width_mismatch() {
        let (rows, labels) = toy();
        let ensemble = TrainedEnsemble::fit(&rows, &labels, &small_config(), 0).unwrap();
        let err = ensemble.validate(3).unwrap_err();
        assert!(matches!(err, StressError::ArtifactMismatch(_)));
    }
}
