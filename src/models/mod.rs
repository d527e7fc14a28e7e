//! Base classifiers of the ensemble
//!
//! Every model is trained on the scaled, frozen feature matrix with 0/1
//! targets (1 = stressed) and outputs a stressed-class probability.

pub mod boosting;
pub mod forest;
pub mod mlp;
pub mod svm;
pub mod tree;

pub use boosting::{GradientBoosting, GradientBoostingConfig};
pub use forest::{RandomForest, RandomForestConfig};
pub use mlp::{Mlp, MlpConfig};
pub use svm::{Kernel, KernelConfig, SupportVectorMachine, SvmConfig};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The five ensemble members, in voting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseModelKind {
    RandomForest,
    GradientBoosting,
    Mlp,
    SvmRbf,
    SvmLinear,
}

impl BaseModelKind {
    pub const ALL: [BaseModelKind; 5] = [
        BaseModelKind::RandomForest,
        BaseModelKind::GradientBoosting,
        BaseModelKind::Mlp,
        BaseModelKind::SvmRbf,
        BaseModelKind::SvmLinear,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BaseModelKind::RandomForest => "random_forest",
            BaseModelKind::GradientBoosting => "gradient_boosting",
            BaseModelKind::Mlp => "mlp",
            BaseModelKind::SvmRbf => "svm_rbf",
            BaseModelKind::SvmLinear => "svm_linear",
        }
    }
}

impl fmt::Display for BaseModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fitted ensemble member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model", rename_all = "snake_case")]
pub enum BaseModel {
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
    Mlp(Mlp),
    SvmRbf(SupportVectorMachine),
    SvmLinear(SupportVectorMachine),
}

impl BaseModel {
    pub fn kind(&self) -> BaseModelKind {
        match self {
            BaseModel::RandomForest(_) => BaseModelKind::RandomForest,
            BaseModel::GradientBoosting(_) => BaseModelKind::GradientBoosting,
            BaseModel::Mlp(_) => BaseModelKind::Mlp,
            BaseModel::SvmRbf(_) => BaseModelKind::SvmRbf,
            BaseModel::SvmLinear(_) => BaseModelKind::SvmLinear,
        }
    }

    /// Stressed-class probability for one scaled row
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        match self {
            BaseModel::RandomForest(m) => m.predict_proba(row),
            BaseModel::GradientBoosting(m) => m.predict_proba(row),
            BaseModel::Mlp(m) => m.predict_proba(row),
            BaseModel::SvmRbf(m) | BaseModel::SvmLinear(m) => m.predict_proba(row),
        }
    }

    /// Internal shape checks for a member read back from an artifact
    pub fn validate(&self) -> Result<()> {
        match self {
            BaseModel::RandomForest(m) => m.validate(),
            BaseModel::GradientBoosting(m) => m.validate(),
            BaseModel::Mlp(m) => m.validate(),
            BaseModel::SvmRbf(m) | BaseModel::SvmLinear(m) => m.validate(),
        }
    }

    /// Width of the rows the model was trained on
    pub fn n_features(&self) -> usize {
        match self {
            BaseModel::RandomForest(m) => m.n_features(),
            BaseModel::GradientBoosting(m) => m.n_features(),
            BaseModel::Mlp(m) => m.n_features(),
            BaseModel::SvmRbf(m) | BaseModel::SvmLinear(m) => m.n_features(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_unique() {
        let mut names: Vec<&str> = BaseModelKind::ALL.iter().map(BaseModelKind::name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn test_kind_serializes_as_name() {
        for kind in BaseModelKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
    }
}
