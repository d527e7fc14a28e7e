//! Synthetic stress dataset shared by unit tests

use crate::artifact::Artifact;
use crate::config::TrainingConfig;
use crate::ensemble::EnsembleConfig;
use crate::models::{GradientBoostingConfig, MlpConfig, RandomForestConfig};
use crate::pipeline::train;
use crate::types::{Label, LabeledSample, VitalSample};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::OnceLock;

/// Standard normal draw (Box-Muller)
fn normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn draw(rng: &mut StdRng, mean: f64, std: f64, lo: f64, hi: f64) -> f64 {
    (mean + std * normal(rng)).clamp(lo, hi)
}

/// Alternating relaxed/stressed rows with well separated vitals
pub(crate) fn synthetic_dataset(n: usize, seed: u64) -> Vec<LabeledSample> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let stressed = i % 2 == 1;
            let sample = if stressed {
                VitalSample::new(
                    draw(&mut rng, 30.0, 7.0, 8.0, 60.0),
                    draw(&mut rng, 102.0, 9.0, 75.0, 140.0),
                    draw(&mut rng, 142.0, 9.0, 115.0, 180.0),
                    draw(&mut rng, 91.0, 5.0, 75.0, 110.0),
                    draw(&mut rng, 96.0, 1.2, 90.0, 100.0),
                )
            } else {
                VitalSample::new(
                    draw(&mut rng, 66.0, 9.0, 35.0, 110.0),
                    draw(&mut rng, 70.0, 7.0, 50.0, 95.0),
                    draw(&mut rng, 117.0, 7.0, 95.0, 140.0),
                    draw(&mut rng, 77.0, 5.0, 60.0, 92.0),
                    draw(&mut rng, 98.5, 0.8, 95.0, 100.0),
                )
            };
            LabeledSample {
                sample,
                label: Label::from_stressed(stressed),
            }
        })
        .collect()
}

/// Scaled-down hyperparameters so unit tests train in well under a second
pub(crate) fn small_training_config() -> TrainingConfig {
    TrainingConfig {
        cv_folds: 3,
        ensemble: EnsembleConfig {
            random_forest: RandomForestConfig {
                n_estimators: 25,
                max_depth: 6,
                ..Default::default()
            },
            gradient_boosting: GradientBoostingConfig {
                n_estimators: 30,
                max_depth: 3,
                ..Default::default()
            },
            mlp: MlpConfig {
                hidden_layers: vec![16, 8],
                learning_rate: 0.01,
                batch_size: 32,
                max_epochs: 200,
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Artifact trained once on 160 synthetic rows and shared across tests
pub(crate) fn trained_artifact() -> &'static Artifact {
    static ARTIFACT: OnceLock<Artifact> = OnceLock::new();
    ARTIFACT.get_or_init(|| {
        let (artifact, _) = train(&synthetic_dataset(160, 42), &small_training_config())
            .expect("synthetic dataset trains");
        artifact
    })
}
