//! Train on a generated dataset and classify the two reference readings

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stress_ensemble::{infer, train, Label, LabeledSample, TrainingConfig, VitalSample};

fn jitter(rng: &mut StdRng, mean: f64, spread: f64) -> f64 {
    mean + rng.gen_range(-spread..spread)
}

fn main() {
    let mut rng = StdRng::seed_from_u64(7);
    let dataset: Vec<LabeledSample> = (0..400)
        .map(|i| {
            let stressed = i % 2 == 0;
            let sample = if stressed {
                VitalSample::new(
                    jitter(&mut rng, 30.0, 12.0),
                    jitter(&mut rng, 102.0, 15.0),
                    jitter(&mut rng, 142.0, 15.0),
                    jitter(&mut rng, 91.0, 8.0),
                    jitter(&mut rng, 96.0, 2.0),
                )
            } else {
                VitalSample::new(
                    jitter(&mut rng, 66.0, 15.0),
                    jitter(&mut rng, 70.0, 12.0),
                    jitter(&mut rng, 117.0, 12.0),
                    jitter(&mut rng, 77.0, 8.0),
                    jitter(&mut rng, 98.5, 1.4),
                )
            };
            LabeledSample {
                sample,
                label: Label::from_stressed(stressed),
            }
        })
        .collect();

    let (artifact, report) = match train(&dataset, &TrainingConfig::default()) {
        Ok(trained) => trained,
        Err(e) => {
            eprintln!("Error: {e}");
            return;
        }
    };

    println!("accuracy {:.4}, auc {:?}", report.accuracy, report.auc);
    println!("selected: {}", artifact.features().names().join(", "));

    for sample in [
        VitalSample::new(25.0, 110.0, 150.0, 95.0, 96.0),
        VitalSample::new(65.0, 72.0, 120.0, 80.0, 99.0),
    ] {
        match infer(&artifact, &sample) {
            Ok(result) => println!("{sample:?} -> {} ({:.3})", result.label, result.probability),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
}
