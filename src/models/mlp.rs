//! Multilayer perceptron: ReLU hidden layers, sigmoid output, Adam

use super::boosting::sigmoid;
use crate::error::{Result, StressError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for the neural network member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpConfig {
    pub hidden_layers: Vec<usize>,
    /// L2 penalty
    pub alpha: f64,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub max_epochs: usize,
    /// Minimum loss improvement that resets the patience counter
    pub tol: f64,
    /// Epochs without improvement before stopping
    pub n_iter_no_change: usize,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![150, 75, 30],
            alpha: 0.001,
            learning_rate: 0.001,
            batch_size: 200,
            max_epochs: 1000,
            tol: 1e-4,
            n_iter_no_change: 10,
        }
    }
}

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DenseLayer {
    /// Row-major `[out][in]`
    weights: Vec<Vec<f64>>,
    biases: Vec<f64>,
}

impl DenseLayer {
    fn init(fan_in: usize, fan_out: usize, factor: f64, rng: &mut StdRng) -> Self {
        let bound = (factor / (fan_in + fan_out) as f64).sqrt();
        let weights = (0..fan_out)
            .map(|_| (0..fan_in).map(|_| rng.gen_range(-bound..bound)).collect())
            .collect();
        let biases = (0..fan_out).map(|_| rng.gen_range(-bound..bound)).collect();
        Self { weights, biases }
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.biases)
            .map(|(w, b)| w.iter().zip(input).map(|(wi, xi)| wi * xi).sum::<f64>() + b)
            .collect()
    }

    fn zeros_like(&self) -> DenseLayer {
        DenseLayer {
            weights: self.weights.iter().map(|r| vec![0.0; r.len()]).collect(),
            biases: vec![0.0; self.biases.len()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    n_features: usize,
    layers: Vec<DenseLayer>,
    epochs_run: usize,
}

impl Mlp {
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], config: &MlpConfig, seed: u64) -> Result<Self> {
        if config.batch_size == 0 || config.learning_rate <= 0.0 {
            return Err(StressError::Validation(
                "mlp needs a positive batch size and learning rate".to_string(),
            ));
        }
        let n = rows.len();
        let n_features = rows.first().map_or(0, Vec::len);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut sizes = vec![n_features];
        sizes.extend(config.hidden_layers.iter().copied());
        sizes.push(1);

        let last = sizes.len() - 2;
        let mut layers: Vec<DenseLayer> = sizes
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let factor = if i == last { 2.0 } else { 6.0 };
                DenseLayer::init(w[0], w[1], factor, &mut rng)
            })
            .collect();

        let mut first_moment: Vec<DenseLayer> = layers.iter().map(DenseLayer::zeros_like).collect();
        let mut second_moment: Vec<DenseLayer> = layers.iter().map(DenseLayer::zeros_like).collect();
        let mut step = 0usize;

        let batch_size = config.batch_size.min(n).max(1);
        let mut order: Vec<usize> = (0..n).collect();
        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0usize;
        let mut epochs_run = 0usize;

        for epoch in 0..config.max_epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                let (grads, loss) = batch_gradients(&layers, rows, targets, batch, config.alpha);
                epoch_loss += loss * batch.len() as f64;

                step += 1;
                let correction1 = 1.0 - BETA1.powi(step as i32);
                let correction2 = 1.0 - BETA2.powi(step as i32);
                let lr = config.learning_rate * correction2.sqrt() / correction1;

                for ((layer, grad), (m, v)) in layers
                    .iter_mut()
                    .zip(&grads)
                    .zip(first_moment.iter_mut().zip(second_moment.iter_mut()))
                {
                    for (o, grad_row) in grad.weights.iter().enumerate() {
                        for (i, g) in grad_row.iter().enumerate() {
                            adam_update(&mut layer.weights[o][i], &mut m.weights[o][i], &mut v.weights[o][i], *g, lr);
                        }
                    }
                    for (o, g) in grad.biases.iter().enumerate() {
                        adam_update(&mut layer.biases[o], &mut m.biases[o], &mut v.biases[o], *g, lr);
                    }
                }
            }

            epochs_run = epoch + 1;
            let loss = epoch_loss / n as f64;
            if !loss.is_finite() {
                return Err(StressError::NumericDomain(format!(
                    "mlp loss diverged at epoch {epochs_run}"
                )));
            }

            if loss > best_loss - config.tol {
                no_improvement += 1;
            } else {
                no_improvement = 0;
            }
            best_loss = best_loss.min(loss);

            if no_improvement > config.n_iter_no_change {
                debug!(epochs = epochs_run, loss, "mlp converged");
                break;
            }
        }

        Ok(Self {
            n_features,
            layers,
            epochs_run,
        })
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let activations = forward(&self.layers, row);
        sigmoid(activations[activations.len() - 1][0])
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn epochs_run(&self) -> usize {
        self.epochs_run
    }

    /// Layer shapes must chain from `n_features` inputs to one output
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(StressError::ArtifactMismatch("mlp has no layers".to_string()));
        }
        let mut fan_in = self.n_features;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.weights.is_empty() || layer.weights.len() != layer.biases.len() {
                return Err(StressError::ArtifactMismatch(format!(
                    "mlp layer {i} has {} weight rows and {} biases",
                    layer.weights.len(),
                    layer.biases.len()
                )));
            }
            if let Some(row) = layer.weights.iter().find(|r| r.len() != fan_in) {
                return Err(StressError::ArtifactMismatch(format!(
                    "mlp layer {i} expects {fan_in} inputs but a row has {}",
                    row.len()
                )));
            }
            fan_in = layer.weights.len();
        }
        if fan_in != 1 {
            return Err(StressError::ArtifactMismatch(format!(
                "mlp output layer has {fan_in} units, expected 1"
            )));
        }
        Ok(())
    }
}

fn adam_update(param: &mut f64, m: &mut f64, v: &mut f64, grad: f64, lr: f64) {
    *m = BETA1 * *m + (1.0 - BETA1) * grad;
    *v = BETA2 * *v + (1.0 - BETA2) * grad * grad;
    *param -= lr * *m / (v.sqrt() + ADAM_EPSILON);
}

/// Layer outputs; index 0 is the input, the last entry holds the output logit
fn forward(layers: &[DenseLayer], input: &[f64]) -> Vec<Vec<f64>> {
    let mut activations = Vec::with_capacity(layers.len() + 1);
    activations.push(input.to_vec());
    for (i, layer) in layers.iter().enumerate() {
        let mut out = layer.forward(&activations[i]);
        if i + 1 < layers.len() {
            out.iter_mut().for_each(|x| *x = x.max(0.0));
        }
        activations.push(out);
    }
    activations
}

/// Mean log-loss (+ L2) gradients over one minibatch
fn batch_gradients(
    layers: &[DenseLayer],
    rows: &[Vec<f64>],
    targets: &[f64],
    batch: &[usize],
    alpha: f64,
) -> (Vec<DenseLayer>, f64) {
    let mut grads: Vec<DenseLayer> = layers.iter().map(DenseLayer::zeros_like).collect();
    let mut loss = 0.0;

    for &idx in batch {
        let activations = forward(layers, &rows[idx]);
        let p = sigmoid(activations[layers.len()][0]).clamp(1e-15, 1.0 - 1e-15);
        let y = targets[idx];
        loss -= y * p.ln() + (1.0 - y) * (1.0 - p).ln();

        let mut delta = vec![p - y];
        for l in (0..layers.len()).rev() {
            let input = &activations[l];
            for (o, d) in delta.iter().enumerate() {
                grads[l].biases[o] += d;
                for (g, x) in grads[l].weights[o].iter_mut().zip(input) {
                    *g += d * x;
                }
            }
            if l > 0 {
                let mut prev = vec![0.0; input.len()];
                for (o, d) in delta.iter().enumerate() {
                    for (acc, w) in prev.iter_mut().zip(&layers[l].weights[o]) {
                        *acc += d * w;
                    }
                }
                // ReLU derivative
                for (acc, a) in prev.iter_mut().zip(input) {
                    if *a <= 0.0 {
                        *acc = 0.0;
                    }
                }
                delta = prev;
            }
        }
    }

    let b = batch.len() as f64;
    let mut penalty = 0.0;
    for (grad, layer) in grads.iter_mut().zip(layers) {
        for (grad_row, w_row) in grad.weights.iter_mut().zip(&layer.weights) {
            for (g, w) in grad_row.iter_mut().zip(w_row) {
                *g = (*g + alpha * w) / b;
                penalty += w * w;
            }
        }
        grad.biases.iter_mut().for_each(|g| *g /= b);
    }

    (grads, loss / b + 0.5 * alpha * penalty / b)
}
