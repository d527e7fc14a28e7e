//! Kernel support vector classifier with Platt-scaled probabilities
//!
//! The dual is solved with SMO using maximal-violating-pair working set
//! selection. Kernel rows are computed on demand, so memory stays linear in
//! the number of training rows.

use crate::error::{Result, StressError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Kernel as configured; `gamma: None` means `1 / n_features`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelConfig {
    Rbf { gamma: Option<f64> },
    Linear,
}

/// Kernel with every parameter resolved
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Kernel {
    Rbf { gamma: f64 },
    Linear,
}

impl Kernel {
    pub fn eval(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Kernel::Linear => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Kernel::Rbf { gamma } => {
                let dist: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
                (-gamma * dist).exp()
            }
        }
    }
}

/// Configuration for one SVM member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmConfig {
    pub kernel: KernelConfig,
    /// Box constraint
    pub c: f64,
    /// KKT violation tolerance
    pub tol: f64,
    pub max_iter: usize,
}

impl SvmConfig {
    pub fn rbf() -> Self {
        Self {
            kernel: KernelConfig::Rbf { gamma: None },
            c: 10.0,
            tol: 1e-3,
            max_iter: 1_000_000,
        }
    }

    pub fn linear() -> Self {
        Self {
            kernel: KernelConfig::Linear,
            c: 1.0,
            tol: 1e-3,
            max_iter: 1_000_000,
        }
    }
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self::rbf()
    }
}

/// Sigmoid mapping decision values to probabilities: `1 / (1 + exp(a*f + b))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattScaling {
    pub a: f64,
    pub b: f64,
}

impl PlattScaling {
    /// Fit on decision values and 0/1 targets (Lin, Lin & Weng's Newton method)
    pub fn fit(decisions: &[f64], targets: &[f64]) -> Self {
        const MAX_ITER: usize = 100;
        const MIN_STEP: f64 = 1e-10;
        const SIGMA: f64 = 1e-12;
        const EPS: f64 = 1e-5;

        let prior1 = targets.iter().filter(|&&y| y > 0.5).count() as f64;
        let prior0 = targets.len() as f64 - prior1;
        let hi = (prior1 + 1.0) / (prior1 + 2.0);
        let lo = 1.0 / (prior0 + 2.0);
        let t: Vec<f64> = targets.iter().map(|&y| if y > 0.5 { hi } else { lo }).collect();

        let objective = |a: f64, b: f64| -> f64 {
            decisions
                .iter()
                .zip(&t)
                .map(|(f, ti)| {
                    let fapb = f * a + b;
                    if fapb >= 0.0 {
                        ti * fapb + (-fapb).exp().ln_1p()
                    } else {
                        (ti - 1.0) * fapb + fapb.exp().ln_1p()
                    }
                })
                .sum()
        };

        let mut a = 0.0;
        let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
        let mut fval = objective(a, b);

        for _ in 0..MAX_ITER {
            let (mut h11, mut h22, mut h21, mut g1, mut g2) = (SIGMA, SIGMA, 0.0, 0.0, 0.0);
            for (f, ti) in decisions.iter().zip(&t) {
                let fapb = f * a + b;
                let (p, q) = if fapb >= 0.0 {
                    let e = (-fapb).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = fapb.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = ti - p;
                g1 += f * d1;
                g2 += d1;
            }
            if g1.abs() < EPS && g2.abs() < EPS {
                break;
            }

            let det = h11 * h22 - h21 * h21;
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;

            let mut step = 1.0;
            while step >= MIN_STEP {
                let (na, nb) = (a + step * da, b + step * db);
                let nf = objective(na, nb);
                if nf < fval + 1e-4 * step * gd {
                    a = na;
                    b = nb;
                    fval = nf;
                    break;
                }
                step /= 2.0;
            }
            if step < MIN_STEP {
                debug!("platt line search did not converge");
                break;
            }
        }

        Self { a, b }
    }

    pub fn probability(&self, decision: f64) -> f64 {
        let fapb = decision * self.a + self.b;
        if fapb >= 0.0 {
            let e = (-fapb).exp();
            e / (1.0 + e)
        } else {
            1.0 / (1.0 + fapb.exp())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportVectorMachine {
    n_features: usize,
    kernel: Kernel,
    support_vectors: Vec<Vec<f64>>,
    /// `alpha_i * y_i` per support vector
    dual_coef: Vec<f64>,
    rho: f64,
    platt: PlattScaling,
}

impl SupportVectorMachine {
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], config: &SvmConfig) -> Result<Self> {
        if !config.c.is_finite() || config.c <= 0.0 {
            return Err(StressError::Validation(format!(
                "svm C must be positive, got {}",
                config.c
            )));
        }
        let n_features = rows.first().map_or(0, Vec::len);
        let kernel = match config.kernel {
            KernelConfig::Linear => Kernel::Linear,
            KernelConfig::Rbf { gamma } => Kernel::Rbf {
                gamma: gamma.unwrap_or(1.0 / n_features.max(1) as f64),
            },
        };
        let y: Vec<f64> = targets.iter().map(|&t| if t > 0.5 { 1.0 } else { -1.0 }).collect();

        let solution = solve_smo(rows, &y, kernel, config);

        let mut support_vectors = Vec::new();
        let mut dual_coef = Vec::new();
        for (i, &alpha) in solution.alpha.iter().enumerate() {
            if alpha > 0.0 {
                support_vectors.push(rows[i].clone());
                dual_coef.push(alpha * y[i]);
            }
        }

        let mut model = Self {
            n_features,
            kernel,
            support_vectors,
            dual_coef,
            rho: solution.rho,
            platt: PlattScaling { a: -1.0, b: 0.0 },
        };

        let decisions: Vec<f64> = rows.iter().map(|r| model.decision_function(r)).collect();
        model.platt = PlattScaling::fit(&decisions, targets);

        debug!(
            support_vectors = model.support_vectors.len(),
            iterations = solution.iterations,
            "svm fitted"
        );
        Ok(model)
    }

    /// Signed margin; positive means stressed
    pub fn decision_function(&self, row: &[f64]) -> f64 {
        self.support_vectors
            .iter()
            .zip(&self.dual_coef)
            .map(|(sv, coef)| coef * self.kernel.eval(sv, row))
            .sum::<f64>()
            - self.rho
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        self.platt.probability(self.decision_function(row))
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    pub fn n_support(&self) -> usize {
        self.support_vectors.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.dual_coef.len() != self.support_vectors.len() {
            return Err(StressError::ArtifactMismatch(format!(
                "svm has {} coefficients for {} support vectors",
                self.dual_coef.len(),
                self.support_vectors.len()
            )));
        }
        if let Some(sv) = self.support_vectors.iter().find(|sv| sv.len() != self.n_features) {
            return Err(StressError::ArtifactMismatch(format!(
                "svm support vector has {} values, expected {}",
                sv.len(),
                self.n_features
            )));
        }
        Ok(())
    }
}

struct SmoSolution {
    alpha: Vec<f64>,
    rho: f64,
    iterations: usize,
}

/// Minimize `1/2 a'Qa - e'a` s.t. `0 <= a <= C`, `y'a = 0`
fn solve_smo(rows: &[Vec<f64>], y: &[f64], kernel: Kernel, config: &SvmConfig) -> SmoSolution {
    const TAU: f64 = 1e-12;
    let n = rows.len();
    let c = config.c;

    let q_row = |i: usize| -> Vec<f64> {
        (0..n)
            .map(|k| y[i] * y[k] * kernel.eval(&rows[i], &rows[k]))
            .collect()
    };
    let diag: Vec<f64> = rows.iter().map(|r| kernel.eval(r, r)).collect();

    let mut alpha = vec![0.0; n];
    let mut grad = vec![-1.0; n];
    let at_upper = |a: f64| a >= c;
    let at_lower = |a: f64| a <= 0.0;

    let mut iterations = 0;
    while iterations < config.max_iter {
        // i maximizes -y_t G_t over I_up, j maximizes y_t G_t over I_low
        let mut g_max = f64::NEG_INFINITY;
        let mut g_max2 = f64::NEG_INFINITY;
        let mut i_sel = None;
        let mut j_sel = None;
        for t in 0..n {
            if y[t] > 0.0 {
                if !at_upper(alpha[t]) && -grad[t] >= g_max {
                    g_max = -grad[t];
                    i_sel = Some(t);
                }
                if !at_lower(alpha[t]) && grad[t] >= g_max2 {
                    g_max2 = grad[t];
                    j_sel = Some(t);
                }
            } else {
                if !at_lower(alpha[t]) && grad[t] >= g_max {
                    g_max = grad[t];
                    i_sel = Some(t);
                }
                if !at_upper(alpha[t]) && -grad[t] >= g_max2 {
                    g_max2 = -grad[t];
                    j_sel = Some(t);
                }
            }
        }

        let (Some(i), Some(j)) = (i_sel, j_sel) else {
            break;
        };
        if g_max + g_max2 < config.tol {
            break;
        }
        iterations += 1;

        let qi = q_row(i);
        let qj = q_row(j);
        let (old_ai, old_aj) = (alpha[i], alpha[j]);

        if y[i] != y[j] {
            let quad = (diag[i] + diag[j] + 2.0 * qi[j]).max(TAU);
            let delta = (-grad[i] - grad[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;
            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > 0.0 {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = c - diff;
                }
            } else if alpha[j] > c {
                alpha[j] = c;
                alpha[i] = c + diff;
            }
        } else {
            let quad = (diag[i] + diag[j] - 2.0 * qi[j]).max(TAU);
            let delta = (grad[i] - grad[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;
            if sum > c {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = sum - c;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > c {
                if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = sum - c;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }

        let (dai, daj) = (alpha[i] - old_ai, alpha[j] - old_aj);
        for k in 0..n {
            grad[k] += qi[k] * dai + qj[k] * daj;
        }
    }

    if iterations >= config.max_iter {
        warn!(max_iter = config.max_iter, "svm solver hit the iteration limit");
    }

    SmoSolution {
        rho: compute_rho(&alpha, &grad, y, c),
        alpha,
        iterations,
    }
}

fn compute_rho(alpha: &[f64], grad: &[f64], y: &[f64], c: f64) -> f64 {
    let mut upper = f64::INFINITY;
    let mut lower = f64::NEG_INFINITY;
    let mut free_sum = 0.0;
    let mut free_count = 0usize;

    for t in 0..alpha.len() {
        let yg = y[t] * grad[t];
        if alpha[t] >= c {
            if y[t] < 0.0 {
                upper = upper.min(yg);
            } else {
                lower = lower.max(yg);
            }
        } else if alpha[t] <= 0.0 {
            if y[t] > 0.0 {
                upper = upper.min(yg);
            } else {
                lower = lower.max(yg);
            }
        } else {
            free_sum += yg;
            free_count += 1;
        }
    }

    if free_count > 0 {
        free_sum / free_count as f64
    } else {
        (upper + lower) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for i in 0..20 {
            let jitter = (i % 5) as f64 * 0.1;
            rows.push(vec![-1.5 + jitter, -1.0 + jitter]);
            targets.push(0.0);
            rows.push(vec![1.5 - jitter, 1.0 - jitter]);
            targets.push(1.0);
        }
        (rows, targets)
    }

    #[test]
    fn test_linear_svm_separates() {
        let (rows, targets) = two_blobs();
        let svm = SupportVectorMachine::fit(&rows, &targets, &SvmConfig::linear()).unwrap();

        assert!(svm.decision_function(&[2.0, 2.0]) > 0.0);
        assert!(svm.decision_function(&[-2.0, -2.0]) < 0.0);
        assert!(svm.predict_proba(&[2.0, 2.0]) > 0.5);
        assert!(svm.predict_proba(&[-2.0, -2.0]) < 0.5);
        assert!(svm.n_support() > 0);
    }

    #[test]
    fn test_rbf_svm_separates() {
        let (rows, targets) = two_blobs();
        let svm = SupportVectorMachine::fit(&rows, &targets, &SvmConfig::rbf()).unwrap();

        assert_eq!(svm.kernel(), Kernel::Rbf { gamma: 0.5 });
        assert!(svm.predict_proba(&[1.4, 0.9]) > 0.5);
        assert!(svm.predict_proba(&[-1.4, -0.9]) < 0.5);
    }

    #[test]
    fn test_rbf_kernel_values() {
        let kernel = Kernel::Rbf { gamma: 0.5 };
        assert_eq!(kernel.eval(&[1.0, 2.0], &[1.0, 2.0]), 1.0);
        assert!((kernel.eval(&[0.0], &[2.0]) - (-2.0_f64).exp()).abs() < 1e-12);
        assert_eq!(Kernel::Linear.eval(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
    }

    #[test]
    fn test_platt_is_monotone_increasing() {
        let decisions = vec![-2.0, -1.5, -1.0, -0.2, 0.3, 1.0, 1.6, 2.2];
        let targets = vec![0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0];
        let platt = PlattScaling::fit(&decisions, &targets);

        assert!(platt.a < 0.0);
        assert!(platt.probability(2.0) > platt.probability(0.0));
        assert!(platt.probability(0.0) > platt.probability(-2.0));
    }

    #[test]
    fn test_rejects_non_positive_c() {
        let (rows, targets) = two_blobs();
        let config = SvmConfig {
            c: 0.0,
            ..SvmConfig::linear()
        };
        assert!(SupportVectorMachine::fit(&rows, &targets, &config).is_err());
    }
}
