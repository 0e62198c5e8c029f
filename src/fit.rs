//! # Model Training via Penalized Maximum Likelihood
//!
//! Training follows a builder-then-call shape: an immutable [`FitConfig`]
//! is assembled first (penalty kind, regularization strength, optimizer
//! budget) and then passed by value into the pure [`train`] function
//! together with the data. Configuration cannot change mid-fit, so the
//! "penalty before lambda before training" ordering is structural rather
//! than a call-sequence obligation on the caller.
//!
//! The objective is the penalized mean negative log-likelihood, minimized
//! with the `wolfe_bfgs` BFGS implementation through a cost-and-gradient
//! closure. Initialization is deterministic: diagonal entries start at the
//! logit of the clamped marginal event frequencies (the exact solution for
//! a network without interactions), everything else at zero.

use crate::data::MutationData;
use crate::model::{MhnModel, ModelKind};
use crate::penalty::Penalty;
use crate::statespace;
use ndarray::{Array1, Array2};
use thiserror::Error;
use wolfe_bfgs::{Bfgs, BfgsSolution};

/// A comprehensive error type for the training process.
#[derive(Error, Debug)]
pub enum FitError {
    #[error("the initial objective is not finite ({0}); the data may be degenerate")]
    NonFiniteInitialCost(f64),
    #[error("BFGS optimization failed to converge: {0}")]
    OptimizationFailed(String),
}

/// Immutable training configuration, assembled via the `with_*` builders.
#[derive(Debug, Clone)]
pub struct FitConfig {
    penalty: Penalty,
    lambda: f64,
    max_iterations: usize,
    tolerance: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            penalty: Penalty::SymSparse,
            lambda: 0.0,
            max_iterations: 500,
            tolerance: 1e-6,
        }
    }
}

impl FitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_penalty(mut self, penalty: Penalty) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda.max(0.0);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn penalty(&self) -> Penalty {
        self.penalty
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }
}

/// Flattens parameters into the BFGS search space: `theta` row-major,
/// followed by the omega effects when present.
fn pack(theta: &Array2<f64>, omega: Option<&Array1<f64>>) -> Array1<f64> {
    let mut flat: Vec<f64> = theta.iter().copied().collect();
    if let Some(effects) = omega {
        flat.extend(effects.iter().copied());
    }
    Array1::from(flat)
}

fn unpack(point: &Array1<f64>, n: usize, has_omega: bool) -> (Array2<f64>, Option<Array1<f64>>) {
    let theta = Array2::from_shape_fn((n, n), |(i, j)| point[i * n + j]);
    let omega = has_omega.then(|| Array1::from_shape_fn(n, |j| point[n * n + j]));
    (theta, omega)
}

/// Deterministic starting point: the independence model on the diagonal.
fn initial_point(kind: ModelKind, data: &MutationData) -> Array1<f64> {
    let n = data.n_events();
    // An event seen in every sample (or none) would put the logit at
    // infinity; half a pseudo-count keeps the start finite.
    let clamp = 1.0 / (2.0 * data.n_samples() as f64);
    let mut theta = Array2::zeros((n, n));
    for (i, &freq) in data.frequencies().iter().enumerate() {
        let freq = freq.clamp(clamp, 1.0 - clamp);
        theta[[i, i]] = (freq / (1.0 - freq)).ln();
    }
    let omega = matches!(kind, ModelKind::Omega).then(|| Array1::zeros(n));
    pack(&theta, omega.as_ref())
}

/// The main entry point for model training. Fits a network of the given
/// kind to the cohort under the configured penalty and strength.
pub fn train(
    config: &FitConfig,
    kind: ModelKind,
    data: &MutationData,
) -> Result<MhnModel, FitError> {
    let n = data.n_events();
    let has_omega = matches!(kind, ModelKind::Omega);
    let weighted = data.unique_weighted();
    let total_weight = data.n_samples() as f64;
    log::info!(
        "training {} on {} samples ({} unique genotypes, {} events, lambda {:.3e})",
        kind,
        data.n_samples(),
        weighted.len(),
        n,
        config.lambda
    );

    let initial = initial_point(kind, data);
    let (theta0, omega0) = unpack(&initial, n, has_omega);
    let initial_cost = -statespace::data_log_likelihood(&theta0, omega0.as_ref(), &weighted)
        / total_weight
        + config.lambda * config.penalty.value(&theta0, omega0.as_ref());
    if !initial_cost.is_finite() {
        return Err(FitError::NonFiniteInitialCost(initial_cost));
    }
    log::debug!("initial cost: {initial_cost:.6}");

    let cfg = config.clone();
    let cost_and_grad = move |point: &Array1<f64>| -> (f64, Array1<f64>) {
        let (theta, omega) = unpack(point, n, has_omega);
        let (ll, grad_ll_theta, grad_ll_omega) =
            statespace::data_log_likelihood_with_grad(&theta, omega.as_ref(), &weighted);
        let cost = -ll / total_weight + cfg.lambda * cfg.penalty.value(&theta, omega.as_ref());
        if !cost.is_finite() {
            log::warn!("non-finite training cost encountered, returning large finite value");
            return (1e10, Array1::zeros(point.len()));
        }
        let (pen_theta, pen_omega) = cfg.penalty.gradient(&theta, omega.as_ref());
        let mut grad_theta = grad_ll_theta * (-1.0 / total_weight);
        grad_theta += &(pen_theta * cfg.lambda);
        let grad_omega = match (grad_ll_omega, pen_omega) {
            (Some(g), Some(p)) => Some(g * (-1.0 / total_weight) + p * cfg.lambda),
            _ => None,
        };
        (cost, pack(&grad_theta, grad_omega.as_ref()))
    };

    let BfgsSolution {
        final_point,
        final_value,
        iterations,
        ..
    } = Bfgs::new(initial, cost_and_grad)
        .with_tolerance(config.tolerance)
        .with_max_iterations(config.max_iterations)
        .run()
        .map_err(|e| FitError::OptimizationFailed(format!("{e:?}")))?;
    log::info!("{kind} training finished in {iterations} iterations (objective {final_value:.6})");

    let (theta, omega) = unpack(&final_point, n, has_omega);
    Ok(MhnModel::new(kind, data.event_names().to_vec(), theta, omega))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MutationData;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("GENE{i}")).collect()
    }

    fn small_cohort() -> MutationData {
        let genotypes = vec![
            0b000, 0b000, 0b001, 0b001, 0b001, 0b011, 0b011, 0b010, 0b100, 0b101, 0b111, 0b000,
            0b001, 0b011, 0b100, 0b000,
        ];
        MutationData::new(names(3), genotypes).unwrap()
    }

    fn quick_config() -> FitConfig {
        FitConfig::new()
            .with_penalty(Penalty::SymSparse)
            .with_lambda(1e-2)
            .with_max_iterations(200)
            .with_tolerance(1e-4)
    }

    #[test]
    fn builder_assembles_configuration() {
        let config = FitConfig::new()
            .with_penalty(Penalty::L1)
            .with_lambda(0.05)
            .with_max_iterations(10)
            .with_tolerance(1e-3);
        assert_eq!(config.penalty(), Penalty::L1);
        assert_eq!(config.lambda(), 0.05);
    }

    #[test]
    fn negative_lambda_is_clamped() {
        let config = FitConfig::new().with_lambda(-1.0);
        assert_eq!(config.lambda(), 0.0);
    }

    #[test]
    fn classical_fit_beats_the_null_model() {
        let data = small_cohort();
        let config = quick_config().with_lambda(0.0);
        let model = train(&config, ModelKind::Classical, &data).unwrap();
        assert_eq!(model.kind(), ModelKind::Classical);
        assert!(model.omega().is_none());

        let null = MhnModel::new(
            ModelKind::Classical,
            names(3),
            ndarray::Array2::zeros((3, 3)),
            None,
        );
        let fitted_ll = model.log_likelihood(&data).unwrap();
        let null_ll = null.log_likelihood(&data).unwrap();
        assert!(fitted_ll.is_finite());
        assert!(fitted_ll > null_ll);
    }

    #[test]
    fn omega_fit_learns_observation_effects() {
        let data = small_cohort();
        let model = train(&quick_config(), ModelKind::Omega, &data).unwrap();
        assert_eq!(model.kind(), ModelKind::Omega);
        let omega = model.omega().unwrap();
        assert_eq!(omega.len(), 3);
        assert!(omega.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn training_is_deterministic() {
        let data = small_cohort();
        let config = quick_config();
        let first = train(&config, ModelKind::Omega, &data).unwrap();
        let second = train(&config, ModelKind::Omega, &data).unwrap();
        for (a, b) in first.theta().iter().zip(second.theta().iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        for (a, b) in first
            .omega()
            .unwrap()
            .iter()
            .zip(second.omega().unwrap().iter())
        {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
}
