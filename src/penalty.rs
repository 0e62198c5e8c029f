//! # Regularization Penalties
//!
//! Penalties act on the interaction entries of `theta` and, for the omega
//! variant, on the observation-rate effects. Baseline rates (the diagonal)
//! are never penalized. Absolute values are smoothed as `sqrt(v^2 + eps)`
//! so the training objective stays differentiable for BFGS.

use ndarray::{Array1, Array2};

/// Smoothing constant for the non-differentiable penalties.
const SMOOTHING: f64 = 1e-10;

fn smooth_abs(v: f64) -> f64 {
    (v * v + SMOOTHING).sqrt()
}

/// The penalty kinds an optimizer can be configured with. The reproduction
/// driver only exercises [`Penalty::SymSparse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Penalty {
    /// Elementwise sparsity on every interaction entry.
    L1,
    /// Squared-norm shrinkage on every interaction entry.
    L2,
    /// Joint sparsity over symmetric interaction pairs, so an influence and
    /// its reverse direction enter and leave the model together.
    SymSparse,
}

impl Penalty {
    /// Penalty value at the given parameters.
    pub fn value(&self, theta: &Array2<f64>, omega: Option<&Array1<f64>>) -> f64 {
        let mut total = match self {
            Penalty::L1 => theta
                .indexed_iter()
                .filter(|((i, j), _)| i != j)
                .map(|(_, &v)| smooth_abs(v))
                .sum(),
            Penalty::L2 => theta
                .indexed_iter()
                .filter(|((i, j), _)| i != j)
                .map(|(_, &v)| v * v)
                .sum(),
            Penalty::SymSparse => {
                let n = theta.nrows();
                let mut acc = 0.0;
                for i in 0..n {
                    for j in (i + 1)..n {
                        let forward = theta[[i, j]];
                        let reverse = theta[[j, i]];
                        acc += (forward * forward + reverse * reverse + SMOOTHING).sqrt();
                    }
                }
                acc
            }
        };
        if let Some(effects) = omega {
            total += match self {
                Penalty::L2 => effects.iter().map(|&v| v * v).sum::<f64>(),
                Penalty::L1 | Penalty::SymSparse => {
                    effects.iter().map(|&v| smooth_abs(v)).sum::<f64>()
                }
            };
        }
        total
    }

    /// Gradient of the penalty, in the same shapes as the parameters.
    pub fn gradient(
        &self,
        theta: &Array2<f64>,
        omega: Option<&Array1<f64>>,
    ) -> (Array2<f64>, Option<Array1<f64>>) {
        let n = theta.nrows();
        let mut grad_theta = Array2::zeros((n, n));
        match self {
            Penalty::L1 => {
                for ((i, j), &v) in theta.indexed_iter() {
                    if i != j {
                        grad_theta[[i, j]] = v / smooth_abs(v);
                    }
                }
            }
            Penalty::L2 => {
                for ((i, j), &v) in theta.indexed_iter() {
                    if i != j {
                        grad_theta[[i, j]] = 2.0 * v;
                    }
                }
            }
            Penalty::SymSparse => {
                for i in 0..n {
                    for j in (i + 1)..n {
                        let forward = theta[[i, j]];
                        let reverse = theta[[j, i]];
                        let norm = (forward * forward + reverse * reverse + SMOOTHING).sqrt();
                        grad_theta[[i, j]] = forward / norm;
                        grad_theta[[j, i]] = reverse / norm;
                    }
                }
            }
        }
        let grad_omega = omega.map(|effects| match self {
            Penalty::L2 => effects.mapv(|v| 2.0 * v),
            Penalty::L1 | Penalty::SymSparse => effects.mapv(|v| v / smooth_abs(v)),
        });
        (grad_theta, grad_omega)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn check_gradient(penalty: Penalty) {
        let mut rng = StdRng::seed_from_u64(17);
        let n = 4;
        let theta = Array2::from_shape_fn((n, n), |_| rng.gen_range(-1.0..1.0));
        let omega = Array1::from_shape_fn(n, |_| rng.gen_range(-1.0..1.0));
        let h = 1e-6;

        let (grad_theta, grad_omega) = penalty.gradient(&theta, Some(&omega));
        let grad_omega = grad_omega.unwrap();

        for i in 0..n {
            for j in 0..n {
                let mut plus = theta.clone();
                plus[[i, j]] += h;
                let mut minus = theta.clone();
                minus[[i, j]] -= h;
                let numeric = (penalty.value(&plus, Some(&omega))
                    - penalty.value(&minus, Some(&omega)))
                    / (2.0 * h);
                assert_relative_eq!(
                    grad_theta[[i, j]],
                    numeric,
                    epsilon = 1e-7,
                    max_relative = 1e-5
                );
            }
        }
        for j in 0..n {
            let mut plus = omega.clone();
            plus[j] += h;
            let mut minus = omega.clone();
            minus[j] -= h;
            let numeric = (penalty.value(&theta, Some(&plus))
                - penalty.value(&theta, Some(&minus)))
                / (2.0 * h);
            assert_relative_eq!(grad_omega[j], numeric, epsilon = 1e-7, max_relative = 1e-5);
        }
    }

    #[test]
    fn l1_gradient_matches_finite_differences() {
        check_gradient(Penalty::L1);
    }

    #[test]
    fn l2_gradient_matches_finite_differences() {
        check_gradient(Penalty::L2);
    }

    #[test]
    fn sym_sparse_gradient_matches_finite_differences() {
        check_gradient(Penalty::SymSparse);
    }

    #[test]
    fn diagonal_is_never_penalized() {
        let mut theta = Array2::zeros((3, 3));
        theta[[0, 0]] = 5.0;
        theta[[1, 1]] = -3.0;
        theta[[2, 2]] = 2.0;
        for penalty in [Penalty::L1, Penalty::L2, Penalty::SymSparse] {
            assert!(penalty.value(&theta, None) < 1e-4);
            let (grad, _) = penalty.gradient(&theta, None);
            for i in 0..3 {
                assert_eq!(grad[[i, i]], 0.0);
            }
        }
    }

    #[test]
    fn sym_sparse_couples_symmetric_pairs() {
        let mut theta = Array2::zeros((2, 2));
        theta[[0, 1]] = 3.0;
        theta[[1, 0]] = 4.0;
        let value = Penalty::SymSparse.value(&theta, None);
        assert_relative_eq!(value, 5.0, max_relative = 1e-6);
    }
}
