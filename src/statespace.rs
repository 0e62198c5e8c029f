//! # State-Space Likelihood Core
//!
//! A mutual hazard network over `n` events is parameterized by a log-scale
//! matrix `theta`, where `theta[i][i]` is the baseline log-hazard of event
//! `i` and `theta[i][j]` the multiplicative influence of an already acquired
//! event `j` on event `i`. A tumor starts in the empty state, accumulates
//! events in continuous time, and is observed once. The classical variant
//! (`cMHN`) observes at unit rate in every state; the omega variant (`oMHN`)
//! additionally learns an effect vector `omega` through which each acquired
//! event scales the observation rate, with the empty-state rate fixed to 1
//! for identifiability.
//!
//! The marginal probability of an observed genotype depends only on the
//! lattice of its sub-genotypes: mass can reach a state exclusively by
//! adding events. Each sample is therefore evaluated on that sub-lattice by
//! forward substitution in increasing-submask order, and the exact gradient
//! with respect to every parameter follows from a single adjoint solve in
//! the reverse order. Both solves are linear in the lattice size `2^k`,
//! with `k` the number of mutations in the sample.
//!
//! Cohort-level quantities are weighted sums over deduplicated genotypes.
//! The sum is parallelized per genotype but reduced in index order, so
//! repeated evaluations of the same parameters produce bit-identical
//! results.

use ndarray::{Array1, Array2};
use rayon::prelude::*;

/// Hazard of `event` firing in `state`: `exp(theta[e][e] + sum theta[e][j])`
/// over the acquired events `j`. Callers only ask about events not yet in
/// the state.
fn hazard_rate(theta: &Array2<f64>, event: usize, state: u32) -> f64 {
    let mut log_rate = theta[[event, event]];
    let mut bits = state;
    while bits != 0 {
        let j = bits.trailing_zeros() as usize;
        log_rate += theta[[event, j]];
        bits &= bits - 1;
    }
    log_rate.exp()
}

/// Rate at which a tumor in `state` comes under observation.
fn observation_rate(omega: Option<&Array1<f64>>, state: u32) -> f64 {
    match omega {
        None => 1.0,
        Some(effects) => {
            let mut log_rate = 0.0;
            let mut bits = state;
            while bits != 0 {
                let j = bits.trailing_zeros() as usize;
                log_rate += effects[j];
                bits &= bits - 1;
            }
            log_rate.exp()
        }
    }
}

/// Maps a compact sub-lattice index to the full-width state mask. Bit `t`
/// of `compact` selects the `t`-th set bit of the genotype.
fn expand(compact: usize, bits: &[usize]) -> u32 {
    let mut state = 0u32;
    for (t, &b) in bits.iter().enumerate() {
        if compact & (1 << t) != 0 {
            state |= 1 << b;
        }
    }
    state
}

/// Forward substitution over the sub-lattice of `bits`. Returns the state
/// occupancies `r` and, for reuse by the adjoint solve, the per-state
/// denominator `observation + total exit rate`.
fn forward(
    theta: &Array2<f64>,
    omega: Option<&Array1<f64>>,
    bits: &[usize],
) -> (Vec<f64>, Vec<f64>) {
    let n = theta.nrows();
    let size = 1usize << bits.len();
    let mut r = vec![0.0; size];
    let mut denom = vec![0.0; size];
    for c in 0..size {
        let state = expand(c, bits);
        let mut inflow = if c == 0 { 1.0 } else { 0.0 };
        for (t, &b) in bits.iter().enumerate() {
            if c & (1 << t) != 0 {
                let pred = c & !(1 << t);
                inflow += hazard_rate(theta, b, expand(pred, bits)) * r[pred];
            }
        }
        let mut exit = 0.0;
        for event in 0..n {
            if state & (1 << event) == 0 {
                exit += hazard_rate(theta, event, state);
            }
        }
        denom[c] = observation_rate(omega, state) + exit;
        r[c] = inflow / denom[c];
    }
    (r, denom)
}

fn genotype_bits(genotype: u32, n: usize) -> Vec<usize> {
    (0..n).filter(|&b| genotype & (1 << b) != 0).collect()
}

/// Marginal log-probability of observing `genotype` under the network.
pub fn genotype_log_likelihood(
    theta: &Array2<f64>,
    omega: Option<&Array1<f64>>,
    genotype: u32,
) -> f64 {
    let bits = genotype_bits(genotype, theta.nrows());
    let (r, _) = forward(theta, omega, &bits);
    (observation_rate(omega, genotype) * r[r.len() - 1]).ln()
}

/// Log-probability of `genotype` together with its exact gradient with
/// respect to `theta` and, when present, `omega`.
pub fn genotype_log_likelihood_with_grad(
    theta: &Array2<f64>,
    omega: Option<&Array1<f64>>,
    genotype: u32,
) -> (f64, Array2<f64>, Option<Array1<f64>>) {
    let n = theta.nrows();
    let bits = genotype_bits(genotype, n);
    let size = 1usize << bits.len();
    let (r, denom) = forward(theta, omega, &bits);
    let obs_top = observation_rate(omega, genotype);
    let p = obs_top * r[size - 1];

    // Adjoint solve in reverse topological order. The right-hand side is
    // the indicator of the observed genotype scaled by its observation
    // rate, so a^T (dA) r yields the derivative of p directly.
    let mut adj = vec![0.0; size];
    adj[size - 1] = obs_top / denom[size - 1];
    for c in (0..size - 1).rev() {
        let state = expand(c, &bits);
        let mut acc = 0.0;
        for (t, &b) in bits.iter().enumerate() {
            if c & (1 << t) == 0 {
                acc += hazard_rate(theta, b, state) * adj[c | (1 << t)];
            }
        }
        adj[c] = acc / denom[c];
    }

    let mut lattice_pos = vec![usize::MAX; n];
    for (t, &b) in bits.iter().enumerate() {
        lattice_pos[b] = t;
    }

    let mut grad_theta = Array2::zeros((n, n));
    let mut grad_omega = omega.map(|_| Array1::zeros(n));
    for c in 0..size {
        let state = expand(c, &bits);
        for event in 0..n {
            if state & (1 << event) != 0 {
                continue;
            }
            let lam = hazard_rate(theta, event, state);
            // Transitions leaving the sub-lattice only contribute through
            // the exit-rate diagonal; their successor carries no adjoint.
            let succ = if genotype & (1 << event) != 0 {
                adj[c | (1 << lattice_pos[event])]
            } else {
                0.0
            };
            let coeff = lam * r[c] * (succ - adj[c]);
            grad_theta[[event, event]] += coeff;
            let mut s = state;
            while s != 0 {
                let j = s.trailing_zeros() as usize;
                grad_theta[[event, j]] += coeff;
                s &= s - 1;
            }
        }
        if let Some(go) = grad_omega.as_mut() {
            let shrink = observation_rate(omega, state) * r[c] * adj[c];
            let mut s = state;
            while s != 0 {
                let j = s.trailing_zeros() as usize;
                go[j] -= shrink;
                s &= s - 1;
            }
        }
    }
    if let Some(go) = grad_omega.as_mut() {
        // The observed state's own rate also multiplies the final marginal.
        let mut s = genotype;
        while s != 0 {
            let j = s.trailing_zeros() as usize;
            go[j] += p;
            s &= s - 1;
        }
    }

    let inv_p = 1.0 / p;
    grad_theta.mapv_inplace(|g| g * inv_p);
    if let Some(go) = grad_omega.as_mut() {
        go.mapv_inplace(|g| g * inv_p);
    }
    (p.ln(), grad_theta, grad_omega)
}

/// Weighted cohort log-likelihood over deduplicated genotypes.
pub fn data_log_likelihood(
    theta: &Array2<f64>,
    omega: Option<&Array1<f64>>,
    weighted: &[(u32, f64)],
) -> f64 {
    let terms: Vec<f64> = weighted
        .par_iter()
        .map(|&(genotype, weight)| weight * genotype_log_likelihood(theta, omega, genotype))
        .collect();
    // summed in index order so repeated runs reduce identically
    terms.into_iter().sum()
}

/// Weighted cohort log-likelihood and its gradient.
pub fn data_log_likelihood_with_grad(
    theta: &Array2<f64>,
    omega: Option<&Array1<f64>>,
    weighted: &[(u32, f64)],
) -> (f64, Array2<f64>, Option<Array1<f64>>) {
    let n = theta.nrows();
    let parts: Vec<(f64, Array2<f64>, Option<Array1<f64>>)> = weighted
        .par_iter()
        .map(|&(genotype, weight)| {
            let (ll, gt, go) = genotype_log_likelihood_with_grad(theta, omega, genotype);
            (weight * ll, gt * weight, go.map(|g| g * weight))
        })
        .collect();

    let mut total = 0.0;
    let mut grad_theta = Array2::zeros((n, n));
    let mut grad_omega = omega.map(|_| Array1::zeros(n));
    for (ll, gt, go) in parts {
        total += ll;
        grad_theta += &gt;
        if let (Some(acc), Some(g)) = (grad_omega.as_mut(), go) {
            *acc += &g;
        }
    }
    (total, grad_theta, grad_omega)
}
