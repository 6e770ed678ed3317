//! C6: the dissipative Hamiltonian Itô SDE integrator that advances the
//! reduced latent state `Z` toward the manifold-constrained invariant
//! measure, and the K-independent-walk sampler built on top of it.

use ndarray::prelude::*;
use rand_distr::{Distribution, StandardNormal};
use rand_pcg::Pcg64Mcg;
use rayon::prelude::*;

use crate::error::PlomError;
use crate::potential::{kde_log_density_gradient, KdeParams};

#[derive(Debug, Clone, Copy)]
pub struct IsdeConfig {
    pub f0: f64,
    pub dr: f64,
    pub steps: usize,
    pub kde_bw_factor: f64,
}

impl IsdeConfig {
    /// `steps = ceil(4 ln(100) / (f0 dr)) + 1`, the heuristic transient-decay
    /// time, used whenever the caller did not pin down a step count.
    pub fn heuristic_steps(f0: f64, dr: f64) -> usize {
        (4.0 * 100f64.ln() / (f0 * dr)).ceil() as usize + 1
    }
}

/// One independent sampler walk: Z and Y both (ν, m).
struct WalkState {
    z: Array2<f64>,
    y: Array2<f64>,
}

/// Advance `state` by one leapfrog step. `g` is the DMAPS reduced basis
/// (N×m), `a` is the reduction matrix (N×m), `h_tilde` the training data in
/// whitened ambient coordinates (ν×N), and `kde_params` the joint-KDE
/// bandwidth pair shared across all steps and walks.
fn step(
    state: &WalkState,
    g: ArrayView2<f64>,
    a: ArrayView2<f64>,
    h_tilde: ArrayView2<f64>,
    kde_params: KdeParams,
    config: IsdeConfig,
    rng: &mut Pcg64Mcg,
) -> Result<WalkState, PlomError> {
    let (nu, _m) = state.z.dim();
    let n = g.dim().0;
    let b = config.f0 * config.dr / 4.0;

    let z_half = &state.z + &state.y.mapv(|v| v * (config.dr / 2.0));

    // U = Z_half . gᵀ, shape (ν, N)
    let u = z_half.dot(&g.t());
    let grad = kde_log_density_gradient(h_tilde, u.view(), kde_params)?;
    let l_k = grad.dot(&a);

    let r = Array2::from_shape_fn((nu, n), |_| {
        let v: f64 = StandardNormal.sample(rng);
        v
    });
    let d_w = r.dot(&a).mapv(|v| v * config.dr.sqrt());

    let y_next = state.y.mapv(|v| v * ((1.0 - b) / (1.0 + b)))
        + l_k.mapv(|v| v * (config.dr / (1.0 + b)))
        + d_w.mapv(|v| v * (config.f0.sqrt() / (1.0 + b)));
    let z_next = &z_half + &y_next.mapv(|v| v * (config.dr / 2.0));

    Ok(WalkState { z: z_next, y: y_next })
}

fn run_walk(
    z0: ArrayView2<f64>,
    g: ArrayView2<f64>,
    a: ArrayView2<f64>,
    h_tilde: ArrayView2<f64>,
    kde_params: KdeParams,
    config: IsdeConfig,
    seed: u64,
) -> Result<Array2<f64>, PlomError> {
    let mut rng = Pcg64Mcg::new(seed as u128);
    let (nu, n) = (z0.dim().0, g.dim().0);
    let r0 = Array2::from_shape_fn((nu, n), |_| {
        let v: f64 = StandardNormal.sample(&mut rng);
        v
    });
    let mut state = WalkState {
        z: z0.to_owned(),
        y: r0.dot(&a),
    };
    for _ in 0..config.steps {
        state = step(&state, g, a, h_tilde, kde_params, config, &mut rng)?;
    }
    Ok(state.z)
}

/// Run `k` independent walks from the same `z0`, returning their final
/// latent states stacked as a `Vec`, in deterministic walk order regardless
/// of scheduling. `master_seed` is mixed with the walk index so each walk
/// gets an independent, reproducible RNG stream.
pub fn sample_walks(
    z0: ArrayView2<f64>,
    g: ArrayView2<f64>,
    a: ArrayView2<f64>,
    h_tilde: ArrayView2<f64>,
    n_samples: usize,
    f0: f64,
    dr: f64,
    steps: Option<usize>,
    kde_bw_factor: f64,
    master_seed: u64,
    parallel: bool,
) -> Result<Vec<Array2<f64>>, PlomError> {
    let steps = steps.unwrap_or_else(|| IsdeConfig::heuristic_steps(f0, dr));
    let config = IsdeConfig { f0, dr, steps, kde_bw_factor };
    let (nu, n) = h_tilde.dim();
    let kde_params = KdeParams::new(n, nu, kde_bw_factor);

    let seeds: Vec<u64> = (0..n_samples)
        .map(|k| master_seed ^ (k as u64).wrapping_mul(0x9E3779B97F4A7C15))
        .collect();

    if parallel {
        seeds
            .into_par_iter()
            .map(|seed| run_walk(z0, g, a, h_tilde, kde_params, config, seed))
            .collect()
    } else {
        seeds
            .into_iter()
            .map(|seed| run_walk(z0, g, a, h_tilde, kde_params, config, seed))
            .collect()
    }
}
