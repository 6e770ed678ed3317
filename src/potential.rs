//! C5: gradient of the log-density of the joint Gaussian-KDE over the
//! (whitened) training set. This is the sole canonical KDE path; see
//! `SPEC_FULL.md` §4.5/§9 for why the other numbered variants in the
//! original source are not ported.

use ndarray::prelude::*;

use crate::bandwidth::silverman_bandwidth;
use crate::error::PlomError;

/// Parameters of the joint-KDE potential: Silverman bandwidth `s`, scaled by
/// the user multiplier `bw_factor`, and its stabilized counterpart `ŝ`.
#[derive(Debug, Clone, Copy)]
pub struct KdeParams {
    pub s: f64,
    pub s_hat: f64,
}

impl KdeParams {
    pub fn new(n_samples: usize, nu: usize, bw_factor: f64) -> Self {
        let s = silverman_bandwidth(n_samples, nu) * bw_factor;
        let n = n_samples as f64;
        let s_hat = s / (s * s + (n - 1.0) / n).sqrt();
        Self { s, s_hat }
    }
}

/// Evaluate `∇_u log q(u)` at every column of `u`, given training columns
/// `h_tilde` (both shape `(nu, _)`). Returns a `(nu, M)` matrix.
pub fn kde_log_density_gradient(
    h_tilde: ArrayView2<f64>,
    u: ArrayView2<f64>,
    params: KdeParams,
) -> Result<Array2<f64>, PlomError> {
    let (nu, n) = h_tilde.dim();
    if u.dim().0 != nu {
        return Err(PlomError::numerical(
            "kde_potential",
            format!("query points have dimension {}, expected {nu}", u.dim().0),
        ));
    }
    let m = u.dim().1;
    let ratio = params.s_hat / params.s;
    let scaled_h = h_tilde.mapv(|v| v * ratio);
    let denom = 2.0 * params.s_hat * params.s_hat;

    let mut result = Array2::zeros((nu, m));
    for l in 0..m {
        let u_l = u.column(l);
        let diff = &scaled_h - &u_l.view().insert_axis(Axis(1));
        let sq_norms = diff.map_axis(Axis(0), |col| col.dot(&col));
        let arg = sq_norms.mapv(|d| -d / denom);
        let max_arg = arg.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let weights = arg.mapv(|a| (a - max_arg).exp());
        let sum_weights = weights.sum();
        let q_scaled = sum_weights / n as f64;
        if !q_scaled.is_finite() || q_scaled <= 0.0 {
            return Err(PlomError::numerical("kde_potential", "density estimate underflowed to zero"));
        }
        let grad_scaled = diff.dot(&weights) / (n as f64 * params.s_hat * params.s_hat);
        let log_grad = grad_scaled.mapv(|v| v / q_scaled);
        result.column_mut(l).assign(&log_grad);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 1-D standard Gaussian training set; gradient at symmetric points
    /// should match the exact Gaussian score function -u within a loose
    /// tolerance (the KDE smooths the true density somewhat).
    #[test]
    fn gradient_matches_standard_normal_score_function() {
        let n = 2000;
        let mut state: u64 = 0x1234_5678_9abc_def0;
        let mut uniform = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        // Box-Muller to get standard-normal training samples
        let mut data = Vec::with_capacity(n);
        while data.len() < n {
            let u1 = uniform().max(1e-12);
            let u2 = uniform();
            let r = (-2.0 * u1.ln()).sqrt();
            data.push(r * (2.0 * std::f64::consts::PI * u2).cos());
        }
        let h_tilde = Array2::from_shape_vec((1, n), data).unwrap();

        let queries = array![[-2.0, -1.0, 0.0, 1.0, 2.0]];
        let params = KdeParams::new(n, 1, 1.0);
        let grad = kde_log_density_gradient(h_tilde.view(), queries.view(), params).unwrap();

        let expected = [2.0, 1.0, 0.0, -1.0, -2.0];
        for (g, e) in grad.row(0).iter().zip(expected.iter()) {
            assert_relative_eq!(*g, *e, epsilon = 0.2);
        }
    }

    #[test]
    fn density_is_positive_and_gradient_finite_at_training_points() {
        let h_tilde = array![[0.1, 0.4, -0.2, 0.9, -0.7]];
        let params = KdeParams::new(5, 1, 1.0);
        let grad = kde_log_density_gradient(h_tilde.view(), h_tilde.view(), params).unwrap();
        assert!(grad.iter().all(|v| v.is_finite()));
    }
}
