//! C7: weighted-KDE conditional estimators — `E[Q|W=w]`, `Var[Q|W=w]`, and
//! `p(Q|W=w)` on a tensor grid — evaluated against the (possibly augmented)
//! sample pool.

use ndarray::prelude::*;
use rayon::prelude::*;

use crate::bandwidth::silverman_bandwidth;
use crate::error::PlomError;
use crate::kernel::WeightedGaussianKernel;

fn column_stdev(x: ArrayView2<f64>) -> Array1<f64> {
    let mean = x.mean_axis(Axis(0)).expect("non-empty data matrix");
    Array1::from_shape_fn(x.dim().1, |j| {
        let col = x.column(j);
        let m = mean[j];
        (col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / col.len() as f64).sqrt()
    })
}

/// Log-sum-exp-stabilized conditioning weights α_i over the N rows of `x`,
/// evaluated at `w0` over the columns `cond_cols`. `n_q` is the number of
/// target (QoI) columns the weights will be used against, needed because the
/// Silverman bandwidth is taken over the *joint* `n_w + n_q` dimension.
pub fn conditional_weights(
    x: ArrayView2<f64>,
    cond_cols: &[usize],
    w0: &[f64],
    n_q: usize,
) -> Result<Array1<f64>, PlomError> {
    if cond_cols.len() != w0.len() {
        return Err(PlomError::numerical(
            "conditional",
            "cond_cols and cond_vals must have the same length",
        ));
    }
    let n = x.dim().0;
    let n_w = cond_cols.len();
    let w = Array2::from_shape_fn((n, n_w), |(i, j)| x[[i, cond_cols[j]]]);
    let stdev = column_stdev(w.view());
    if stdev.iter().any(|&s| s <= 0.0) {
        return Err(PlomError::numerical("conditional", "a conditioning column has zero variance"));
    }
    let s_w = silverman_bandwidth(n, n_w + n_q);

    let mut exponents = Array1::zeros(n);
    for i in 0..n {
        let mut sq = 0.0;
        for j in 0..n_w {
            let z = (w[[i, j]] - w0[j]) / stdev[j];
            sq += z * z;
        }
        exponents[i] = -sq / (2.0 * s_w * s_w);
    }
    let max_exp = exponents.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut weights = exponents.mapv(|e| (e - max_exp).exp());
    let total = weights.sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(PlomError::numerical("conditional", "conditioning weights collapsed to zero"));
    }
    weights.mapv_inplace(|v| v / total);
    Ok(weights)
}

/// `E[Q|W=w0]` and `Var[Q|W=w0]`, one entry per target column, computed
/// elementwise from the weighted first and second moments.
pub fn conditional_expectation(
    x: ArrayView2<f64>,
    cond_cols: &[usize],
    w0: &[f64],
    qoi_cols: &[usize],
) -> Result<(Array1<f64>, Array1<f64>), PlomError> {
    // The original estimator always takes n_q = 1 here, one target column at
    // a time, regardless of how many QoI columns are requested in this call.
    let weights = conditional_weights(x, cond_cols, w0, 1)?;
    let n_q = qoi_cols.len();
    let mut mean = Array1::zeros(n_q);
    let mut second = Array1::zeros(n_q);
    for (i, &alpha) in weights.iter().enumerate() {
        for (k, &col) in qoi_cols.iter().enumerate() {
            let q = x[[i, col]];
            mean[k] += alpha * q;
            second[k] += alpha * q * q;
        }
    }
    let variance = &second - &mean.mapv(|m| m * m);
    Ok((mean, variance))
}

/// A tensor grid over the target dimensions: `points` has shape
/// `(n_q, total_points)`, one column per grid node, in row-major axis order.
pub struct ConditionalGrid {
    pub points: Array2<f64>,
}

/// Auto-generate a tensor grid spanning each target column's observed range,
/// padded by half a bandwidth on each side, with `npts` points per axis.
pub fn auto_grid(x: ArrayView2<f64>, qoi_cols: &[usize], npts: usize) -> ConditionalGrid {
    let n_q = qoi_cols.len();
    let mut axes = Vec::with_capacity(n_q);
    for &col in qoi_cols {
        let values = x.column(col);
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let pad = 0.1 * (max - min).max(1e-6);
        axes.push(Array1::linspace(min - pad, max + pad, npts));
    }
    ConditionalGrid { points: tensor_grid(&axes) }
}

fn tensor_grid(axes: &[Array1<f64>]) -> Array2<f64> {
    let n_q = axes.len();
    let total: usize = axes.iter().map(|a| a.len()).product();
    let mut points = Array2::zeros((n_q, total));
    for flat in 0..total {
        let mut rem = flat;
        for (d, axis) in axes.iter().enumerate() {
            let len = axis.len();
            points[[d, flat]] = axis[rem % len];
            rem /= len;
        }
    }
    points
}

/// `p(Q|W=w0)` evaluated at every column of `grid`, using a diagonal
/// Silverman bandwidth over the target dimensions.
pub fn conditional_pdf(
    x: ArrayView2<f64>,
    cond_cols: &[usize],
    w0: &[f64],
    qoi_cols: &[usize],
    grid: &ConditionalGrid,
    parallel: bool,
) -> Result<Array1<f64>, PlomError> {
    let n_q = qoi_cols.len();
    let weights = conditional_weights(x, cond_cols, w0, n_q)?;
    let n = x.dim().0;
    let n_w = cond_cols.len();
    let s_q = silverman_bandwidth(n, n_w + n_q);

    let centers = Array2::from_shape_fn((n, n_q), |(i, k)| x[[i, qoi_cols[k]]]);
    let q_std = column_stdev(centers.view());
    let bandwidth = q_std.mapv(|std| (s_q * std).powi(2));
    let kernel = WeightedGaussianKernel::from_diagonal(bandwidth.view())?;
    let total = grid.points.dim().1;

    let eval = |g: usize| kernel.weighted_density(centers.view(), weights.view(), grid.points.column(g));
    let density = if parallel {
        (0..total).into_par_iter().map(eval).collect::<Vec<_>>()
    } else {
        (0..total).map(eval).collect::<Vec<_>>()
    };
    Ok(Array1::from_vec(density))
}
