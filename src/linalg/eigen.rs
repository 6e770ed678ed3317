//! Symmetric eigendecomposition, needed by both PCA (covariance spectrum) and
//! the diffusion-maps kernel. Following the same rationale as [`super::cholesky`] —
//! avoid pulling in `ndarray-linalg`/BLAS for a textbook dense algorithm — this
//! is the classical cyclic Jacobi eigenvalue algorithm, which converges
//! quadratically for the symmetric matrices this crate ever produces (sizes up
//! to a few thousand) and touches only `ndarray` primitives.

use ndarray::prelude::*;

use crate::error::PlomError;

const MAX_SWEEPS: usize = 100;

/// Eigendecomposition of a real symmetric matrix `m`.
///
/// Returns `(eigenvalues, eigenvectors)` with eigenvalues in **ascending**
/// order and `eigenvectors` columns matching, i.e. `eigenvectors.column(i)`
/// is the eigenvector for `eigenvalues[i]`. Callers that need descending
/// order (the diffusion-maps kernel) reverse both afterward.
pub(crate) fn symmetric_eigh(m: ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>), PlomError> {
    let n = m.dim().0;
    if m.dim().1 != n {
        return Err(PlomError::numerical(
            "eigh",
            format!("expected a square matrix, found shape {:?}", m.dim()),
        ));
    }
    let mut a = m.to_owned();
    let mut v = Array2::<f64>::eye(n);

    for _sweep in 0..MAX_SWEEPS {
        let off = off_diagonal_norm(&a);
        if off <= 1e-14 {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                if a[[p, q]].abs() <= 1e-300 {
                    continue;
                }
                let (c, s) = jacobi_rotation(a[[p, p]], a[[q, q]], a[[p, q]]);
                apply_rotation(&mut a, p, q, c, s);
                apply_rotation_to_vectors(&mut v, p, q, c, s);
            }
        }
    }

    let eigenvalues = a.diag().to_owned();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| eigenvalues[i].partial_cmp(&eigenvalues[j]).unwrap());

    let sorted_values = Array1::from_shape_fn(n, |i| eigenvalues[order[i]]);
    let sorted_vectors = Array2::from_shape_fn((n, n), |(row, col)| v[[row, order[col]]]);
    Ok((sorted_values, sorted_vectors))
}

fn off_diagonal_norm(a: &Array2<f64>) -> f64 {
    let n = a.dim().0;
    let mut sum = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            sum += a[[i, j]] * a[[i, j]];
        }
    }
    sum.sqrt()
}

/// Rotation angle that zeroes `a[p,q]` for a symmetric 2x2 block
/// `[[app, apq], [apq, aqq]]`, via the numerically stable formulation
/// (Golub & Van Loan, *Matrix Computations*, §8.4).
fn jacobi_rotation(app: f64, aqq: f64, apq: f64) -> (f64, f64) {
    if apq.abs() < 1e-300 {
        return (1.0, 0.0);
    }
    let tau = (aqq - app) / (2.0 * apq);
    let t = tau.signum() / (tau.abs() + (1.0 + tau * tau).sqrt());
    let c = 1.0 / (1.0 + t * t).sqrt();
    let s = t * c;
    (c, s)
}

fn apply_rotation(a: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    let n = a.dim().0;
    let app = a[[p, p]];
    let aqq = a[[q, q]];
    let apq = a[[p, q]];

    a[[p, p]] = c * c * app - 2.0 * s * c * apq + s * s * aqq;
    a[[q, q]] = s * s * app + 2.0 * s * c * apq + c * c * aqq;
    a[[p, q]] = 0.0;
    a[[q, p]] = 0.0;

    for i in 0..n {
        if i == p || i == q {
            continue;
        }
        let aip = a[[i, p]];
        let aiq = a[[i, q]];
        a[[i, p]] = c * aip - s * aiq;
        a[[p, i]] = a[[i, p]];
        a[[i, q]] = s * aip + c * aiq;
        a[[q, i]] = a[[i, q]];
    }
}

fn apply_rotation_to_vectors(v: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    let n = v.dim().0;
    for i in 0..n {
        let vip = v[[i, p]];
        let viq = v[[i, q]];
        v[[i, p]] = c * vip - s * viq;
        v[[i, q]] = s * vip + c * viq;
    }
}
