//! C4: the reduced-basis projector tying the DMAPS eigenbasis to the
//! PCA-whitened coordinates.

use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::PlomError;
use crate::linalg::{cholesky_decomposition, cholesky_inverse};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projection {
    /// a = g (gᵀg)⁻¹, shape (N, m).
    pub reduction_matrix: Array2<f64>,
    /// Z₀ = Hᵀ a, shape (ν, m).
    pub z0: Array2<f64>,
}

impl Projection {
    /// `g` is the DMAPS reduced basis (N×m), `h` is the whitened training
    /// data (N×ν).
    pub fn fit(g: ArrayView2<f64>, h: ArrayView2<f64>) -> Result<Self, PlomError> {
        let gtg = g.t().dot(&g);
        let chol = cholesky_decomposition(gtg.view())?;
        let inv_l = cholesky_inverse(chol.view());
        let gtg_inv = inv_l.t().dot(&inv_l);
        let reduction_matrix = g.dot(&gtg_inv);
        let z0 = h.t().dot(&reduction_matrix);
        Ok(Self {
            reduction_matrix,
            z0,
        })
    }

    /// Inverse projection: H̃ = g Zᵀ, computed as `g.dot(&z.t())` (not
    /// `z.dot(&g.t())` transposed) since g is typically N×m with N ≫ m.
    pub fn inverse(g: ArrayView2<f64>, z: ArrayView2<f64>) -> Array2<f64> {
        g.dot(&z.t())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn orthogonal_basis() -> Array2<f64> {
        // two orthogonal, non-normalized columns over 5 "samples"
        array![
            [1.0, 0.0],
            [1.0, 1.0],
            [1.0, -1.0],
            [-1.0, 1.0],
            [-1.0, -1.0],
        ]
    }

    #[test]
    fn g_transpose_a_is_identity() {
        let g = orthogonal_basis();
        let h = array![[1.0, 2.0], [0.5, -1.0], [2.0, 0.0], [-1.0, 1.0], [0.0, 3.0]];
        let projection = Projection::fit(g.view(), h.view()).unwrap();
        let gta = g.t().dot(&projection.reduction_matrix);
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(gta[[i, j]], expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn reconstruction_matches_projection_onto_span_g() {
        let g = orthogonal_basis();
        let h = array![[1.0, 2.0], [0.5, -1.0], [2.0, 0.0], [-1.0, 1.0], [0.0, 3.0]];
        let projection = Projection::fit(g.view(), h.view()).unwrap();
        let reconstructed = Projection::inverse(g.view(), projection.z0.view());
        // g only spans a 2-dimensional subspace of R^5, so check instead that
        // the residual lies in the orthogonal complement of g's columns.
        let residual = &h - &reconstructed;
        let gt_residual = g.t().dot(&residual);
        for v in gt_residual.iter() {
            assert_relative_eq!(*v, 0.0, epsilon = 1e-8);
        }
    }
}
