//! Weighted Gaussian-kernel density evaluator shared by the conditional PDF
//! (C7). This generalizes the Mahalanobis-distance evaluation idiom used
//! throughout this crate's linear-algebra layer to an *explicit* covariance
//! supplied by the caller (a Silverman-derived diagonal bandwidth matrix),
//! rather than one estimated from the data's own scatter.

use ndarray::{Zip, prelude::*};

use crate::error::PlomError;
use crate::linalg::{cholesky_decomposition, cholesky_inverse};

pub(crate) struct WeightedGaussianKernel {
    inv_cholesky: Array2<f64>,
    normalization: f64,
}

impl WeightedGaussianKernel {
    /// Build an evaluator for kernel covariance `cov` (must be symmetric
    /// positive-definite; a diagonal bandwidth matrix qualifies trivially).
    pub(crate) fn from_covariance(cov: ArrayView2<f64>) -> Result<Self, PlomError> {
        let dim = cov.dim().0;
        let chol = cholesky_decomposition(cov)?;
        let inv_cholesky = cholesky_inverse(chol.view());
        let det_sqrt = chol.diag().product::<f64>();
        let normalization = 1.0 / (det_sqrt * (2.0 * std::f64::consts::PI).sqrt().powi(dim as i32));
        Ok(Self {
            inv_cholesky,
            normalization,
        })
    }

    /// Build an evaluator from a diagonal bandwidth, e.g. per-dimension
    /// Silverman factors.
    pub(crate) fn from_diagonal(diag: ArrayView1<f64>) -> Result<Self, PlomError> {
        let dim = diag.len();
        let cov = Array2::from_shape_fn((dim, dim), |(i, j)| if i == j { diag[i] } else { 0.0 });
        Self::from_covariance(cov.view())
    }

    /// Evaluate `sum_i weights[i] * N(x; centers[i,:], cov)` at a single
    /// point `x`. `centers` has one row per kernel center.
    pub(crate) fn weighted_density(
        &self,
        centers: ArrayView2<f64>,
        weights: ArrayView1<f64>,
        x: ArrayView1<f64>,
    ) -> f64 {
        Zip::from(centers.rows())
            .and(weights)
            .fold(0.0, |acc, center, w| {
                let z = self.inv_cholesky.dot(&(&center - &x));
                acc + w * (-0.5 * z.dot(&z)).exp()
            })
            * self.normalization
    }
}

#[cfg(test)]
mod tests {
    use super::WeightedGaussianKernel;
    use approx::assert_relative_eq;
    use ndarray::prelude::*;

    #[test]
    fn isotropic_unit_kernel_matches_standard_normal_density() {
        let kernel = WeightedGaussianKernel::from_diagonal(array![1.0].view()).unwrap();
        let centers = array![[0.0]];
        let weights = array![1.0];
        let density = kernel.weighted_density(centers.view(), weights.view(), array![0.0].view());
        // standard normal density at 0 is 1/sqrt(2*pi)
        assert_relative_eq!(density, 1.0 / (2.0 * std::f64::consts::PI).sqrt(), epsilon = 1e-10);
    }

    #[test]
    fn weights_scale_the_contribution_of_each_center() {
        let kernel = WeightedGaussianKernel::from_diagonal(array![0.25].view()).unwrap();
        let centers = array![[0.0], [10.0]];
        let weights = array![1.0, 0.0];
        let density = kernel.weighted_density(centers.view(), weights.view(), array![0.0].view());
        let solo = kernel.weighted_density(array![[0.0]].view(), array![1.0].view(), array![0.0].view());
        assert_relative_eq!(density, solo, epsilon = 1e-12);
    }
}
