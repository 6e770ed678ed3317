//! C2: linear PCA whitening. Eigendecomposes the training covariance with
//! the hand-rolled symmetric solver of [`crate::linalg`], truncates by one of
//! three user-selectable rules, and exposes forward/inverse projection.

use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::PlomError;
use crate::linalg::symmetric_eigh;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum PcaMethod {
    CumEnergy(f64),
    EigvCutoff(f64),
    PcaDim(usize),
}

/// Truncated eigenbasis of the training covariance, plus the bookkeeping
/// needed to project forward and back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaModel {
    pub mean: Array1<f64>,
    /// Truncated eigenvalues, ascending, length ν.
    pub eigenvalues: Array1<f64>,
    /// Truncated eigenvectors, shape (n, ν), columns orthonormal.
    pub eigenvectors: Array2<f64>,
    pub scale_evecs: bool,
}

impl PcaModel {
    pub fn fit(x: ArrayView2<f64>, method: PcaMethod, scale_evecs: bool) -> Result<Self, PlomError> {
        let (n_samples, n_features) = x.dim();
        let mean = x.mean_axis(Axis(0)).expect("non-empty training matrix");
        let centered = &x - &mean.view().insert_axis(Axis(0));
        let cov = centered.t().dot(&centered) / (n_samples as f64 - 1.0);

        if cov.iter().any(|v| !v.is_finite()) {
            return Err(PlomError::numerical("pca", "covariance matrix contains non-finite values"));
        }

        let (eigenvalues, eigenvectors) = symmetric_eigh(cov.view())?;
        let tol = -1e-9 * eigenvalues.iter().cloned().fold(0.0, f64::max).max(1.0);
        if let Some(bad) = eigenvalues.iter().find(|&&v| v < tol) {
            return Err(PlomError::numerical(
                "pca",
                format!("covariance eigenvalue {bad} is negative beyond tolerance"),
            ));
        }

        let nu = select_rank(eigenvalues.view(), method, n_features)?;
        // eigenvalues ascending -> top `nu` are the last `nu` entries
        let start = n_features - nu;
        let eps_floor = f64::EPSILON * eigenvalues[n_features - 1].abs().max(1.0);
        let trunc_values = eigenvalues.slice(s![start..]).mapv(|v| v.max(0.0));
        if trunc_values.iter().any(|&v| v <= eps_floor) {
            return Err(PlomError::numerical(
                "pca",
                "requested rank retains an eigenvalue at or below floating epsilon; reduce the truncation rank",
            ));
        }
        let trunc_vectors = eigenvectors.slice(s![.., start..]).to_owned();

        Ok(Self {
            mean,
            eigenvalues: trunc_values,
            eigenvectors: trunc_vectors,
            scale_evecs,
        })
    }

    fn forward_operator(&self) -> Array2<f64> {
        if self.scale_evecs {
            let sqrt_inv = self.eigenvalues.mapv(|v| v.sqrt().recip());
            &self.eigenvectors * &sqrt_inv.view().insert_axis(Axis(0))
        } else {
            self.eigenvectors.clone()
        }
    }

    fn inverse_operator(&self) -> Array2<f64> {
        if self.scale_evecs {
            let sqrt = self.eigenvalues.mapv(f64::sqrt);
            &self.eigenvectors * &sqrt.view().insert_axis(Axis(0))
        } else {
            self.eigenvectors.clone()
        }
    }

    /// H = (X - mean) . P_f, shape (N, ν).
    pub fn transform(&self, x: ArrayView2<f64>) -> Array2<f64> {
        let centered = &x - &self.mean.view().insert_axis(Axis(0));
        centered.dot(&self.forward_operator())
    }

    /// X = H . P_i^T + mean.
    pub fn inverse_transform(&self, h: ArrayView2<f64>) -> Array2<f64> {
        h.dot(&self.inverse_operator().t()) + &self.mean.view().insert_axis(Axis(0))
    }

    pub fn rank(&self) -> usize {
        self.eigenvalues.len()
    }
}

fn select_rank(eigenvalues: ArrayView1<f64>, method: PcaMethod, n_features: usize) -> Result<usize, PlomError> {
    match method {
        PcaMethod::PcaDim(k) => Ok(k.min(n_features).max(1)),
        PcaMethod::EigvCutoff(c) => {
            let count = eigenvalues.iter().filter(|&&v| v > c).count();
            if count == 0 {
                return Err(PlomError::numerical("pca", "eigv_cutoff leaves zero components"));
            }
            Ok(count)
        }
        PcaMethod::CumEnergy(e) => {
            let total: f64 = eigenvalues.iter().sum();
            if total <= 0.0 {
                return Err(PlomError::numerical("pca", "total variance is non-positive"));
            }
            // ascending order: drop the smallest prefix whose cumulative share <= 1 - e
            let threshold = 1.0 - e;
            let mut cumulative = 0.0;
            let mut drop = 0;
            for &v in eigenvalues.iter() {
                let next = cumulative + v / total;
                if next <= threshold {
                    cumulative = next;
                    drop += 1;
                } else {
                    break;
                }
            }
            let nu = n_features - drop;
            if nu == 0 {
                return Err(PlomError::numerical("pca", "cum_energy leaves zero components"));
            }
            Ok(nu)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line_dataset() -> Array2<f64> {
        Array2::from_shape_fn((100, 2), |(i, j)| {
            let t = (i + 1) as f64;
            if j == 0 { t } else { 2.0 * t + 1.0 }
        })
    }

    #[test]
    fn full_rank_round_trips() {
        let x = array![
            [1.0, 2.0, 3.0],
            [2.0, 1.0, 0.0],
            [4.0, 5.0, 1.0],
            [0.5, -1.0, 2.0],
            [3.0, 3.0, 3.0],
        ];
        let model = PcaModel::fit(x.view(), PcaMethod::PcaDim(3), true).unwrap();
        let h = model.transform(x.view());
        let back = model.inverse_transform(h.view());
        for (a, b) in x.iter().zip(back.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-8);
        }
    }

    #[test]
    fn cum_energy_collapses_a_degenerate_line_to_one_component() {
        let x = line_dataset();
        let model = PcaModel::fit(x.view(), PcaMethod::CumEnergy(1.0 - 1e-12), true).unwrap();
        assert_eq!(model.rank(), 1);
        let h = model.transform(x.view());
        let back = model.inverse_transform(h.view());
        let rmse = ((&back - &x).mapv(|v| v * v).sum() / x.len() as f64).sqrt();
        assert!(rmse < 1e-6, "rmse={rmse}");
    }

    #[test]
    fn eigv_cutoff_keeps_only_components_above_threshold() {
        let x = array![
            [1.0, 0.0, 100.0],
            [2.0, 0.0, 200.0],
            [3.0, 0.0, 50.0],
            [4.0, 0.0, 400.0],
        ];
        // the middle column is exactly constant (zero variance) -> must never survive a positive cutoff
        let model = PcaModel::fit(x.view(), PcaMethod::EigvCutoff(1e-6), false).unwrap();
        assert!(model.rank() <= 2);
    }
}
