//! C1: column-wise scaling. Two modes, min-max and standardize; both reduce
//! to `(X - center) / scale` with an invertible inverse.

use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::PlomError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleMethod {
    MinMax,
    Normalize,
}

/// Per-column center and scale, fitted once from the training matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleParams {
    pub method: ScaleMethod,
    pub center: Array1<f64>,
    pub scale: Array1<f64>,
}

impl ScaleParams {
    pub fn fit(x: ArrayView2<f64>, method: ScaleMethod) -> Result<Self, PlomError> {
        if x.iter().any(|v| !v.is_finite()) {
            return Err(PlomError::numerical("scale", "training matrix contains non-finite values"));
        }
        let n_cols = x.dim().1;
        let (center, mut scale) = match method {
            ScaleMethod::MinMax => {
                let min = x.fold_axis(Axis(0), f64::INFINITY, |&a, &b| a.min(b));
                let max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |&a, &b| a.max(b));
                (min.clone(), &max - &min)
            }
            ScaleMethod::Normalize => {
                let mean = x.mean_axis(Axis(0)).expect("non-empty training matrix");
                let std = Array1::from_shape_fn(n_cols, |j| {
                    let col = x.column(j);
                    let m = mean[j];
                    (col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / col.len() as f64).sqrt()
                });
                (mean, std)
            }
        };
        // zero-range columns keep scale=1 so the identity is preserved
        scale.mapv_inplace(|s| if s == 0.0 { 1.0 } else { s });
        Ok(Self {
            method,
            center,
            scale,
        })
    }

    pub fn scale(&self, x: ArrayView2<f64>) -> Array2<f64> {
        (&x - &self.center.view().insert_axis(Axis(0))) / &self.scale.view().insert_axis(Axis(0))
    }

    pub fn inverse_scale(&self, y: ArrayView2<f64>) -> Array2<f64> {
        &y * &self.scale.view().insert_axis(Axis(0)) + &self.center.view().insert_axis(Axis(0))
    }
}
