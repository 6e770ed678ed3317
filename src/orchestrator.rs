//! C8: the orchestrator. Owns every derived sub-model as a named `Option`
//! field (§9's "typed record of sub-models, each optional") and drives the
//! three pipelines: full, DMAPS-only, and sampling-only.

use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ProjectionSource, ProjectionTarget, RunConfig};
use crate::dmaps::DmapsModel;
use crate::error::PlomError;
use crate::isde::sample_walks;
use crate::pca::PcaModel;
use crate::projector::Projection;
use crate::scale::ScaleParams;

const STAGE: &str = "orchestrator";

/// A master RNG seed derived from the orchestration config, so that distinct
/// runs (distinct `job_desc`/`ito_*` settings) get distinct sampler streams
/// without requiring an explicit seed key.
fn master_seed(config: &RunConfig) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    config.job_desc.hash(&mut hasher);
    config.ito_f0.to_bits().hash(&mut hasher);
    config.ito_dr.to_bits().hash(&mut hasher);
    config.num_samples.hash(&mut hasher);
    hasher.finish()
}

/// The orchestrator's single mutable state record. Existence of a field is
/// a tagged presence; no sentinel values, no string-keyed dictionary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlomState {
    pub scale: Option<ScaleParams>,
    pub pca: Option<PcaModel>,
    /// H, the PCA-whitened training data, shape (N, ν).
    pub pca_data: Option<Array2<f64>>,
    pub dmaps: Option<DmapsModel>,
    /// g, the reduced basis actually handed to the projector: either the
    /// DMAPS reduced basis or a second PCA pass over the transposed data,
    /// per `projection_target`. Shape (N, m).
    pub projection_basis: Option<Array2<f64>>,
    pub projection: Option<Projection>,
    /// K·N × n, after the full inverse pipeline.
    pub augmented: Option<Array2<f64>>,
    pub rmse: Option<f64>,
}

impl PlomState {
    fn require_scale(&self) -> Result<&ScaleParams, PlomError> {
        self.scale.as_ref().ok_or_else(|| PlomError::state(STAGE, "scaling has not been fit yet"))
    }
    fn require_pca(&self) -> Result<&PcaModel, PlomError> {
        self.pca.as_ref().ok_or_else(|| PlomError::state(STAGE, "PCA has not been fit yet"))
    }
    fn require_pca_data(&self) -> Result<&Array2<f64>, PlomError> {
        self.pca_data.as_ref().ok_or_else(|| PlomError::state(STAGE, "PCA has not been fit yet"))
    }
    fn require_projection_basis(&self) -> Result<&Array2<f64>, PlomError> {
        self.projection_basis
            .as_ref()
            .ok_or_else(|| PlomError::state(STAGE, "the reduced basis has not been built yet"))
    }
    fn require_projection(&self) -> Result<&Projection, PlomError> {
        self.projection
            .as_ref()
            .ok_or_else(|| PlomError::state(STAGE, "the training set has not been projected yet"))
    }

    /// The leading `n_rows` of the augmented sample pool, for use as the `x`
    /// argument to the conditional estimators (C7). Errs if more rows are
    /// requested than the pool holds.
    pub fn conditioning_pool(&self, n_rows: usize) -> Result<ArrayView2<'_, f64>, PlomError> {
        let augmented = self
            .augmented
            .as_ref()
            .ok_or_else(|| PlomError::state(STAGE, "no augmented sample pool has been generated yet"))?;
        let available = augmented.dim().0;
        if n_rows > available {
            return Err(PlomError::InsufficientRows {
                stage: STAGE,
                requested: n_rows,
                available,
            });
        }
        Ok(augmented.slice(s![0..n_rows, ..]))
    }
}

/// The textual report written alongside the augmented dataset.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub job_desc: String,
    pub scaling_method: String,
    pub pca_method: String,
    pub pca_rank: usize,
    pub dmaps_epsilon: f64,
    pub dmaps_epsilon_auto: bool,
    pub dmaps_m: usize,
    pub n_samples_rows: (usize, usize),
    pub m_samples_rows: (usize, usize),
    pub n_walks: usize,
    pub total_augmented_rows: usize,
    pub rmse: Option<f64>,
}

impl RunSummary {
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!("job_desc: {}", self.job_desc),
            format!("scaling_method: {}", self.scaling_method),
            format!("pca_method: {} (rank {})", self.pca_method, self.pca_rank),
            format!(
                "dmaps_epsilon: {} ({}), m = {}",
                self.dmaps_epsilon,
                if self.dmaps_epsilon_auto { "auto" } else { "fixed" },
                self.dmaps_m
            ),
            format!(
                "projection shape: {}x{} -> {}x{}",
                self.n_samples_rows.0, self.n_samples_rows.1, self.m_samples_rows.0, self.m_samples_rows.1
            ),
            format!(
                "samples: K={} walks, {} total augmented rows",
                self.n_walks, self.total_augmented_rows
            ),
        ];
        match self.rmse {
            Some(rmse) => lines.push(format!("reconstruction_rmse: {rmse}")),
            None => lines.push("reconstruction_rmse: n/a".to_string()),
        }
        lines.join("\n") + "\n"
    }
}

/// Scale, PCA, DMAPS, and build the reduced basis / reduction matrix —
/// everything short of sampling. Shared by the full and DMAPS-only
/// pipelines.
fn fit_manifold(state: &mut PlomState, x: ArrayView2<f64>, config: &RunConfig) -> Result<(), PlomError> {
    info!(method = ?config.scaling_method, "fitting scaler");
    let scale = ScaleParams::fit(x, config.scaling_method)?;
    let scaled = scale.scale(x);
    state.scale = Some(scale);

    info!("fitting PCA");
    let pca = PcaModel::fit(scaled.view(), config.pca_method, config.pca_scale_evecs)?;
    let h = pca.transform(scaled.view());
    info!(rank = pca.rank(), "PCA fit complete");
    state.pca = Some(pca);
    state.pca_data = Some(h.clone());

    let dmaps_input = match config.projection_source {
        ProjectionSource::Raw => x.to_owned(),
        ProjectionSource::Scaled => scaled.clone(),
        ProjectionSource::Pca => h.clone(),
    };

    let dmaps_config = crate::dmaps::DmapsConfig {
        kappa: config.dmaps_kappa,
        l: config.dmaps_l,
        first_evec: config.dmaps_first_evec,
        m_override: config.dmaps_m_override,
    };
    let dmaps = DmapsModel::fit(dmaps_input.view(), config.dmaps_epsilon, dmaps_config)?;
    info!(epsilon = dmaps.epsilon, m = dmaps.m, "DMAPS fit complete");

    let g = match config.projection_target {
        ProjectionTarget::Dmaps => dmaps.reduced_basis.clone(),
        ProjectionTarget::Pca => {
            // a second PCA pass, transposed: "samples" of this pass are the
            // ν (or n) feature columns, "features" are the N original rows,
            // so its eigenvectors are themselves an N-dimensional basis.
            let second = PcaModel::fit(dmaps_input.t(), config.pca_method, config.pca_scale_evecs)?;
            second.transform(dmaps_input.t()).t().to_owned()
        }
    };
    state.dmaps = Some(dmaps);
    state.projection_basis = Some(g.clone());

    info!("building reduced-basis projection");
    let projection = Projection::fit(g.view(), h.view())?;
    state.projection = Some(projection);
    Ok(())
}

/// Reconstruct the training set through the inverse pipeline (no sampling)
/// and report the RMSE against the original `x`.
fn reconstruct_training(state: &PlomState, x: ArrayView2<f64>) -> Result<f64, PlomError> {
    let g = state.require_projection_basis()?;
    let projection = state.require_projection()?;
    let pca = state.require_pca()?;
    let scale = state.require_scale()?;

    let h_hat = Projection::inverse(g.view(), projection.z0.view());
    let scaled_hat = pca.inverse_transform(h_hat.view());
    let x_hat = scale.inverse_scale(scaled_hat.view());

    let rmse = ((&x_hat - &x).mapv(|v| v * v).sum() / x.len() as f64).sqrt();
    Ok(rmse)
}

/// The **full** pipeline: scale, PCA, DMAPS, project, sample, invert,
/// summarize.
pub fn run_full(x: ArrayView2<f64>, config: &RunConfig) -> Result<(PlomState, RunSummary), PlomError> {
    let mut state = PlomState::default();
    fit_manifold(&mut state, x, config)?;

    let rmse = reconstruct_training(&state, x)?;
    state.rmse = Some(rmse);
    info!(rmse, "reconstruction RMSE computed");

    let g = state.require_projection_basis()?.clone();
    let projection = state.require_projection()?.clone();
    let pca = state.require_pca()?.clone();
    let scale = state.require_scale()?.clone();
    let h = state.require_pca_data()?.clone();

    let z_samples = sample_walks(
        projection.z0.view(),
        g.view(),
        projection.reduction_matrix.view(),
        h.t(),
        config.num_samples,
        config.ito_f0,
        config.ito_dr,
        config.ito_steps,
        config.ito_kde_bw_factor,
        master_seed(config),
        config.parallel,
    )?;

    let nu = h.dim().1;
    let n_features = x.dim().1;
    let mut augmented = Array2::zeros((config.num_samples * x.dim().0, n_features));
    for (k, z) in z_samples.iter().enumerate() {
        let h_tilde = Projection::inverse(g.view(), z.view());
        debug_assert_eq!(h_tilde.dim().1, nu);
        let scaled_x = pca.inverse_transform(h_tilde.view());
        let x_k = scale.inverse_scale(scaled_x.view());
        augmented.slice_mut(s![k * x.dim().0..(k + 1) * x.dim().0, ..]).assign(&x_k);
    }
    state.augmented = Some(augmented.clone());
    info!(rows = augmented.dim().0, "sampling complete");

    let summary = RunSummary {
        job_desc: config.job_desc.clone(),
        scaling_method: format!("{:?}", config.scaling_method),
        pca_method: format!("{:?}", config.pca_method),
        pca_rank: pca.rank(),
        dmaps_epsilon: state.dmaps.as_ref().unwrap().epsilon,
        dmaps_epsilon_auto: matches!(config.dmaps_epsilon, crate::dmaps::EpsilonSpec::Auto),
        dmaps_m: state.dmaps.as_ref().unwrap().m,
        n_samples_rows: (x.dim().0, x.dim().1),
        m_samples_rows: (h.dim().0, h.dim().1),
        n_walks: config.num_samples,
        total_augmented_rows: augmented.dim().0,
        rmse: state.rmse,
    };
    Ok((state, summary))
}

/// The **DMAPS-only** pipeline: everything short of sampling.
pub fn run_dmaps_only(x: ArrayView2<f64>, config: &RunConfig) -> Result<(PlomState, RunSummary), PlomError> {
    let mut state = PlomState::default();
    fit_manifold(&mut state, x, config)?;
    let rmse = reconstruct_training(&state, x)?;
    state.rmse = Some(rmse);

    let pca = state.require_pca()?;
    let h = state.require_pca_data()?;
    let summary = RunSummary {
        job_desc: config.job_desc.clone(),
        scaling_method: format!("{:?}", config.scaling_method),
        pca_method: format!("{:?}", config.pca_method),
        pca_rank: pca.rank(),
        dmaps_epsilon: state.dmaps.as_ref().unwrap().epsilon,
        dmaps_epsilon_auto: matches!(config.dmaps_epsilon, crate::dmaps::EpsilonSpec::Auto),
        dmaps_m: state.dmaps.as_ref().unwrap().m,
        n_samples_rows: (x.dim().0, x.dim().1),
        m_samples_rows: (h.dim().0, h.dim().1),
        n_walks: 0,
        total_augmented_rows: 0,
        rmse: state.rmse,
    };
    Ok((state, summary))
}

/// The **sampling-only** pipeline: requires a `PlomState` already carrying a
/// projection (e.g. reloaded from a state bundle).
pub fn run_sampling_only(state: &mut PlomState, config: &RunConfig) -> Result<RunSummary, PlomError> {
    let g = state.require_projection_basis()?.clone();
    let projection = state.require_projection()?.clone();
    let pca = state.require_pca()?.clone();
    let scale = state.require_scale()?.clone();
    let h = state.require_pca_data()?.clone();

    let z_samples = sample_walks(
        projection.z0.view(),
        g.view(),
        projection.reduction_matrix.view(),
        h.t(),
        config.num_samples,
        config.ito_f0,
        config.ito_dr,
        config.ito_steps,
        config.ito_kde_bw_factor,
        master_seed(config),
        config.parallel,
    )?;

    let n_features = scale.center.len();
    let n_training_rows = h.dim().0;
    let mut augmented = Array2::zeros((config.num_samples * n_training_rows, n_features));
    for (k, z) in z_samples.iter().enumerate() {
        let h_tilde = Projection::inverse(g.view(), z.view());
        let scaled_x = pca.inverse_transform(h_tilde.view());
        let x_k = scale.inverse_scale(scaled_x.view());
        augmented.slice_mut(s![k * n_training_rows..(k + 1) * n_training_rows, ..]).assign(&x_k);
    }
    state.augmented = Some(augmented.clone());

    Ok(RunSummary {
        job_desc: config.job_desc.clone(),
        scaling_method: format!("{:?}", config.scaling_method),
        pca_method: format!("{:?}", config.pca_method),
        pca_rank: pca.rank(),
        dmaps_epsilon: state.dmaps.as_ref().map(|d| d.epsilon).unwrap_or(f64::NAN),
        dmaps_epsilon_auto: false,
        dmaps_m: state.dmaps.as_ref().map(|d| d.m).unwrap_or(0),
        n_samples_rows: (n_training_rows, n_features),
        m_samples_rows: (h.dim().0, h.dim().1),
        n_walks: config.num_samples,
        total_augmented_rows: augmented.dim().0,
        rmse: state.rmse,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProjectionSource, ProjectionTarget};
    use crate::dmaps::EpsilonSpec;
    use crate::pca::PcaMethod;
    use crate::scale::ScaleMethod;
    use std::path::PathBuf;

    fn cfg() -> RunConfig {
        RunConfig {
            training: PathBuf::new(),
            scaling_method: ScaleMethod::Normalize,
            pca_method: PcaMethod::CumEnergy(0.95),
            pca_scale_evecs: true,
            dmaps_epsilon: EpsilonSpec::Fixed(1.0),
            dmaps_kappa: 1,
            dmaps_l: 0.1,
            dmaps_first_evec: false,
            dmaps_m_override: 2,
            projection_source: ProjectionSource::Pca,
            projection_target: ProjectionTarget::Dmaps,
            num_samples: 2,
            ito_f0: 1.5,
            ito_dr: 0.1,
            ito_steps: Some(5),
            ito_kde_bw_factor: 1.0,
            parallel: false,
            n_jobs: 1,
            save_samples: false,
            samples_fname: None,
            job_desc: "test run".to_string(),
            verbose: false,
        }
    }

    fn swiss_roll(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, 3), |(i, j)| {
            let t = i as f64 / n as f64;
            match j {
                0 => t.cos() * (1.0 + t),
                1 => t.sin() * (1.0 + t),
                _ => t,
            }
        })
    }

    #[test]
    fn full_pipeline_produces_the_expected_row_count_and_an_rmse() {
        let x = swiss_roll(40);
        let config = cfg();
        let (state, summary) = run_full(x.view(), &config).unwrap();
        assert!(state.augmented.is_some());
        assert_eq!(summary.total_augmented_rows, config.num_samples * 40);
        assert!(summary.rmse.unwrap().is_finite());
    }

    #[test]
    fn dmaps_only_pipeline_skips_sampling() {
        let x = swiss_roll(40);
        let config = cfg();
        let (state, summary) = run_dmaps_only(x.view(), &config).unwrap();
        assert!(state.augmented.is_none());
        assert_eq!(summary.total_augmented_rows, 0);
    }

    #[test]
    fn sampling_only_requires_a_preexisting_projection() {
        let state = PlomState::default();
        let config = cfg();
        assert!(state.require_projection().is_err());
        let mut state = state;
        let err = run_sampling_only(&mut state, &config).unwrap_err();
        assert!(matches!(err, PlomError::State { .. }));
    }

    #[test]
    fn distinct_job_descs_derive_distinct_master_seeds() {
        let mut a = cfg();
        let mut b = cfg();
        b.job_desc = "a different run".to_string();
        assert_ne!(master_seed(&a), master_seed(&b));
        a.job_desc = a.job_desc.clone();
        assert_eq!(master_seed(&a), master_seed(&cfg()));
    }

    #[test]
    fn conditioning_pool_bounds_the_augmented_rows() {
        let x = swiss_roll(40);
        let config = cfg();
        let (state, _) = run_full(x.view(), &config).unwrap();
        let total = state.augmented.as_ref().unwrap().dim().0;

        let pool = state.conditioning_pool(total).unwrap();
        assert_eq!(pool.dim().0, total);

        let err = state.conditioning_pool(total + 1).unwrap_err();
        assert!(matches!(err, PlomError::InsufficientRows { .. }));
    }
}
