//! Hand-rolled dense linear algebra kernels used across the pipeline.
//!
//! Both submodules exist to avoid a BLAS/LAPACK dependency (`ndarray-linalg`)
//! for algorithms that are simple enough to implement directly over `ndarray`
//! at the sizes this crate ever deals with (training sets of a few thousand
//! rows at most).

pub(crate) mod cholesky;
pub(crate) mod eigen;

pub(crate) use cholesky::{cholesky_decomposition, cholesky_inverse};
pub(crate) use eigen::symmetric_eigh;
