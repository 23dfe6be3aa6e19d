//! Correction operator catalog
//!
//! A fixed set of parameterized image-transform functions, one or more per
//! defect class, each with a declared parameter schema. The restoration loop
//! is agnostic to the internals here; it resolves a binding through the
//! registry and calls [`CorrectionOperator::apply`].
//!
//! # Families
//!
//! - **Sharpen** ([`sharpen`]) - unsharp mask and Laplacian boost for `blur`
//! - **Contrast** ([`contrast`]) - histogram equalization and CLAHE for `contrast`
//! - **Glare** ([`glare`]) - mask-guided inpainting for `glares`
//! - **Denoise** ([`denoise`]) - adaptive filters, wavelet shrinkage, and
//!   non-local means for `noise`

pub mod colorspace;
pub mod contrast;
pub mod denoise;
pub mod glare;
pub mod sharpen;
mod types;

// Re-export public API
pub use types::{
    catalog, spec_for, CorrectionOperator, OperatorError, OperatorId, OperatorSpec,
    ParamDependency, ParamKind, ParamSet, ParamSpec, ParamValue,
};
