//! Classify-correct restoration pipeline
//!
//! The control-flow core of the crate: a feedback loop driven by the
//! classifier oracle that repeatedly classifies an image and applies the
//! registered correction for the reported defect, until the image is clean
//! or a defect class recurs.
//!
//! # Components
//!
//! - [`LoopController`] - the per-image classify-correct loop with cycle
//!   detection and a hard termination bound
//! - [`run_on_frames`] / [`run_on_dataset`] - sequential drivers over video
//!   frames and directory datasets, aggregating tallies
//! - [`LoopOutcome`] / [`DefectTally`] - auditable per-run statistics

mod batch;
mod controller;
mod types;

// Re-export public API
pub use batch::{run_on_dataset, run_on_frames, DatasetReport};
pub use controller::LoopController;
pub use types::{
    DefectCounts, DefectTally, LoopOutcome, PipelineError, Result, RunPolicy, TerminalReason,
};
