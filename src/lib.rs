//! defect-restore - Classify-correct restoration of defective images
//!
//! Corrects visual defects (blur, low contrast, glare, noise) by repeatedly
//! classifying an image with a pretrained defect classifier and applying a
//! correction operator matched to the predicted defect, until the image is
//! classified as defect-free or a defect class recurs.
//!
//! # Components
//!
//! - [`classifier`] - ONNX-backed defect oracle behind the
//!   [`DefectClassifier`] trait
//! - [`operators`] - the correction operator catalog with validated
//!   parameter schemas
//! - [`registry`] - per-mode bindings of defect classes to operators
//! - [`pipeline`] - the classify-correct loop controller and batch drivers
//! - [`config`] - TOML binding configuration
//! - [`cli`] - command-line interface definitions

pub mod classifier;
pub mod cli;
pub mod config;
pub mod operators;
pub mod pipeline;
pub mod registry;

// Classifier
pub use classifier::{
    Classification, ClassifierError, DefectClass, DefectClassifier, OnnxDefectClassifier,
};

// Operator catalog
pub use operators::{
    catalog, spec_for, CorrectionOperator, OperatorError, OperatorId, OperatorSpec, ParamSet,
    ParamValue,
};

// Registry
pub use registry::{
    MethodBinding, MethodRegistry, ProcessingMode, RegistryError, ResolvedBinding,
};

// Pipeline
pub use pipeline::{
    run_on_dataset, run_on_frames, DatasetReport, DefectCounts, DefectTally, LoopController,
    LoopOutcome, PipelineError, RunPolicy, TerminalReason,
};

// Config
pub use config::{BindingConfig, Config, ConfigError};

// CLI
pub use cli::{Cli, Commands, DatasetArgs, ImageArgs, ModeArg, PolicyArg};

/// Process exit codes
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INPUT_NOT_FOUND: i32 = 2;
}
