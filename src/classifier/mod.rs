//! Classifier oracle module
//!
//! Wraps the pretrained defect classification model behind a narrow trait:
//! one image in, one `(DefectClass, confidence)` out.
//!
//! # Features
//!
//! - **Types** ([`types`]) - Defect enumeration, classification result, oracle trait
//! - **ONNX backend** ([`onnx`]) - ONNX Runtime session wrapper with preprocessing

pub mod onnx;
mod types;

// Re-export public API
pub use onnx::OnnxDefectClassifier;
pub use types::{Classification, ClassifierError, DefectClass, DefectClassifier};
