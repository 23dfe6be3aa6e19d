//! Classifier core types
//!
//! Contains the closed defect enumeration, the classification result type,
//! and the oracle trait implemented by the ONNX backend and by test mocks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================
// Error Types
// ============================================================

/// Classifier error types
///
/// Every variant means the oracle cannot answer; the restoration loop never
/// recovers from these (no classifier means no loop).
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),
}

pub type Result<T> = std::result::Result<T, ClassifierError>;

// ============================================================
// Core Data Structures
// ============================================================

/// Defect classes the pretrained model distinguishes
///
/// `Good` is the terminal no-defect sentinel and is never correctable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectClass {
    Blur,
    Contrast,
    Glares,
    Noise,
    Good,
}

impl DefectClass {
    /// All correctable classes, in tally order
    pub fn correctable() -> [DefectClass; 4] {
        [
            DefectClass::Blur,
            DefectClass::Contrast,
            DefectClass::Glares,
            DefectClass::Noise,
        ]
    }

    /// Map a model output index to its class
    ///
    /// The pretrained model emits logits in alphabetical label order:
    /// blur, contrast, glares, good, noise.
    pub fn from_model_index(index: usize) -> Option<DefectClass> {
        match index {
            0 => Some(DefectClass::Blur),
            1 => Some(DefectClass::Contrast),
            2 => Some(DefectClass::Glares),
            3 => Some(DefectClass::Good),
            4 => Some(DefectClass::Noise),
            _ => None,
        }
    }

    /// Stable lowercase name, matching the model's label set
    pub fn name(&self) -> &'static str {
        match self {
            DefectClass::Blur => "blur",
            DefectClass::Contrast => "contrast",
            DefectClass::Glares => "glares",
            DefectClass::Noise => "noise",
            DefectClass::Good => "good",
        }
    }
}

impl fmt::Display for DefectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One classification answer
///
/// Produced fresh on every call; the loop owns it for a single iteration.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Classification {
    /// Predicted defect class (arg-max over the model output)
    pub class: DefectClass,

    /// Confidence of the predicted class, in `[0, 1]`
    pub confidence: f32,
}

// ============================================================
// Oracle Trait
// ============================================================

/// The classifier oracle the restoration loop is driven by
///
/// Implementations must be side-effect free with respect to the image and
/// safe to call repeatedly; the loop re-classifies after every correction.
pub trait DefectClassifier {
    /// Classify one image into exactly one defect class with a confidence
    fn classify(&self, image: &image::RgbImage) -> Result<Classification>;
}
