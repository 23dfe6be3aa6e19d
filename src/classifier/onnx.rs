//! ONNX-backed defect classifier
//!
//! Wraps a pretrained 5-way defect classification model exported to ONNX.
//! The session is loaded once at construction and reused for every call;
//! preprocessing (resize, scaling, batch dimension) is handled here so the
//! restoration loop only ever sees `classify(image)`.

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::types::{Classification, ClassifierError, DefectClass, DefectClassifier, Result};

// ============================================================
// Constants
// ============================================================

/// Model input width in pixels
const INPUT_WIDTH: u32 = 224;

/// Model input height in pixels
const INPUT_HEIGHT: u32 = 224;

/// Number of output classes
const CLASS_COUNT: usize = 5;

// ============================================================
// Classifier
// ============================================================

/// Defect classifier backed by an ONNX Runtime session
pub struct OnnxDefectClassifier {
    /// ONNX session; `Session::run` needs `&mut`, so calls are serialized
    session: Mutex<Session>,

    /// Input tensor name discovered from the model
    input_name: String,

    /// Output tensor name discovered from the model
    output_name: String,

    /// Path the model was loaded from
    model_path: PathBuf,
}

impl OnnxDefectClassifier {
    /// Load the model artifact and prepare a reusable session
    ///
    /// Fails with `ModelUnavailable` if the file is missing or is not a
    /// loadable ONNX graph; nothing downstream can run without it.
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(ClassifierError::ModelNotFound(path.to_path_buf()));
        }

        let session = Session::builder()
            .and_then(|mut b| b.commit_from_file(path))
            .map_err(|e| ClassifierError::ModelUnavailable(e.to_string()))?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .ok_or_else(|| {
                ClassifierError::ModelUnavailable("model declares no inputs".to_string())
            })?;
        let output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| {
                ClassifierError::ModelUnavailable("model declares no outputs".to_string())
            })?;

        tracing::info!(
            model = %path.display(),
            input = %input_name,
            output = %output_name,
            "loaded defect classification model"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            model_path: path.to_path_buf(),
        })
    }

    /// Path the model was loaded from
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Resize to the model resolution and scale to `[0, 1]` NHWC
    fn preprocess(image: &RgbImage) -> Array4<f32> {
        let resized = image::imageops::resize(image, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle);

        let mut input = Array4::<f32>::zeros((1, INPUT_HEIGHT as usize, INPUT_WIDTH as usize, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, y as usize, x as usize, c]] = pixel.0[c] as f32 / 255.0;
            }
        }
        input
    }

    /// Arg-max over the per-class output vector
    fn postprocess(scores: &[f32]) -> Result<Classification> {
        if scores.len() < CLASS_COUNT {
            return Err(ClassifierError::InferenceFailed(format!(
                "expected {} class scores, model produced {}",
                CLASS_COUNT,
                scores.len()
            )));
        }

        let (best_index, best_score) = scores
            .iter()
            .copied()
            .enumerate()
            .take(CLASS_COUNT)
            .fold((0, f32::NEG_INFINITY), |acc, (i, s)| {
                if s > acc.1 {
                    (i, s)
                } else {
                    acc
                }
            });

        let class = DefectClass::from_model_index(best_index).ok_or_else(|| {
            ClassifierError::InferenceFailed(format!("arg-max index {} out of range", best_index))
        })?;

        Ok(Classification {
            class,
            confidence: best_score.clamp(0.0, 1.0),
        })
    }
}

impl DefectClassifier for OnnxDefectClassifier {
    fn classify(&self, image: &RgbImage) -> Result<Classification> {
        let input = Self::preprocess(image);

        let input_tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| ClassifierError::InferenceFailed(e.to_string()))?;
        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];

        let mut session = self.session.lock().map_err(|_| {
            ClassifierError::InferenceFailed("classifier session lock poisoned".to_string())
        })?;

        let outputs = session
            .run(inputs)
            .map_err(|e| ClassifierError::InferenceFailed(e.to_string()))?;

        let (_, scores) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(e.to_string()))?;

        let result = Self::postprocess(scores)?;
        tracing::debug!(class = %result.class, confidence = result.confidence, "classified image");
        Ok(result)
    }
}
