//! Correction operator core types
//!
//! Defines the parameter schema machinery, the closed operator enumeration,
//! the static catalog of operator specs, and the trait every correction
//! operator implements. The restoration loop only ever calls
//! [`CorrectionOperator::apply`]; everything else here exists so the registry
//! can validate edits at write time and the UI layer can enumerate choices.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

use crate::classifier::DefectClass;

// ============================================================
// Error Types
// ============================================================

/// Operator execution error types
///
/// Raised at `apply` time only; schema violations are caught earlier by the
/// registry and never reach an operator.
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Parameter {name} has unexpected type (expected {expected})")]
    WrongParameterType { name: String, expected: &'static str },

    #[error("Degenerate image: {0}")]
    DegenerateImage(String),
}

pub type Result<T> = std::result::Result<T, OperatorError>;

// ============================================================
// Parameter Values
// ============================================================

/// A single parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Choice(String),
}

impl ParamValue {
    /// Human-readable type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Choice(_) => "choice",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Choice(v) => f.write_str(v),
        }
    }
}

/// Named parameter values for one operator invocation
///
/// The registry materializes every schema parameter with its default when a
/// binding is created, so operators can rely on presence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSet(pub BTreeMap<String, ParamValue>);

impl ParamSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn set(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Fetch a float parameter, accepting an int value where a float is expected
    pub fn float(&self, name: &str) -> Result<f64> {
        match self.0.get(name) {
            Some(ParamValue::Float(v)) => Ok(*v),
            Some(ParamValue::Int(v)) => Ok(*v as f64),
            Some(other) => Err(OperatorError::WrongParameterType {
                name: name.to_string(),
                expected: other.type_name(),
            }),
            None => Err(OperatorError::MissingParameter(name.to_string())),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        match self.0.get(name) {
            Some(ParamValue::Int(v)) => Ok(*v),
            Some(_) => Err(OperatorError::WrongParameterType {
                name: name.to_string(),
                expected: "int",
            }),
            None => Err(OperatorError::MissingParameter(name.to_string())),
        }
    }

    pub fn choice(&self, name: &str) -> Result<&str> {
        match self.0.get(name) {
            Some(ParamValue::Choice(v)) => Ok(v.as_str()),
            Some(_) => Err(OperatorError::WrongParameterType {
                name: name.to_string(),
                expected: "choice",
            }),
            None => Err(OperatorError::MissingParameter(name.to_string())),
        }
    }
}

// ============================================================
// Parameter Schema
// ============================================================

/// Declared kind and bounds of one parameter
#[derive(Debug, Clone)]
pub enum ParamKind {
    /// Integer with inclusive bounds
    Int { min: i64, max: i64 },

    /// Float with inclusive bounds
    Float { min: f64, max: f64 },

    /// One of a fixed set of string values
    Choice { allowed: &'static [&'static str] },
}

/// Visibility/validation dependency on another parameter
///
/// The parameter is only "active" when `param`'s current value is one of
/// `values`. Inactive parameters are stored but not validated.
#[derive(Debug, Clone)]
pub struct ParamDependency {
    pub param: &'static str,
    pub values: &'static [&'static str],
}

/// Schema entry for one named parameter
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: ParamValue,
    pub depends_on: Option<ParamDependency>,
}

impl ParamSpec {
    fn int(name: &'static str, min: i64, max: i64, default: i64) -> Self {
        Self {
            name,
            kind: ParamKind::Int { min, max },
            default: ParamValue::Int(default),
            depends_on: None,
        }
    }

    fn float(name: &'static str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name,
            kind: ParamKind::Float { min, max },
            default: ParamValue::Float(default),
            depends_on: None,
        }
    }

    fn choice(name: &'static str, allowed: &'static [&'static str], default: &str) -> Self {
        Self {
            name,
            kind: ParamKind::Choice { allowed },
            default: ParamValue::Choice(default.to_string()),
            depends_on: None,
        }
    }

    fn when(mut self, param: &'static str, values: &'static [&'static str]) -> Self {
        self.depends_on = Some(ParamDependency { param, values });
        self
    }

    /// Check one value against the declared kind and bounds
    pub fn accepts(&self, value: &ParamValue) -> bool {
        match (&self.kind, value) {
            (ParamKind::Int { min, max }, ParamValue::Int(v)) => (*min..=*max).contains(v),
            (ParamKind::Float { min, max }, ParamValue::Float(v)) => {
                *v >= *min && *v <= *max
            }
            (ParamKind::Float { min, max }, ParamValue::Int(v)) => {
                let f = *v as f64;
                f >= *min && f <= *max
            }
            (ParamKind::Choice { allowed }, ParamValue::Choice(v)) => {
                allowed.contains(&v.as_str())
            }
            _ => false,
        }
    }
}

// ============================================================
// Operator Identity and Spec
// ============================================================

/// Closed enumeration of catalog operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorId {
    UnsharpMask,
    LaplacianSharpen,
    HistEqualization,
    Clahe,
    GlareInpaint,
    AdaptiveGlareInpaint,
    AdaptiveMean,
    AdaptiveMedian,
    AdaptiveGaussian,
    WaveletDenoise,
    NlMeans,
}

impl OperatorId {
    /// All catalog operators
    pub fn all() -> [OperatorId; 11] {
        [
            OperatorId::UnsharpMask,
            OperatorId::LaplacianSharpen,
            OperatorId::HistEqualization,
            OperatorId::Clahe,
            OperatorId::GlareInpaint,
            OperatorId::AdaptiveGlareInpaint,
            OperatorId::AdaptiveMean,
            OperatorId::AdaptiveMedian,
            OperatorId::AdaptiveGaussian,
            OperatorId::WaveletDenoise,
            OperatorId::NlMeans,
        ]
    }

    /// Stable snake_case name, as used in configuration files
    pub fn name(&self) -> &'static str {
        match self {
            OperatorId::UnsharpMask => "unsharp_mask",
            OperatorId::LaplacianSharpen => "laplacian_sharpen",
            OperatorId::HistEqualization => "hist_equalization",
            OperatorId::Clahe => "clahe",
            OperatorId::GlareInpaint => "glare_inpaint",
            OperatorId::AdaptiveGlareInpaint => "adaptive_glare_inpaint",
            OperatorId::AdaptiveMean => "adaptive_mean",
            OperatorId::AdaptiveMedian => "adaptive_median",
            OperatorId::AdaptiveGaussian => "adaptive_gaussian",
            OperatorId::WaveletDenoise => "wavelet_denoise",
            OperatorId::NlMeans => "nl_means",
        }
    }

    /// Parse a configuration-file operator name
    pub fn parse(name: &str) -> Option<OperatorId> {
        OperatorId::all().into_iter().find(|id| id.name() == name)
    }

    /// The stateless operator implementation behind this id
    pub fn operator(&self) -> &'static dyn CorrectionOperator {
        use crate::operators::{contrast, denoise, glare, sharpen};

        match self {
            OperatorId::UnsharpMask => &sharpen::UnsharpMask,
            OperatorId::LaplacianSharpen => &sharpen::LaplacianSharpen,
            OperatorId::HistEqualization => &contrast::HistEqualization,
            OperatorId::Clahe => &contrast::Clahe,
            OperatorId::GlareInpaint => &glare::GlareInpaint,
            OperatorId::AdaptiveGlareInpaint => &glare::AdaptiveGlareInpaint,
            OperatorId::AdaptiveMean => &denoise::AdaptiveMean,
            OperatorId::AdaptiveMedian => &denoise::AdaptiveMedian,
            OperatorId::AdaptiveGaussian => &denoise::AdaptiveGaussian,
            OperatorId::WaveletDenoise => &denoise::WaveletDenoise,
            OperatorId::NlMeans => &denoise::NlMeans,
        }
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static catalog entry: identity, applicability, parameter schema
#[derive(Debug, Clone)]
pub struct OperatorSpec {
    pub id: OperatorId,
    pub applicable_defect: DefectClass,
    pub schema: Vec<ParamSpec>,
}

impl OperatorSpec {
    /// Look up one schema entry by name
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.schema.iter().find(|p| p.name == name)
    }

    /// Materialize every parameter with its default value
    pub fn default_params(&self) -> ParamSet {
        let mut params = ParamSet::new();
        for spec in &self.schema {
            params.set(spec.name, spec.default.clone());
        }
        params
    }

    /// Whether `name` is currently active given the other values in `params`
    ///
    /// A parameter with a dependency is active only when the parameter it
    /// depends on holds one of the listed values.
    pub fn is_active(&self, name: &str, params: &ParamSet) -> bool {
        let Some(spec) = self.param(name) else {
            return false;
        };
        match &spec.depends_on {
            None => true,
            Some(dep) => match params.get(dep.param) {
                Some(ParamValue::Choice(v)) => dep.values.contains(&v.as_str()),
                _ => false,
            },
        }
    }
}

// ============================================================
// Operator Trait
// ============================================================

/// A pure image-transform function addressing one defect class
///
/// Implementations hold no state and never mutate their input.
pub trait CorrectionOperator: Sync {
    /// Apply the correction, returning a new image
    fn apply(&self, image: &RgbImage, params: &ParamSet) -> Result<RgbImage>;
}

// ============================================================
// Catalog
// ============================================================

/// The full operator catalog, built once per process
pub fn catalog() -> &'static [OperatorSpec] {
    static CATALOG: OnceLock<Vec<OperatorSpec>> = OnceLock::new();
    CATALOG.get_or_init(build_catalog)
}

/// Catalog entry for one operator id
pub fn spec_for(id: OperatorId) -> &'static OperatorSpec {
    // The catalog covers every OperatorId variant; see test_catalog_complete.
    catalog()
        .iter()
        .find(|s| s.id == id)
        .expect("catalog covers every operator id")
}

const COLOR_SPACES: &[&str] = &["hsv", "yuv"];
const MASK_SPACES: &[&str] = &["gray", "hsv", "yuv"];
const MASK_MODES: &[&str] = &["brightness", "gradient", "combine"];
const GRADIENT_MASK_MODES: &[&str] = &["gradient", "combine"];
const GRADIENT_METHODS: &[&str] = &["sobel", "scharr", "laplacian"];
const INPAINT_METHODS: &[&str] = &["diffusion", "telea"];
const ADAPTIVE_METHODS: &[&str] = &["mean", "gaussian"];
const NOISE_ESTIMATORS: &[&str] = &["blur_residual", "immerkaer"];
const WAVELET_ESTIMATORS: &[&str] = &["blur_residual", "detail_mad", "immerkaer"];
const WAVELETS: &[&str] = &["haar", "db2"];
const SHRINK_MODES: &[&str] = &["soft", "hard"];

fn build_catalog() -> Vec<OperatorSpec> {
    vec![
        OperatorSpec {
            id: OperatorId::UnsharpMask,
            applicable_defect: DefectClass::Blur,
            schema: vec![
                ParamSpec::float("sigma", 0.1, 10.0, 3.0),
                ParamSpec::float("positive_coeff", 1.0, 5.0, 2.5),
                ParamSpec::float("negative_coeff", -4.0, 0.0, -1.5),
            ],
        },
        OperatorSpec {
            id: OperatorId::LaplacianSharpen,
            applicable_defect: DefectClass::Blur,
            schema: vec![ParamSpec::float("coeff", 0.1, 10.0, 3.0)],
        },
        OperatorSpec {
            id: OperatorId::HistEqualization,
            applicable_defect: DefectClass::Contrast,
            schema: vec![ParamSpec::choice("color_space", COLOR_SPACES, "yuv")],
        },
        OperatorSpec {
            id: OperatorId::Clahe,
            applicable_defect: DefectClass::Contrast,
            schema: vec![
                ParamSpec::choice("color_space", COLOR_SPACES, "yuv"),
                ParamSpec::float("clip_limit", 1.0, 40.0, 2.0),
                ParamSpec::int("tile_grid_size", 2, 64, 8),
            ],
        },
        OperatorSpec {
            id: OperatorId::GlareInpaint,
            applicable_defect: DefectClass::Glares,
            schema: vec![
                ParamSpec::choice("mask_space", MASK_SPACES, "gray"),
                ParamSpec::choice("mask_mode", MASK_MODES, "brightness"),
                ParamSpec::int("threshold", 0, 255, 200),
                ParamSpec::choice("gradient_method", GRADIENT_METHODS, "sobel")
                    .when("mask_mode", GRADIENT_MASK_MODES),
                ParamSpec::int("gradient_threshold", 0, 255, 50)
                    .when("mask_mode", GRADIENT_MASK_MODES),
                ParamSpec::int("inpaint_radius", 1, 20, 3),
                ParamSpec::choice("inpaint_method", INPAINT_METHODS, "diffusion"),
            ],
        },
        OperatorSpec {
            id: OperatorId::AdaptiveGlareInpaint,
            applicable_defect: DefectClass::Glares,
            schema: vec![
                ParamSpec::choice("mask_space", MASK_SPACES, "gray"),
                ParamSpec::choice("mask_mode", MASK_MODES, "brightness"),
                ParamSpec::choice("adaptive_method", ADAPTIVE_METHODS, "gaussian"),
                ParamSpec::int("block_size", 3, 51, 11),
                ParamSpec::float("offset", -20.0, 20.0, 2.0),
                ParamSpec::choice("gradient_method", GRADIENT_METHODS, "sobel")
                    .when("mask_mode", GRADIENT_MASK_MODES),
                ParamSpec::int("gradient_threshold", 0, 255, 50)
                    .when("mask_mode", GRADIENT_MASK_MODES),
                ParamSpec::int("inpaint_radius", 1, 20, 3),
                ParamSpec::choice("inpaint_method", INPAINT_METHODS, "diffusion"),
            ],
        },
        OperatorSpec {
            id: OperatorId::AdaptiveMean,
            applicable_defect: DefectClass::Noise,
            schema: vec![
                ParamSpec::choice("estimator", NOISE_ESTIMATORS, "blur_residual"),
                ParamSpec::float("sigma", 0.5, 10.0, 3.0)
                    .when("estimator", &["blur_residual"]),
            ],
        },
        OperatorSpec {
            id: OperatorId::AdaptiveMedian,
            applicable_defect: DefectClass::Noise,
            schema: vec![
                ParamSpec::choice("estimator", NOISE_ESTIMATORS, "blur_residual"),
                ParamSpec::float("sigma", 0.5, 10.0, 3.0)
                    .when("estimator", &["blur_residual"]),
            ],
        },
        OperatorSpec {
            id: OperatorId::AdaptiveGaussian,
            applicable_defect: DefectClass::Noise,
            schema: vec![
                ParamSpec::choice("estimator", NOISE_ESTIMATORS, "blur_residual"),
                ParamSpec::float("sigma", 0.5, 10.0, 3.0)
                    .when("estimator", &["blur_residual"]),
            ],
        },
        OperatorSpec {
            id: OperatorId::WaveletDenoise,
            applicable_defect: DefectClass::Noise,
            schema: vec![
                ParamSpec::choice("wavelet", WAVELETS, "haar"),
                ParamSpec::choice("mode", SHRINK_MODES, "soft"),
                ParamSpec::int("levels", 1, 5, 2),
                ParamSpec::choice("estimator", WAVELET_ESTIMATORS, "detail_mad"),
                ParamSpec::float("sigma", 0.5, 10.0, 3.0)
                    .when("estimator", &["blur_residual"]),
            ],
        },
        OperatorSpec {
            id: OperatorId::NlMeans,
            applicable_defect: DefectClass::Noise,
            schema: vec![
                ParamSpec::float("h", 1.0, 30.0, 10.0),
                ParamSpec::int("template_window_size", 3, 15, 7),
                ParamSpec::int("search_window_size", 7, 35, 21),
            ],
        },
    ]
}
