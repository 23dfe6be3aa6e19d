//! Method registry
//!
//! Binds each correctable defect class to a currently selected operator and
//! its parameter values, in two parallel modes:
//!
//! - **Automatic** - fixed, system-chosen bindings. Operator selection is
//!   not editable; only the glare binding's parameters (the one case with a
//!   non-trivial parameter surface) may be adjusted.
//! - **Manual** - user-selectable operator per defect with user-editable
//!   parameters.
//!
//! Every edit is validated against the operator catalog at write time:
//! operator applicability, parameter names, and bounds/allowed-value sets.
//! Violations leave the prior binding unchanged. Resolution at loop time is
//! a pure lookup that cannot fail for a valid `(mode, defect)` pair.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::classifier::DefectClass;
use crate::operators::{catalog, spec_for, OperatorId, OperatorSpec, ParamSet, ParamValue};

// ============================================================
// Error Types
// ============================================================

/// Registry error types
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid parameter {param}: {reason}")]
    InvalidParameter { param: String, reason: String },

    #[error("Operator {operator} does not apply to defect class {defect}")]
    OperatorNotApplicable {
        operator: OperatorId,
        defect: DefectClass,
    },

    #[error("Automatic bindings are fixed; only glare parameters are editable")]
    AutomaticBindingLocked,

    #[error("No binding registered for defect class {0}")]
    UnsupportedDefectClass(DefectClass),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

// ============================================================
// Core Data Structures
// ============================================================

/// Processing mode selecting which binding table the loop consults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    Automatic,
    Manual,
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingMode::Automatic => f.write_str("automatic"),
            ProcessingMode::Manual => f.write_str("manual"),
        }
    }
}

/// The currently selected operator and parameters for one defect class
///
/// `enabled = false` is the explicit "do not correct this defect" choice:
/// the loop still counts the detection but passes the image through.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBinding {
    pub operator: OperatorId,
    pub params: ParamSet,
    pub enabled: bool,
}

impl MethodBinding {
    fn defaults_for(operator: OperatorId) -> Self {
        Self {
            operator,
            params: spec_for(operator).default_params(),
            enabled: true,
        }
    }
}

/// A binding resolved for one loop iteration
#[derive(Debug, Clone)]
pub struct ResolvedBinding {
    pub spec: &'static OperatorSpec,
    pub params: ParamSet,
    pub enabled: bool,
}

// ============================================================
// Registry
// ============================================================

/// Binding tables for both processing modes
#[derive(Debug, Clone)]
pub struct MethodRegistry {
    automatic: BTreeMap<DefectClass, MethodBinding>,
    manual: BTreeMap<DefectClass, MethodBinding>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodRegistry {
    /// Registry with the documented default bindings in both modes
    ///
    /// The automatic defaults are the system-chosen fixed methods: unsharp
    /// mask for blur, YUV histogram equalization for contrast,
    /// brightness-mask glare inpainting, and the adaptive mean filter with
    /// the dedicated noise estimator.
    pub fn new() -> Self {
        let automatic = Self::default_bindings();
        let manual = automatic.clone();
        Self { automatic, manual }
    }

    fn default_bindings() -> BTreeMap<DefectClass, MethodBinding> {
        let mut noise = MethodBinding::defaults_for(OperatorId::AdaptiveMean);
        noise
            .params
            .set("estimator", ParamValue::Choice("immerkaer".to_string()));

        BTreeMap::from([
            (
                DefectClass::Blur,
                MethodBinding::defaults_for(OperatorId::UnsharpMask),
            ),
            (
                DefectClass::Contrast,
                MethodBinding::defaults_for(OperatorId::HistEqualization),
            ),
            (
                DefectClass::Glares,
                MethodBinding::defaults_for(OperatorId::GlareInpaint),
            ),
            (DefectClass::Noise, noise),
        ])
    }

    fn table(&self, mode: ProcessingMode) -> &BTreeMap<DefectClass, MethodBinding> {
        match mode {
            ProcessingMode::Automatic => &self.automatic,
            ProcessingMode::Manual => &self.manual,
        }
    }

    fn table_mut(&mut self, mode: ProcessingMode) -> &mut BTreeMap<DefectClass, MethodBinding> {
        match mode {
            ProcessingMode::Automatic => &mut self.automatic,
            ProcessingMode::Manual => &mut self.manual,
        }
    }

    /// Pure lookup of the operator and parameters for one defect class
    ///
    /// Total for every correctable class; the `UnsupportedDefectClass` path
    /// is defensive and indicates registry misconfiguration.
    pub fn resolve(&self, mode: ProcessingMode, defect: DefectClass) -> Result<ResolvedBinding> {
        let binding = self
            .table(mode)
            .get(&defect)
            .ok_or(RegistryError::UnsupportedDefectClass(defect))?;
        Ok(ResolvedBinding {
            spec: spec_for(binding.operator),
            params: binding.params.clone(),
            enabled: binding.enabled,
        })
    }

    /// Read projection of one mode's binding table
    pub fn get_bindings(&self, mode: ProcessingMode) -> &BTreeMap<DefectClass, MethodBinding> {
        self.table(mode)
    }

    /// Replace one binding after full validation (atomic)
    pub fn set_binding(
        &mut self,
        mode: ProcessingMode,
        defect: DefectClass,
        operator: OperatorId,
        params: ParamSet,
    ) -> Result<()> {
        let binding = Self::validate_binding(mode, defect, operator, params, self.table(mode))?;
        self.table_mut(mode).insert(defect, binding);
        Ok(())
    }

    /// Replace several bindings at once; one invalid entry rejects them all
    pub fn set_bindings(
        &mut self,
        mode: ProcessingMode,
        edits: BTreeMap<DefectClass, (OperatorId, ParamSet)>,
    ) -> Result<()> {
        let mut staged = Vec::with_capacity(edits.len());
        for (defect, (operator, params)) in edits {
            let binding =
                Self::validate_binding(mode, defect, operator, params, self.table(mode))?;
            staged.push((defect, binding));
        }
        let table = self.table_mut(mode);
        for (defect, binding) in staged {
            table.insert(defect, binding);
        }
        Ok(())
    }

    /// Toggle the explicit "do not correct" choice for one defect class
    pub fn set_enabled(
        &mut self,
        mode: ProcessingMode,
        defect: DefectClass,
        enabled: bool,
    ) -> Result<()> {
        let binding = self
            .table_mut(mode)
            .get_mut(&defect)
            .ok_or(RegistryError::UnsupportedDefectClass(defect))?;
        binding.enabled = enabled;
        Ok(())
    }

    /// Discrete allowed-value sets of every choice parameter, keyed by
    /// parameter name, for UI population
    pub fn get_allowed_values() -> BTreeMap<String, Vec<String>> {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for spec in catalog() {
            for param in &spec.schema {
                if let crate::operators::ParamKind::Choice { allowed } = &param.kind {
                    let entry = values.entry(param.name.to_string()).or_default();
                    for value in *allowed {
                        if !entry.iter().any(|v| v == value) {
                            entry.push(value.to_string());
                        }
                    }
                }
            }
        }
        values
    }

    /// Validate one edit without touching registry state
    ///
    /// Unknown parameter names and out-of-bounds active values are rejected;
    /// inactive dependent parameters are stored without consistency checks.
    /// Parameters absent from the edit are filled from the schema defaults.
    fn validate_binding(
        mode: ProcessingMode,
        defect: DefectClass,
        operator: OperatorId,
        params: ParamSet,
        current: &BTreeMap<DefectClass, MethodBinding>,
    ) -> Result<MethodBinding> {
        let spec = spec_for(operator);
        if spec.applicable_defect != defect {
            return Err(RegistryError::OperatorNotApplicable { operator, defect });
        }

        if mode == ProcessingMode::Automatic {
            // Automatic operator selection is fixed; only the glare
            // binding's parameters are adjustable.
            let locked = current
                .get(&defect)
                .map(|b| b.operator != operator)
                .unwrap_or(true);
            if locked || defect != DefectClass::Glares {
                return Err(RegistryError::AutomaticBindingLocked);
            }
        }

        let mut merged = spec.default_params();
        for (name, value) in &params.0 {
            if spec.param(name).is_none() {
                return Err(RegistryError::InvalidParameter {
                    param: name.clone(),
                    reason: format!("unknown parameter for operator {}", operator),
                });
            }
            merged.set(name.clone(), value.clone());
        }

        for param in &spec.schema {
            if !spec.is_active(param.name, &merged) {
                continue;
            }
            let Some(value) = merged.get(param.name) else {
                continue;
            };
            if !param.accepts(value) {
                return Err(RegistryError::InvalidParameter {
                    param: param.name.to_string(),
                    reason: format!("value {} outside declared bounds", value),
                });
            }
        }

        Ok(MethodBinding {
            operator,
            params: merged,
            enabled: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve_for_every_pair() {
        let registry = MethodRegistry::new();
        for mode in [ProcessingMode::Automatic, ProcessingMode::Manual] {
            for defect in DefectClass::correctable() {
                let resolved = registry.resolve(mode, defect).unwrap();
                assert_eq!(resolved.spec.applicable_defect, defect);
                assert!(resolved.enabled);
            }
        }
    }

    #[test]
    fn test_automatic_defaults_match_fixed_methods() {
        let registry = MethodRegistry::new();
        let bindings = registry.get_bindings(ProcessingMode::Automatic);
        assert_eq!(
            bindings[&DefectClass::Blur].operator,
            OperatorId::UnsharpMask
        );
        assert_eq!(
            bindings[&DefectClass::Contrast].operator,
            OperatorId::HistEqualization
        );
        assert_eq!(
            bindings[&DefectClass::Glares].operator,
            OperatorId::GlareInpaint
        );
        assert_eq!(
            bindings[&DefectClass::Noise].operator,
            OperatorId::AdaptiveMean
        );
    }

    #[test]
    fn test_set_binding_rejects_inapplicable_operator() {
        let mut registry = MethodRegistry::new();
        let result = registry.set_binding(
            ProcessingMode::Manual,
            DefectClass::Blur,
            OperatorId::NlMeans,
            ParamSet::new(),
        );
        assert!(matches!(
            result,
            Err(RegistryError::OperatorNotApplicable { .. })
        ));
    }

    #[test]
    fn test_set_binding_rejects_unknown_parameter() {
        let mut registry = MethodRegistry::new();
        let mut params = ParamSet::new();
        params.set("no_such_param", ParamValue::Int(1));

        let result = registry.set_binding(
            ProcessingMode::Manual,
            DefectClass::Blur,
            OperatorId::UnsharpMask,
            params,
        );
        assert!(matches!(
            result,
            Err(RegistryError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_set_binding_rejects_out_of_bounds_value() {
        let mut registry = MethodRegistry::new();
        let before = registry.get_bindings(ProcessingMode::Manual).clone();

        let mut params = ParamSet::new();
        params.set("sigma", ParamValue::Float(99.0));
        let result = registry.set_binding(
            ProcessingMode::Manual,
            DefectClass::Blur,
            OperatorId::UnsharpMask,
            params,
        );
        assert!(matches!(
            result,
            Err(RegistryError::InvalidParameter { .. })
        ));
        // Prior binding retained
        assert_eq!(registry.get_bindings(ProcessingMode::Manual), &before);
    }

    #[test]
    fn test_inactive_dependent_parameter_not_validated() {
        let mut registry = MethodRegistry::new();
        let mut params = ParamSet::new();
        // mask_mode=brightness leaves the gradient parameters inactive, so a
        // stale out-of-bounds gradient_threshold is stored without complaint
        params.set(
            "mask_mode",
            ParamValue::Choice("brightness".to_string()),
        );
        params.set("gradient_threshold", ParamValue::Int(999));

        registry
            .set_binding(
                ProcessingMode::Manual,
                DefectClass::Glares,
                OperatorId::GlareInpaint,
                params.clone(),
            )
            .unwrap();

        // Activating the dependency makes the same value a violation
        params.set("mask_mode", ParamValue::Choice("combine".to_string()));
        let result = registry.set_binding(
            ProcessingMode::Manual,
            DefectClass::Glares,
            OperatorId::GlareInpaint,
            params,
        );
        assert!(matches!(
            result,
            Err(RegistryError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_set_bindings_atomicity() {
        let mut registry = MethodRegistry::new();
        let before = registry.get_bindings(ProcessingMode::Manual).clone();

        let mut valid = ParamSet::new();
        valid.set("coeff", ParamValue::Float(2.0));
        let mut invalid = ParamSet::new();
        invalid.set("clip_limit", ParamValue::Float(500.0));

        let edits = BTreeMap::from([
            (DefectClass::Blur, (OperatorId::LaplacianSharpen, valid)),
            (DefectClass::Contrast, (OperatorId::Clahe, invalid)),
        ]);
        let result = registry.set_bindings(ProcessingMode::Manual, edits);
        assert!(result.is_err());
        // The valid edit in the same call must not have landed either
        assert_eq!(registry.get_bindings(ProcessingMode::Manual), &before);
    }

    #[test]
    fn test_automatic_mode_locked_except_glare_params() {
        let mut registry = MethodRegistry::new();

        // Operator swap in automatic mode is rejected
        let result = registry.set_binding(
            ProcessingMode::Automatic,
            DefectClass::Blur,
            OperatorId::LaplacianSharpen,
            ParamSet::new(),
        );
        assert!(matches!(
            result,
            Err(RegistryError::AutomaticBindingLocked)
        ));

        // Parameter edit on a non-glare automatic binding is rejected
        let mut params = ParamSet::new();
        params.set("sigma", ParamValue::Float(2.0));
        let result = registry.set_binding(
            ProcessingMode::Automatic,
            DefectClass::Blur,
            OperatorId::UnsharpMask,
            params,
        );
        assert!(matches!(
            result,
            Err(RegistryError::AutomaticBindingLocked)
        ));

        // Glare parameters are the documented exception
        let mut params = ParamSet::new();
        params.set("threshold", ParamValue::Int(180));
        registry
            .set_binding(
                ProcessingMode::Automatic,
                DefectClass::Glares,
                OperatorId::GlareInpaint,
                params,
            )
            .unwrap();
        let resolved = registry
            .resolve(ProcessingMode::Automatic, DefectClass::Glares)
            .unwrap();
        assert_eq!(resolved.params.int("threshold").unwrap(), 180);
    }

    #[test]
    fn test_set_enabled_round_trip() {
        let mut registry = MethodRegistry::new();
        registry
            .set_enabled(ProcessingMode::Manual, DefectClass::Noise, false)
            .unwrap();
        let resolved = registry
            .resolve(ProcessingMode::Manual, DefectClass::Noise)
            .unwrap();
        assert!(!resolved.enabled);
    }

    #[test]
    fn test_missing_params_filled_from_defaults() {
        let mut registry = MethodRegistry::new();
        let mut params = ParamSet::new();
        params.set("sigma", ParamValue::Float(1.5));
        registry
            .set_binding(
                ProcessingMode::Manual,
                DefectClass::Blur,
                OperatorId::UnsharpMask,
                params,
            )
            .unwrap();

        let resolved = registry
            .resolve(ProcessingMode::Manual, DefectClass::Blur)
            .unwrap();
        assert_eq!(resolved.params.float("sigma").unwrap(), 1.5);
        assert_eq!(resolved.params.float("positive_coeff").unwrap(), 2.5);
    }

    #[test]
    fn test_allowed_values_projection() {
        let values = MethodRegistry::get_allowed_values();
        assert_eq!(
            values["color_space"],
            vec!["hsv".to_string(), "yuv".to_string()]
        );
        assert!(values["mask_mode"].contains(&"combine".to_string()));
        assert!(values["estimator"].contains(&"immerkaer".to_string()));
        // Numeric parameters carry no discrete sets
        assert!(!values.contains_key("sigma"));
    }
}
