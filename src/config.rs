//! Configuration file support
//!
//! TOML configuration for method bindings and run defaults. Binding tables
//! are applied to a registry through its atomic edit path, so a single bad
//! entry rejects the whole file and the registry keeps its defaults.
//!
//! ```toml
//! mode = "manual"
//! policy = "all_defects"
//!
//! [manual.blur]
//! operator = "laplacian_sharpen"
//! params = { coeff = 2.0 }
//!
//! [manual.noise]
//! operator = "wavelet_denoise"
//! enabled = true
//! params = { wavelet = "db2", levels = 3 }
//!
//! [automatic.glares]
//! operator = "glare_inpaint"
//! params = { threshold = 180 }
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::classifier::DefectClass;
use crate::operators::{OperatorId, ParamSet, ParamValue};
use crate::pipeline::RunPolicy;
use crate::registry::{MethodRegistry, ProcessingMode, RegistryError};

// ============================================================
// Error Types
// ============================================================

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config binding rejected: {0}")]
    Rejected(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

// ============================================================
// Configuration Structure
// ============================================================

/// One configured binding
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingConfig {
    pub operator: OperatorId,

    /// Omitted parameters keep their schema defaults
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Top-level configuration file contents
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Default processing mode for runs started without an explicit mode
    pub mode: Option<ProcessingMode>,

    /// Default run policy
    pub policy: Option<RunPolicy>,

    /// Manual-mode binding overrides, keyed by defect class
    #[serde(default)]
    pub manual: BTreeMap<DefectClass, BindingConfig>,

    /// Automatic-mode overrides; only glare parameters pass validation
    #[serde(default)]
    pub automatic: BTreeMap<DefectClass, BindingConfig>,
}

impl Config {
    /// Parse a configuration file
    pub fn load_from_path(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Apply the binding tables to a registry
    ///
    /// Each mode's table is committed atomically; on rejection the registry
    /// is left exactly as it was.
    pub fn apply_to(&self, registry: &mut MethodRegistry) -> Result<()> {
        for (mode, table) in [
            (ProcessingMode::Manual, &self.manual),
            (ProcessingMode::Automatic, &self.automatic),
        ] {
            if table.is_empty() {
                continue;
            }
            let mut edits = BTreeMap::new();
            for (defect, binding) in table {
                let mut params = ParamSet::new();
                for (name, value) in &binding.params {
                    params.set(name.clone(), value.clone());
                }
                edits.insert(*defect, (binding.operator, params));
            }
            registry.set_bindings(mode, edits)?;
            for (defect, binding) in table {
                registry.set_enabled(mode, *defect, binding.enabled)?;
            }
        }
        Ok(())
    }
}
