//! Restoration loop core types
//!
//! Outcome and tally types shared by the loop controller and the batch
//! drivers, plus the pipeline error taxonomy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::classifier::{ClassifierError, DefectClass};
use crate::operators::{OperatorError, OperatorId};
use crate::registry::RegistryError;

// ============================================================
// Error Types
// ============================================================

/// Pipeline error types
///
/// Classifier errors are fatal for all processing; a correction failure
/// aborts the current item's run only, and batch drivers decide per-item
/// skip versus abort.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Correction failed for {defect} via {operator}: {source}")]
    CorrectionFailed {
        defect: DefectClass,
        operator: OperatorId,
        source: OperatorError,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// ============================================================
// Core Data Structures
// ============================================================

/// How many corrections one run may attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPolicy {
    /// Single best-guess correction, then one verification classification
    OneDefect,

    /// Iterate until classified good or a defect class recurs
    AllDefects,
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// The image was classified good after at least one correction
    ReachedGood,

    /// A previously corrected defect class was reported again
    CycleDetected,

    /// The image was classified good before any correction
    NoDefectInitially,
}

impl TerminalReason {
    pub fn name(&self) -> &'static str {
        match self {
            TerminalReason::ReachedGood => "reached_good",
            TerminalReason::CycleDetected => "cycle_detected",
            TerminalReason::NoDefectInitially => "no_defect_initially",
        }
    }
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Detected/resolved counters for one defect class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DefectCounts {
    pub detected: u32,
    pub resolved: u32,
}

/// Per-class counters of detections and resolutions
///
/// Invariant: `resolved <= detected` for every class. Classes never
/// detected carry no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DefectTally(pub BTreeMap<DefectClass, DefectCounts>);

impl DefectTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_detected(&mut self, class: DefectClass) {
        self.0.entry(class).or_default().detected += 1;
    }

    pub fn record_resolved(&mut self, class: DefectClass) {
        self.0.entry(class).or_default().resolved += 1;
    }

    pub fn get(&self, class: DefectClass) -> DefectCounts {
        self.0.get(&class).copied().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Element-wise sum of another tally into this one
    pub fn merge(&mut self, other: &DefectTally) {
        for (class, counts) in &other.0 {
            let entry = self.0.entry(*class).or_default();
            entry.detected += counts.detected;
            entry.resolved += counts.resolved;
        }
    }
}

impl fmt::Display for DefectTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no defects");
        }
        let mut first = true;
        for (class, counts) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}/{}", class, counts.resolved, counts.detected)?;
            first = false;
        }
        Ok(())
    }
}

/// Result of one full correction pass over one image
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub image: image::RgbImage,
    pub tally: DefectTally,
    pub terminal_reason: TerminalReason,
}
