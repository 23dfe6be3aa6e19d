//! Loop controller
//!
//! The classify-correct feedback loop. Each iteration classifies the current
//! image and, unless it is good, applies the operator bound to the reported
//! defect class, then classifies again. The loop is driven by a statistical
//! oracle, so a corrected class may reappear; a visited set of defect classes
//! forces termination the moment any class recurs. This bounds every run to
//! at most one correction per correctable class (4) regardless of classifier
//! behavior.
//!
//! Resolution bookkeeping on exit: every visited class is credited as
//! resolved except the class that triggered a cycle exit and any class whose
//! binding was disabled (pass-through corrections resolve nothing).

use std::collections::BTreeSet;
use tracing::debug;

use crate::classifier::{DefectClass, DefectClassifier};
use crate::registry::{MethodRegistry, ProcessingMode, ResolvedBinding};

use super::types::{DefectTally, LoopOutcome, PipelineError, Result, RunPolicy, TerminalReason};

// ============================================================
// Loop Controller
// ============================================================

/// Runs the classify-correct loop over single images
///
/// Holds only the oracle; registry and mode are passed into each run so UI
/// edits between runs never race an in-flight loop.
pub struct LoopController<C> {
    classifier: C,
}

impl<C: DefectClassifier> LoopController<C> {
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }

    /// The oracle this controller runs with
    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// One full correction pass over one image
    pub fn run(
        &self,
        image: &image::RgbImage,
        registry: &MethodRegistry,
        mode: ProcessingMode,
        policy: RunPolicy,
    ) -> Result<LoopOutcome> {
        match policy {
            RunPolicy::OneDefect => self.run_one_defect(image, registry, mode),
            RunPolicy::AllDefects => self.run_all_defects(image, registry, mode),
        }
    }

    /// Iterate until the image is classified good or a defect class recurs
    fn run_all_defects(
        &self,
        image: &image::RgbImage,
        registry: &MethodRegistry,
        mode: ProcessingMode,
    ) -> Result<LoopOutcome> {
        let mut seen = BTreeSet::new();
        let mut skipped = BTreeSet::new();
        let mut tally = DefectTally::new();
        let mut current = image.clone();
        let mut cycle_class = None;

        let terminal_reason = loop {
            let result = self.classifier.classify(&current)?;
            debug!(
                class = result.class.name(),
                confidence = result.confidence,
                corrections = seen.len(),
                "classified"
            );

            if result.class == DefectClass::Good {
                break TerminalReason::ReachedGood;
            }
            if seen.contains(&result.class) {
                cycle_class = Some(result.class);
                break TerminalReason::CycleDetected;
            }

            seen.insert(result.class);
            tally.record_detected(result.class);

            let binding = registry.resolve(mode, result.class)?;
            if binding.enabled {
                current = Self::correct(&current, result.class, &binding)?;
            } else {
                // Explicit pass-through: counted as detected, never resolved
                skipped.insert(result.class);
            }
        };

        for class in &seen {
            if skipped.contains(class) || cycle_class == Some(*class) {
                continue;
            }
            tally.record_resolved(*class);
        }

        Ok(LoopOutcome {
            image: current,
            tally,
            terminal_reason,
        })
    }

    /// Single best-guess correction with one verification classification
    fn run_one_defect(
        &self,
        image: &image::RgbImage,
        registry: &MethodRegistry,
        mode: ProcessingMode,
    ) -> Result<LoopOutcome> {
        let mut tally = DefectTally::new();

        let first = self.classifier.classify(image)?;
        debug!(
            class = first.class.name(),
            confidence = first.confidence,
            "classified"
        );
        if first.class == DefectClass::Good {
            return Ok(LoopOutcome {
                image: image.clone(),
                tally,
                terminal_reason: TerminalReason::NoDefectInitially,
            });
        }

        tally.record_detected(first.class);
        let binding = registry.resolve(mode, first.class)?;
        let corrected = if binding.enabled {
            Self::correct(image, first.class, &binding)?
        } else {
            image.clone()
        };

        let second = self.classifier.classify(&corrected)?;
        let terminal_reason = if second.class == DefectClass::Good {
            if binding.enabled {
                tally.record_resolved(first.class);
            }
            TerminalReason::ReachedGood
        } else {
            TerminalReason::CycleDetected
        };

        Ok(LoopOutcome {
            image: corrected,
            tally,
            terminal_reason,
        })
    }

    fn correct(
        image: &image::RgbImage,
        defect: DefectClass,
        binding: &ResolvedBinding,
    ) -> Result<image::RgbImage> {
        debug!(defect = defect.name(), operator = %binding.spec.id, "correcting");
        binding
            .spec
            .id
            .operator()
            .apply(image, &binding.params)
            .map_err(|source| PipelineError::CorrectionFailed {
                defect,
                operator: binding.spec.id,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classification, ClassifierError};
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;

    /// Oracle that replays a scripted class sequence
    struct ScriptedClassifier {
        script: Vec<DefectClass>,
        cursor: Mutex<usize>,
    }

    impl ScriptedClassifier {
        fn new(script: &[DefectClass]) -> Self {
            Self {
                script: script.to_vec(),
                cursor: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.cursor.lock().unwrap()
        }
    }

    impl DefectClassifier for ScriptedClassifier {
        fn classify(
            &self,
            _image: &RgbImage,
        ) -> std::result::Result<Classification, ClassifierError> {
            let mut cursor = self.cursor.lock().unwrap();
            let class = self
                .script
                .get(*cursor)
                .copied()
                .ok_or_else(|| ClassifierError::InferenceFailed("script exhausted".into()))?;
            *cursor += 1;
            Ok(Classification {
                class,
                confidence: 0.9,
            })
        }
    }

    fn test_image() -> RgbImage {
        let mut image = RgbImage::new(32, 32);
        for y in 0..32 {
            for x in 0..32 {
                let v = ((x * 7 + y * 3) % 200) as u8 + 20;
                image.put_pixel(x, y, Rgb([v, v / 2 + 40, 255 - v]));
            }
        }
        image
    }

    #[test]
    fn test_initially_good_all_defects() {
        let controller = LoopController::new(ScriptedClassifier::new(&[DefectClass::Good]));
        let registry = MethodRegistry::new();
        let image = test_image();

        let outcome = controller
            .run(
                &image,
                &registry,
                ProcessingMode::Automatic,
                RunPolicy::AllDefects,
            )
            .unwrap();
        assert_eq!(outcome.terminal_reason, TerminalReason::ReachedGood);
        assert!(outcome.tally.is_empty());
        assert_eq!(outcome.image, image);
    }

    #[test]
    fn test_initially_good_one_defect() {
        let controller = LoopController::new(ScriptedClassifier::new(&[DefectClass::Good]));
        let registry = MethodRegistry::new();
        let image = test_image();

        let outcome = controller
            .run(
                &image,
                &registry,
                ProcessingMode::Automatic,
                RunPolicy::OneDefect,
            )
            .unwrap();
        assert_eq!(outcome.terminal_reason, TerminalReason::NoDefectInitially);
        assert!(outcome.tally.is_empty());
        assert_eq!(outcome.image, image);
    }

    #[test]
    fn test_always_blur_cycles_after_one_correction() {
        let classifier =
            ScriptedClassifier::new(&[DefectClass::Blur, DefectClass::Blur, DefectClass::Blur]);
        let controller = LoopController::new(classifier);
        let registry = MethodRegistry::new();

        let outcome = controller
            .run(
                &test_image(),
                &registry,
                ProcessingMode::Automatic,
                RunPolicy::AllDefects,
            )
            .unwrap();
        assert_eq!(outcome.terminal_reason, TerminalReason::CycleDetected);
        let counts = outcome.tally.get(DefectClass::Blur);
        assert_eq!((counts.detected, counts.resolved), (1, 0));
        // Two classifications: the detection and the recurrence
        assert_eq!(controller.classifier.calls(), 2);
    }

    #[test]
    fn test_disabled_binding_passes_through_unresolved() {
        let classifier = ScriptedClassifier::new(&[DefectClass::Noise, DefectClass::Good]);
        let controller = LoopController::new(classifier);
        let mut registry = MethodRegistry::new();
        registry
            .set_enabled(ProcessingMode::Manual, DefectClass::Noise, false)
            .unwrap();
        let image = test_image();

        let outcome = controller
            .run(
                &image,
                &registry,
                ProcessingMode::Manual,
                RunPolicy::AllDefects,
            )
            .unwrap();
        assert_eq!(outcome.terminal_reason, TerminalReason::ReachedGood);
        let counts = outcome.tally.get(DefectClass::Noise);
        assert_eq!((counts.detected, counts.resolved), (1, 0));
        // Pass-through leaves the image untouched
        assert_eq!(outcome.image, image);
    }

    #[test]
    fn test_one_defect_unresolved() {
        let classifier = ScriptedClassifier::new(&[DefectClass::Contrast, DefectClass::Contrast]);
        let controller = LoopController::new(classifier);
        let registry = MethodRegistry::new();

        let outcome = controller
            .run(
                &test_image(),
                &registry,
                ProcessingMode::Automatic,
                RunPolicy::OneDefect,
            )
            .unwrap();
        assert_eq!(outcome.terminal_reason, TerminalReason::CycleDetected);
        let counts = outcome.tally.get(DefectClass::Contrast);
        assert_eq!((counts.detected, counts.resolved), (1, 0));
        assert_eq!(controller.classifier.calls(), 2);
    }

    #[test]
    fn test_classifier_failure_propagates() {
        let controller = LoopController::new(ScriptedClassifier::new(&[]));
        let registry = MethodRegistry::new();

        let result = controller.run(
            &test_image(),
            &registry,
            ProcessingMode::Automatic,
            RunPolicy::AllDefects,
        );
        assert!(matches!(result, Err(PipelineError::Classifier(_))));
    }
}
