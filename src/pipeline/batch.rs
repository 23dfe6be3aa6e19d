//! Batch and stream drivers
//!
//! Apply the loop controller to every frame of a decoded video stream or to
//! every file of a directory dataset, strictly in order, aggregating tallies
//! across items. Each item's run is fully independent; an item failure never
//! corrupts another item's run.
//!
//! Failure policy: a classifier error aborts the whole batch (no classifier
//! means no further item can run either). A decode failure or a correction
//! failure skips the item and records it, so failed items are
//! distinguishable from "already good" items in the report.

use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

use crate::classifier::DefectClassifier;
use crate::registry::{MethodRegistry, ProcessingMode};

use super::controller::LoopController;
use super::types::{DefectTally, LoopOutcome, PipelineError, Result, RunPolicy};

// ============================================================
// Stream Driver
// ============================================================

/// Run the loop over a stream of decoded frames, lazily
///
/// Yields one outcome per frame, in input order. Frame decoding and codec
/// handling are the caller's responsibility; restarting means recreating
/// the frame source and calling again.
pub fn run_on_frames<'a, C, I>(
    controller: &'a LoopController<C>,
    frames: I,
    registry: &'a MethodRegistry,
    mode: ProcessingMode,
    policy: RunPolicy,
) -> impl Iterator<Item = Result<LoopOutcome>> + 'a
where
    C: DefectClassifier,
    I: IntoIterator<Item = image::RgbImage>,
    I::IntoIter: 'a,
{
    frames
        .into_iter()
        .map(move |frame| controller.run(&frame, registry, mode, policy))
}

// ============================================================
// Dataset Driver
// ============================================================

/// Aggregated result of one dataset run
#[derive(Debug)]
pub struct DatasetReport {
    /// Per-file outcomes, for files that completed a run
    pub outcomes: BTreeMap<PathBuf, LoopOutcome>,

    /// Per-file failure descriptions, for files that did not
    pub failures: BTreeMap<PathBuf, String>,

    /// Element-wise sum over completed outcomes only
    pub tally: DefectTally,
}

impl DatasetReport {
    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Run the loop over every image file of a dataset, in order
///
/// Decode and correction failures are recorded per file and excluded from
/// the aggregate tally; classifier errors abort the batch.
pub fn run_on_dataset<C, I>(
    controller: &LoopController<C>,
    paths: I,
    registry: &MethodRegistry,
    mode: ProcessingMode,
    policy: RunPolicy,
) -> Result<DatasetReport>
where
    C: DefectClassifier,
    I: IntoIterator<Item = PathBuf>,
{
    let mut outcomes = BTreeMap::new();
    let mut failures = BTreeMap::new();
    let mut tally = DefectTally::new();

    for path in paths {
        let image = match image::open(&path) {
            Ok(decoded) => decoded.to_rgb8(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping undecodable file");
                failures.insert(path, format!("decode failed: {}", err));
                continue;
            }
        };

        match controller.run(&image, registry, mode, policy) {
            Ok(outcome) => {
                tally.merge(&outcome.tally);
                outcomes.insert(path, outcome);
            }
            Err(err @ PipelineError::Classifier(_)) => return Err(err),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping failed item");
                failures.insert(path, err.to_string());
            }
        }
    }

    Ok(DatasetReport {
        outcomes,
        failures,
        tally,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classification, ClassifierError, DefectClass};
    use crate::pipeline::types::TerminalReason;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;

    /// Oracle that replays a scripted class sequence across all calls
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

    fn frame() -> RgbImage {
        RgbImage::from_pixel(24, 24, Rgb([90, 120, 150]))
    }

    #[test]
    fn test_frames_in_order_and_lazy() {
        // good, then (noise, good): two frames, outcomes in input order
        let classifier = ScriptedClassifier::new(&[
            DefectClass::Good,
            DefectClass::Noise,
            DefectClass::Good,
        ]);
        let controller = LoopController::new(classifier);
        let registry = MethodRegistry::new();

        let mut stream = run_on_frames(
            &controller,
            vec![frame(), frame()],
            &registry,
            ProcessingMode::Automatic,
            RunPolicy::AllDefects,
        );

        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.terminal_reason, TerminalReason::ReachedGood);
        assert!(first.tally.is_empty());

        let second = stream.next().unwrap().unwrap();
        assert_eq!(
            second.tally.get(DefectClass::Noise).detected,
            1
        );
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_dataset_skips_undecodable_files() {
        let dir = tempfile::tempdir().unwrap();
        let good_path = dir.path().join("ok.png");
        frame().save(&good_path).unwrap();
        let bad_path = dir.path().join("broken.png");
        std::fs::write(&bad_path, b"not an image").unwrap();

        let classifier = ScriptedClassifier::new(&[DefectClass::Good]);
        let controller = LoopController::new(classifier);
        let registry = MethodRegistry::new();

        let report = run_on_dataset(
            &controller,
            vec![bad_path.clone(), good_path.clone()],
            &registry,
            ProcessingMode::Automatic,
            RunPolicy::AllDefects,
        )
        .unwrap();

        assert_eq!(report.processed(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.outcomes.contains_key(&good_path));
        assert!(report.failures.contains_key(&bad_path));
        // Failed items contribute nothing to the aggregate tally
        assert!(report.tally.is_empty());
    }

    #[test]
    fn test_dataset_aggregates_tallies() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..2 {
            let path = dir.path().join(format!("img{}.png", i));
            frame().save(&path).unwrap();
            paths.push(path);
        }

        // First file: blur then good. Second file: blur recurs.
        let classifier = ScriptedClassifier::new(&[
            DefectClass::Blur,
            DefectClass::Good,
            DefectClass::Blur,
            DefectClass::Blur,
        ]);
        let controller = LoopController::new(classifier);
        let registry = MethodRegistry::new();

        let report = run_on_dataset(
            &controller,
            paths,
            &registry,
            ProcessingMode::Automatic,
            RunPolicy::AllDefects,
        )
        .unwrap();

        assert_eq!(report.processed(), 2);
        let counts = report.tally.get(DefectClass::Blur);
        assert_eq!((counts.detected, counts.resolved), (2, 1));
    }

    #[test]
    fn test_dataset_aborts_on_classifier_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        frame().save(&path).unwrap();

        // Empty script: the very first classification fails
        let controller = LoopController::new(ScriptedClassifier::new(&[]));
        let registry = MethodRegistry::new();

        let result = run_on_dataset(
            &controller,
            vec![path],
            &registry,
            ProcessingMode::Automatic,
            RunPolicy::AllDefects,
        );
        assert!(matches!(result, Err(PipelineError::Classifier(_))));
    }
}
