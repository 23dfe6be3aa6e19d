//! End-to-end scenarios for the classify-correct restoration loop
//!
//! Drives the loop controller with scripted classifier sequences so the
//! control flow is exercised deterministically, with the real operator
//! catalog and registry underneath.

use std::sync::Mutex;

use defect_restore::{
    Classification, ClassifierError, DefectClass, DefectClassifier, DefectTally, LoopController,
    MethodRegistry, ProcessingMode, RunPolicy, TerminalReason,
};
use image::{Rgb, RgbImage};

/// Oracle that replays a fixed class sequence
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
    fn classify(&self, _image: &RgbImage) -> Result<Classification, ClassifierError> {
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

/// Textured image so every real operator has something to work on
fn sample_image() -> RgbImage {
    let mut image = RgbImage::new(48, 48);
    for y in 0..48 {
        for x in 0..48 {
            let v = ((x * 5 + y * 11) % 180) as u8 + 30;
            image.put_pixel(x, y, Rgb([v, 255 - v, v / 2 + 60]));
        }
    }
    image
}

fn assert_tally_consistent(tally: &DefectTally) {
    for class in DefectClass::correctable() {
        let counts = tally.get(class);
        assert!(
            counts.resolved <= counts.detected,
            "{}: resolved {} > detected {}",
            class,
            counts.resolved,
            counts.detected
        );
    }
}

#[test]
fn scenario_one_defect_resolved() {
    // blur, then good: exactly one correction, blur credited as resolved
    let classifier = ScriptedClassifier::new(&[DefectClass::Blur, DefectClass::Good]);
    let controller = LoopController::new(classifier);
    let registry = MethodRegistry::new();

    let outcome = controller
        .run(
            &sample_image(),
            &registry,
            ProcessingMode::Automatic,
            RunPolicy::OneDefect,
        )
        .unwrap();

    assert_eq!(outcome.terminal_reason, TerminalReason::ReachedGood);
    let blur = outcome.tally.get(DefectClass::Blur);
    assert_eq!((blur.detected, blur.resolved), (1, 1));
    for class in [DefectClass::Contrast, DefectClass::Glares, DefectClass::Noise] {
        assert_eq!(outcome.tally.get(class).detected, 0);
    }
    // One detection plus one verification, nothing more
    assert_eq!(controller_calls(&controller), 2);
    assert_tally_consistent(&outcome.tally);
}

#[test]
fn scenario_two_defects_resolved_in_order() {
    // noise, contrast, good: two corrections, both resolved
    let classifier = ScriptedClassifier::new(&[
        DefectClass::Noise,
        DefectClass::Contrast,
        DefectClass::Good,
    ]);
    let controller = LoopController::new(classifier);
    let registry = MethodRegistry::new();

    let outcome = controller
        .run(
            &sample_image(),
            &registry,
            ProcessingMode::Automatic,
            RunPolicy::AllDefects,
        )
        .unwrap();

    assert_eq!(outcome.terminal_reason, TerminalReason::ReachedGood);
    let noise = outcome.tally.get(DefectClass::Noise);
    let contrast = outcome.tally.get(DefectClass::Contrast);
    assert_eq!((noise.detected, noise.resolved), (1, 1));
    assert_eq!((contrast.detected, contrast.resolved), (1, 1));
    assert_eq!(outcome.tally.get(DefectClass::Blur).detected, 0);
    assert_eq!(outcome.tally.get(DefectClass::Glares).detected, 0);
    assert_tally_consistent(&outcome.tally);
}

#[test]
fn scenario_recurring_defect_detected_as_cycle() {
    // glares, blur, glares: the third classification repeats glares, so the
    // loop exits; glares is detected but not credited as resolved
    let classifier = ScriptedClassifier::new(&[
        DefectClass::Glares,
        DefectClass::Blur,
        DefectClass::Glares,
    ]);
    let controller = LoopController::new(classifier);
    let registry = MethodRegistry::new();

    let outcome = controller
        .run(
            &sample_image(),
            &registry,
            ProcessingMode::Automatic,
            RunPolicy::AllDefects,
        )
        .unwrap();

    assert_eq!(outcome.terminal_reason, TerminalReason::CycleDetected);
    let glares = outcome.tally.get(DefectClass::Glares);
    let blur = outcome.tally.get(DefectClass::Blur);
    assert_eq!((glares.detected, glares.resolved), (1, 0));
    assert_eq!((blur.detected, blur.resolved), (1, 1));
    assert_tally_consistent(&outcome.tally);
}

#[test]
fn always_blur_cycles_after_one_correction() {
    let classifier = ScriptedClassifier::new(&[
        DefectClass::Blur,
        DefectClass::Blur,
        DefectClass::Blur,
        DefectClass::Blur,
    ]);
    let controller = LoopController::new(classifier);
    let registry = MethodRegistry::new();

    let outcome = controller
        .run(
            &sample_image(),
            &registry,
            ProcessingMode::Automatic,
            RunPolicy::AllDefects,
        )
        .unwrap();

    assert_eq!(outcome.terminal_reason, TerminalReason::CycleDetected);
    assert_eq!(outcome.tally.get(DefectClass::Blur).detected, 1);
    assert_eq!(outcome.tally.get(DefectClass::Blur).resolved, 0);
    // Exactly one correction attempt: detect, correct, re-detect, exit
    assert_eq!(controller_calls(&controller), 2);
}

#[test]
fn termination_bound_four_corrections() {
    // Every correctable class once, then a recurrence: the loop can never
    // apply more than four corrections regardless of classifier behavior
    let classifier = ScriptedClassifier::new(&[
        DefectClass::Blur,
        DefectClass::Contrast,
        DefectClass::Glares,
        DefectClass::Noise,
        DefectClass::Blur,
    ]);
    let controller = LoopController::new(classifier);
    let registry = MethodRegistry::new();

    let outcome = controller
        .run(
            &sample_image(),
            &registry,
            ProcessingMode::Automatic,
            RunPolicy::AllDefects,
        )
        .unwrap();

    assert_eq!(outcome.terminal_reason, TerminalReason::CycleDetected);
    // Five classifications, four corrections
    assert_eq!(controller_calls(&controller), 5);
    let detected: u32 = DefectClass::correctable()
        .iter()
        .map(|c| outcome.tally.get(*c).detected)
        .sum();
    assert_eq!(detected, 4);
    assert_tally_consistent(&outcome.tally);
}

#[test]
fn good_image_passes_through_untouched() {
    let image = sample_image();

    for (mode, policy, reason) in [
        (
            ProcessingMode::Automatic,
            RunPolicy::AllDefects,
            TerminalReason::ReachedGood,
        ),
        (
            ProcessingMode::Manual,
            RunPolicy::AllDefects,
            TerminalReason::ReachedGood,
        ),
        (
            ProcessingMode::Automatic,
            RunPolicy::OneDefect,
            TerminalReason::NoDefectInitially,
        ),
    ] {
        let classifier = ScriptedClassifier::new(&[DefectClass::Good]);
        let controller = LoopController::new(classifier);
        let registry = MethodRegistry::new();

        let outcome = controller.run(&image, &registry, mode, policy).unwrap();
        assert_eq!(outcome.terminal_reason, reason);
        assert!(outcome.tally.is_empty());
        assert_eq!(outcome.image, image);
    }
}

#[test]
fn manual_bindings_drive_the_loop() {
    use defect_restore::{OperatorId, ParamSet, ParamValue};

    let mut registry = MethodRegistry::new();
    let mut params = ParamSet::new();
    params.set("coeff", ParamValue::Float(1.0));
    registry
        .set_binding(
            ProcessingMode::Manual,
            DefectClass::Blur,
            OperatorId::LaplacianSharpen,
            params,
        )
        .unwrap();

    let classifier = ScriptedClassifier::new(&[DefectClass::Blur, DefectClass::Good]);
    let controller = LoopController::new(classifier);
    let outcome = controller
        .run(
            &sample_image(),
            &registry,
            ProcessingMode::Manual,
            RunPolicy::AllDefects,
        )
        .unwrap();

    assert_eq!(outcome.terminal_reason, TerminalReason::ReachedGood);
    let blur = outcome.tally.get(DefectClass::Blur);
    assert_eq!((blur.detected, blur.resolved), (1, 1));
}

#[test]
fn batch_statistics_exclude_failed_items() {
    use defect_restore::run_on_dataset;

    let dir = tempfile::tempdir().unwrap();
    let ok_path = dir.path().join("a.png");
    sample_image().save(&ok_path).unwrap();
    let bad_path = dir.path().join("b.png");
    std::fs::write(&bad_path, b"garbage").unwrap();

    let classifier = ScriptedClassifier::new(&[DefectClass::Contrast, DefectClass::Good]);
    let controller = LoopController::new(classifier);
    let registry = MethodRegistry::new();

    let report = run_on_dataset(
        &controller,
        vec![ok_path, bad_path.clone()],
        &registry,
        ProcessingMode::Automatic,
        RunPolicy::AllDefects,
    )
    .unwrap();

    assert_eq!(report.processed(), 1);
    assert_eq!(report.failed(), 1);
    assert!(report.failures.contains_key(&bad_path));
    let contrast = report.tally.get(DefectClass::Contrast);
    assert_eq!((contrast.detected, contrast.resolved), (1, 1));
}

/// How often the scripted oracle was consulted
fn controller_calls(controller: &LoopController<ScriptedClassifier>) -> usize {
    controller.classifier().calls()
}
