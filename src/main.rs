//! defect-restore - Classify-correct restoration of defective images
//!
//! CLI entry point

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressIterator, ProgressStyle};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use defect_restore::{
    exit_codes,
    // Catalog
    catalog, ParamValue,
    operators::ParamKind,
    // CLI
    Cli, Commands, DatasetArgs, ImageArgs,
    // Config
    Config,
    // Classifier
    OnnxDefectClassifier,
    // Pipeline
    run_on_dataset, DefectTally, LoopController, RunPolicy,
    // Registry
    MethodRegistry, ProcessingMode,
};

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Image(args) => run_image(&args),
        Commands::Dataset(args) => run_dataset(&args),
        Commands::Catalog => run_catalog(),
    };

    std::process::exit(match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_codes::GENERAL_ERROR
        }
    });
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

/// Registry, mode, and policy from the config file and CLI flags
///
/// CLI flags win over the config file; the config file wins over the
/// built-in defaults (automatic mode, all-defects policy).
fn load_setup(
    config_path: Option<&PathBuf>,
    mode_arg: Option<defect_restore::ModeArg>,
    policy_arg: Option<defect_restore::PolicyArg>,
) -> anyhow::Result<(MethodRegistry, ProcessingMode, RunPolicy)> {
    let mut registry = MethodRegistry::new();
    let config = match config_path {
        Some(path) => {
            let config = Config::load_from_path(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            config
                .apply_to(&mut registry)
                .with_context(|| format!("applying config {}", path.display()))?;
            config
        }
        None => Config::default(),
    };

    let mode = mode_arg
        .map(ProcessingMode::from)
        .or(config.mode)
        .unwrap_or(ProcessingMode::Automatic);
    let policy = policy_arg
        .map(RunPolicy::from)
        .or(config.policy)
        .unwrap_or(RunPolicy::AllDefects);
    Ok((registry, mode, policy))
}

// ============ Image Command ============

fn run_image(args: &ImageArgs) -> anyhow::Result<()> {
    init_logging(args.verbose);

    if !args.input.exists() {
        eprintln!("Error: Input file does not exist: {}", args.input.display());
        std::process::exit(exit_codes::INPUT_NOT_FOUND);
    }

    let (registry, mode, policy) = load_setup(args.config.as_ref(), args.mode, args.policy)?;
    let classifier = OnnxDefectClassifier::load(&args.model)?;
    let controller = LoopController::new(classifier);

    let image = image::open(&args.input)
        .with_context(|| format!("decoding {}", args.input.display()))?
        .to_rgb8();

    let start = Instant::now();
    let outcome = controller.run(&image, &registry, mode, policy)?;
    outcome
        .image
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!("Outcome: {}", outcome.terminal_reason);
    println!("Tally: {}", outcome.tally);
    println!(
        "Wrote {} ({:.2}s)",
        args.output.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

// ============ Dataset Command ============

#[derive(serde::Serialize)]
struct DatasetSummary<'a> {
    processed: usize,
    failed: usize,
    tally: &'a DefectTally,
    failures: &'a BTreeMap<PathBuf, String>,
}

fn run_dataset(args: &DatasetArgs) -> anyhow::Result<()> {
    init_logging(args.verbose);

    if !args.input.is_dir() {
        eprintln!(
            "Error: Input path is not a directory: {}",
            args.input.display()
        );
        std::process::exit(exit_codes::INPUT_NOT_FOUND);
    }

    let paths = collect_image_files(&args.input)?;
    if paths.is_empty() {
        eprintln!("Error: No image files found in input path");
        std::process::exit(exit_codes::INPUT_NOT_FOUND);
    }

    let (registry, mode, policy) = load_setup(args.config.as_ref(), args.mode, args.policy)?;
    let classifier = OnnxDefectClassifier::load(&args.model)?;
    let controller = LoopController::new(classifier);

    if let Some(output) = &args.output {
        std::fs::create_dir_all(output)
            .with_context(|| format!("creating {}", output.display()))?;
    }

    let bar = ProgressBar::new(paths.len() as u64).with_style(
        ProgressStyle::with_template("{wide_bar} {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let start = Instant::now();
    let report = run_on_dataset(
        &controller,
        paths.into_iter().progress_with(bar),
        &registry,
        mode,
        policy,
    )?;

    if let Some(output) = &args.output {
        for (path, outcome) in &report.outcomes {
            let Some(name) = path.file_name() else {
                continue;
            };
            let target = output.join(name);
            outcome
                .image
                .save(&target)
                .with_context(|| format!("writing {}", target.display()))?;
        }
    }

    if args.json {
        let summary = DatasetSummary {
            processed: report.processed(),
            failed: report.failed(),
            tally: &report.tally,
            failures: &report.failures,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Processed: {}  Failed: {}  ({:.2}s)",
            report.processed(),
            report.failed(),
            start.elapsed().as_secs_f64()
        );
        println!("Tally: {}", report.tally);
        for (path, reason) in &report.failures {
            eprintln!("  failed: {}: {}", path.display(), reason);
        }
    }

    if report.failed() > 0 {
        return Err(anyhow::anyhow!(
            "{} file(s) failed to process",
            report.failed()
        ));
    }
    Ok(())
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// Collect image files from a directory, sorted for deterministic order
fn collect_image_files(input: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(input)? {
        let path = entry?.path();
        let is_image = path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    IMAGE_EXTENSIONS
                        .iter()
                        .any(|known| ext.eq_ignore_ascii_case(known))
                });
        if is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// ============ Catalog Command ============

fn run_catalog() -> anyhow::Result<()> {
    println!("defect-restore v{}", env!("CARGO_PKG_VERSION"));
    println!();

    for spec in catalog() {
        println!("{} (defect: {})", spec.id, spec.applicable_defect);
        for param in &spec.schema {
            let bounds = match &param.kind {
                ParamKind::Int { min, max } => format!("int {}..={}", min, max),
                ParamKind::Float { min, max } => format!("float {}..={}", min, max),
                ParamKind::Choice { allowed } => format!("one of {}", allowed.join(", ")),
            };
            let default = match &param.default {
                ParamValue::Choice(v) => v.clone(),
                other => other.to_string(),
            };
            match &param.depends_on {
                Some(dep) => println!(
                    "  {}: {} (default {}, requires {} in {})",
                    param.name,
                    bounds,
                    default,
                    dep.param,
                    dep.values.join("/")
                ),
                None => println!("  {}: {} (default {})", param.name, bounds, default),
            }
        }
        println!();
    }

    println!("Discrete parameter values:");
    for (name, values) in MethodRegistry::get_allowed_values() {
        println!("  {}: {}", name, values.join(", "));
    }
    Ok(())
}
