//! Command-line interface definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::pipeline::RunPolicy;
use crate::registry::ProcessingMode;

#[derive(Parser)]
#[command(
    name = "defect-restore",
    version,
    about = "Classify-correct restoration of defective images",
    long_about = "Detects blur, low contrast, glare, and noise with a pretrained \
                  classifier and applies matched corrections until the image is \
                  clean or no further progress is possible."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Restore a single image
    Image(ImageArgs),

    /// Restore every image file in a directory
    Dataset(DatasetArgs),

    /// List the correction operators and their parameter schemas
    Catalog,
}

/// Mode selector for the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Automatic,
    Manual,
}

impl From<ModeArg> for ProcessingMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Automatic => ProcessingMode::Automatic,
            ModeArg::Manual => ProcessingMode::Manual,
        }
    }
}

/// Policy selector for the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Single best-guess correction
    OneDefect,

    /// Iterate until clean or cycling
    AllDefects,
}

impl From<PolicyArg> for RunPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::OneDefect => RunPolicy::OneDefect,
            PolicyArg::AllDefects => RunPolicy::AllDefects,
        }
    }
}

#[derive(Args)]
pub struct ImageArgs {
    /// Input image file
    pub input: PathBuf,

    /// Where to write the corrected image
    #[arg(short, long)]
    pub output: PathBuf,

    /// Path to the pretrained defect classifier (ONNX)
    #[arg(short, long)]
    pub model: PathBuf,

    /// Processing mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Run policy
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Binding configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Args)]
pub struct DatasetArgs {
    /// Input directory of image files
    pub input: PathBuf,

    /// Directory for corrected images (omit to report statistics only)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to the pretrained defect classifier (ONNX)
    #[arg(short, long)]
    pub model: PathBuf,

    /// Processing mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Run policy
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Binding configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Emit a machine-readable JSON summary instead of plain text
    #[arg(long)]
    pub json: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_image_command() {
        let cli = Cli::parse_from([
            "defect-restore",
            "image",
            "in.png",
            "-o",
            "out.png",
            "-m",
            "model.onnx",
            "--mode",
            "manual",
            "--policy",
            "one-defect",
        ]);
        match cli.command {
            Commands::Image(args) => {
                assert_eq!(args.input, PathBuf::from("in.png"));
                assert_eq!(args.mode, Some(ModeArg::Manual));
                assert_eq!(args.policy, Some(PolicyArg::OneDefect));
            }
            _ => panic!("expected image command"),
        }
    }

    #[test]
    fn test_cli_parses_dataset_command() {
        let cli = Cli::parse_from([
            "defect-restore",
            "dataset",
            "frames/",
            "-m",
            "model.onnx",
            "-vv",
        ]);
        match cli.command {
            Commands::Dataset(args) => {
                assert!(args.output.is_none());
                assert_eq!(args.verbose, 2);
            }
            _ => panic!("expected dataset command"),
        }
    }

    #[test]
    fn test_cli_debug_asserts() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
