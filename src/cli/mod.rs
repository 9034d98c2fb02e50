//! Command-line parsing for the `exo` classifier service.
//!
//! Parsing lives here; dispatch and output live in `app`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{InputFormat, ModelKind, RetrainParams};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "exo", version, about = "Tabular classifier service with a feedback/retrain loop")]
pub struct Cli {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Increase log verbosity (-v debug, -vv trace). `EXO_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// File locations; unset flags fall back to the environment, then to defaults.
#[derive(Debug, Args, Clone, Default)]
pub struct PathArgs {
    /// Model artifact path [env: MODEL_PATH].
    #[arg(long, global = true)]
    pub model: Option<PathBuf>,

    /// Model card path [env: MODEL_CARD].
    #[arg(long, global = true)]
    pub card: Option<PathBuf>,

    /// Feedback table path [env: FEEDBACK_CSV].
    #[arg(long, global = true)]
    pub feedback: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the model card (features, classes, target).
    Schema,
    /// Print service health.
    Health,
    /// Score every row of a CSV/JSON table.
    Predict(InputArgs),
    /// Append labeled rows to the feedback table.
    Feedback(FeedbackArgs),
    /// Retrain from all stored feedback and swap the model in.
    Retrain(RetrainArgs),
    /// Rank features by importance, when the model supports it.
    Explain(ExplainArgs),
    /// Train the initial model from a labeled table.
    Bootstrap(BootstrapArgs),
    /// Write a synthetic labeled dataset for the model card's classes.
    Synth(SynthArgs),
}

/// A tabular input file.
#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// CSV or JSON file (`-` for stdin).
    pub input: PathBuf,

    /// Input encoding; defaults to the file extension (`.json` = JSON, else CSV).
    #[arg(long, value_enum)]
    pub format: Option<InputFormat>,
}

#[derive(Debug, Args, Clone)]
pub struct FeedbackArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Column holding the labels (defaults to the card's target).
    #[arg(long)]
    pub label_col: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RetrainArgs {
    /// Minimum number of feedback rows required.
    #[arg(long, default_value_t = 40)]
    pub min_rows: usize,

    /// Fraction of rows held out for evaluation, in (0, 1).
    #[arg(long, default_value_t = 0.2)]
    pub test_fraction: f64,

    /// Seed for the stratified split.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl RetrainArgs {
    pub fn params(&self) -> RetrainParams {
        RetrainParams {
            min_rows: self.min_rows,
            test_fraction: self.test_fraction,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct ExplainArgs {
    /// Number of features to return.
    #[arg(long, default_value_t = 15)]
    pub top_k: usize,
}

#[derive(Debug, Args, Clone)]
pub struct BootstrapArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Classifier family to train.
    #[arg(long, value_enum, default_value_t = ModelKind::Gbdt)]
    pub kind: ModelKind,

    #[arg(long, default_value_t = 2)]
    pub min_rows: usize,

    #[arg(long, default_value_t = 0.2)]
    pub test_fraction: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl BootstrapArgs {
    pub fn params(&self) -> RetrainParams {
        RetrainParams {
            min_rows: self.min_rows,
            test_fraction: self.test_fraction,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    /// Output CSV path.
    #[arg(long)]
    pub out: PathBuf,

    #[arg(long, default_value_t = 25)]
    pub rows_per_class: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Distance between neighbouring class centres.
    #[arg(long, default_value_t = 4.0)]
    pub spread: f64,

    /// Standard deviation of the per-feature jitter.
    #[arg(long, default_value_t = 1.0)]
    pub noise: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn retrain_defaults_match_params() {
        let cli = Cli::parse_from(["exo", "retrain"]);
        let Command::Retrain(args) = cli.command else {
            panic!("expected retrain");
        };
        assert_eq!(args.params(), RetrainParams::default());
    }

    #[test]
    fn global_paths_and_format_parse() {
        let cli = Cli::parse_from([
            "exo", "predict", "rows.txt", "--format", "json", "--model", "m.json", "-vv",
        ]);
        assert_eq!(cli.paths.model, Some(PathBuf::from("m.json")));
        assert_eq!(cli.verbose, 2);
        let Command::Predict(args) = cli.command else {
            panic!("expected predict");
        };
        assert_eq!(args.format, Some(InputFormat::Json));
    }

    #[test]
    fn feedback_label_override() {
        let cli = Cli::parse_from(["exo", "feedback", "fb.csv", "--label-col", "truth"]);
        let Command::Feedback(args) = cli.command else {
            panic!("expected feedback");
        };
        assert_eq!(args.label_col.as_deref(), Some("truth"));
        assert_eq!(args.input.input, PathBuf::from("fb.csv"));
    }
}
