//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and installs logging
//! - resolves file locations (flags > environment > defaults)
//! - runs one boundary operation through `Service`
//! - prints the result as JSON on stdout

use clap::Parser;
use serde::Serialize;
use serde_json::{Value, json};

use crate::cli::{Cli, Command, InputArgs};
use crate::data::{SynthOptions, generate_labeled, write_csv};
use crate::domain::{Explanation, ServiceConfig};
use crate::error::AppError;
use crate::io::{RawTable, read_model_card, read_table};

pub mod service;

pub use service::{Service, bootstrap};

/// Entry point for the `exo` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    if let Err(e) = crate::logging::init(cli.verbose) {
        eprintln!("{e}");
    }

    let config = ServiceConfig::from_env().with_overrides(
        cli.paths.model.clone(),
        cli.paths.card.clone(),
        cli.paths.feedback.clone(),
    );
    let output = dispatch(cli.command, &config)?;
    print_json(&output);
    Ok(())
}

/// Run one command and build its `{"ok": true, ...}` body.
pub fn dispatch(command: Command, config: &ServiceConfig) -> Result<Value, AppError> {
    match command {
        Command::Schema => {
            let service = Service::open(config.clone())?;
            let card = service.feature_schema();
            Ok(json!({
                "ok": true,
                "features": card.features,
                "classes": card.classes,
                "target": card.target,
            }))
        }
        Command::Health => {
            let service = Service::open(config.clone())?;
            to_value(&service.health())
        }
        Command::Predict(args) => {
            let service = Service::open(config.clone())?;
            let results = service.predict(&read_input(&args)?)?;
            Ok(json!({ "ok": true, "results": results }))
        }
        Command::Feedback(args) => {
            let service = Service::open(config.clone())?;
            let table = read_input(&args.input)?;
            let receipt = service.submit_feedback(&table, args.label_col.as_deref())?;
            Ok(json!({ "ok": true, "stored_rows": receipt.stored_rows }))
        }
        Command::Retrain(args) => {
            let service = Service::open(config.clone())?;
            let report = service.retrain(&args.params())?;
            with_ok(&report)
        }
        Command::Explain(args) => {
            let service = Service::open(config.clone())?;
            Ok(match service.explain(args.top_k) {
                Explanation::Ranked(items) => json!({ "ok": true, "importances": items }),
                Explanation::Unsupported { message } => json!({ "ok": true, "message": message }),
            })
        }
        Command::Bootstrap(args) => {
            let table = read_input(&args.input)?;
            let report = bootstrap(config, &table, args.kind, &args.params())?;
            with_ok(&report)
        }
        Command::Synth(args) => {
            let card = read_model_card(&config.card_path)?;
            let opts = SynthOptions {
                rows_per_class: args.rows_per_class,
                seed: args.seed,
                spread: args.spread,
                noise: args.noise,
            };
            let table = generate_labeled(&card, &opts)?;
            write_csv(&args.out, &table)?;
            tracing::info!(rows = table.len(), out = %args.out.display(), "wrote synthetic dataset");
            Ok(json!({ "ok": true, "rows": table.len(), "path": args.out }))
        }
    }
}

/// Print an error as the structured boundary response.
pub fn report_error(err: &AppError) {
    if err.is_fatal() {
        tracing::error!(error = %err, "startup failed");
    }
    match serde_json::to_string_pretty(&err.to_response()) {
        Ok(body) => println!("{body}"),
        Err(_) => eprintln!("{err}"),
    }
}

fn read_input(args: &InputArgs) -> Result<RawTable, AppError> {
    read_table(&args.input, args.format)
}

fn to_value(value: &impl Serialize) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(format!("failed to encode response: {e}")))
}

/// Serialize a struct and prepend `"ok": true`.
fn with_ok(value: &impl Serialize) -> Result<Value, AppError> {
    let mut body = serde_json::Map::new();
    body.insert("ok".to_string(), Value::Bool(true));
    if let Value::Object(fields) = to_value(value)? {
        body.extend(fields);
    }
    Ok(Value::Object(body))
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(body) => println!("{body}"),
        Err(e) => eprintln!("failed to encode response: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{ExplainArgs, RetrainArgs, SynthArgs};

    fn config(dir: &std::path::Path) -> ServiceConfig {
        std::fs::write(
            dir.join("card.json"),
            r#"{"features":["a","b"],"classes":["X","Y"],"target":"label"}"#,
        )
        .unwrap();
        ServiceConfig {
            model_path: dir.join("model.json"),
            card_path: dir.join("card.json"),
            feedback_path: dir.join("feedback.csv"),
        }
    }

    fn synth(dir: &std::path::Path, config: &ServiceConfig) -> std::path::PathBuf {
        let out = dir.join("synth.csv");
        dispatch(
            Command::Synth(SynthArgs {
                out: out.clone(),
                rows_per_class: 10,
                seed: 42,
                spread: 4.0,
                noise: 0.5,
            }),
            config,
        )
        .unwrap();
        out
    }

    #[test]
    fn synth_bootstrap_explain_round() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let data = synth(dir.path(), &config);

        let cli = Cli::parse_from(["exo", "bootstrap", data.to_str().unwrap()]);
        let report = dispatch(cli.command, &config).unwrap();
        assert_eq!(report["ok"], true);
        assert_eq!(report["rows_used"], 20);

        let explained = dispatch(Command::Explain(ExplainArgs { top_k: 1 }), &config).unwrap();
        assert_eq!(explained["importances"].as_array().unwrap().len(), 1);

        let schema = dispatch(Command::Schema, &config).unwrap();
        assert_eq!(schema["features"], json!(["a", "b"]));
    }

    #[test]
    fn centroid_explain_is_unsupported_message() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let data = synth(dir.path(), &config);

        let cli = Cli::parse_from([
            "exo",
            "bootstrap",
            data.to_str().unwrap(),
            "--kind",
            "nearest-centroid",
        ]);
        dispatch(cli.command, &config).unwrap();
        let explained = dispatch(Command::Explain(ExplainArgs { top_k: 5 }), &config).unwrap();
        assert!(explained["message"].is_string());
        assert_eq!(explained["ok"], true);
    }

    #[test]
    fn retrain_without_model_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let err = dispatch(
            Command::Retrain(RetrainArgs {
                min_rows: 40,
                test_fraction: 0.2,
                seed: 42,
            }),
            &config,
        )
        .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn with_ok_puts_ok_first() {
        let body = with_ok(&crate::domain::FeedbackReceipt { stored_rows: 3 }).unwrap();
        let keys: Vec<&String> = body.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["ok", "stored_rows"]);
    }

    #[test]
    fn unencodable_response_is_internal_error() {
        // Tuple keys have no JSON object representation.
        let unencodable = std::collections::BTreeMap::from([((1u8, 2u8), 3u8)]);
        let err = to_value(&unencodable).unwrap_err();
        assert_eq!(err.kind(), "internal_error");
        assert_eq!(err.exit_code(), 4);
    }
}
