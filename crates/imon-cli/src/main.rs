// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use imon_cli::{ScoreReport, parse_dataset, parse_pipeline_spec, score_dataset};
use imon_core::{ExecutionContext, ImonError};
use imon_pipeline::{
    ComparisonOutput, CompressorSimulation, Dataset, DetectorConfig, FlareSimulation,
    ModelHandle, PipelineOutput, PipelineSpec, StaticBaselineSpec, run_comparison, run_pipeline,
    simulate_compressor, simulate_flare,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Train, calibrate, and evaluate anomaly and change-point detectors on
/// multichannel process data.
#[derive(Parser, Debug)]
#[command(name = "imon", version, about)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). Logs go to stderr.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a labeled synthetic dataset.
    Simulate(SimulateArgs),
    /// Run one pipeline spec on a dataset and report its metrics.
    Run(RunArgs),
    /// Score a dataset with a persisted model; no event matching.
    Score(ScoreArgs),
    /// Run a candidate spec and a static baseline on the same dataset.
    Compare(CompareArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scenario {
    Compressor,
    Flare,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    #[arg(value_enum)]
    scenario: Scenario,
    #[arg(long)]
    samples: Option<usize>,
    #[arg(long)]
    anomalies: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Dataset JSON: `{"series": {"channels": [...]}, "events": [...]}`.
    #[arg(long)]
    dataset: PathBuf,
    /// Pipeline spec JSON; defaults apply when omitted.
    #[arg(long, env = "IMON_PIPELINE")]
    pipeline: Option<PathBuf>,
    /// Where to persist the fitted model (ensemble strategy only).
    #[arg(long)]
    model_out: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    #[arg(long)]
    model: PathBuf,
    #[arg(long)]
    dataset: PathBuf,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CompareArgs {
    #[arg(long)]
    dataset: PathBuf,
    #[arg(long, env = "IMON_PIPELINE")]
    pipeline: Option<PathBuf>,
    /// Channel thresholded by the baseline; the first channel by default.
    #[arg(long)]
    baseline_channel: Option<String>,
    #[arg(long, default_value_t = 3.0)]
    baseline_sigma: f64,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct SimulateOutput<'a> {
    command: &'static str,
    scenario: &'static str,
    samples: usize,
    events: usize,
    dataset: &'a Dataset,
}

#[derive(Serialize)]
struct RunOutput {
    command: &'static str,
    pipeline: PipelineSpec,
    /// Flat metric mapping for the metrics sink.
    metrics: BTreeMap<&'static str, Option<f64>>,
    result: PipelineOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_path: Option<String>,
}

#[derive(Serialize)]
struct ScoreOutput {
    command: &'static str,
    result: ScoreReport,
}

#[derive(Serialize)]
struct CompareOutput {
    command: &'static str,
    pipeline: PipelineSpec,
    baseline: DetectorConfig,
    false_alarm_reduction_percent: f64,
    event_detection_rate: f64,
    average_detection_delay_minutes: f64,
    result: ComparisonOutput,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Serialize)]
struct ErrorPayload {
    code: String,
    message: String,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli.command) {
        emit_structured_error(&err);
        process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Simulate(args) => handle_simulate(args),
        Command::Run(args) => handle_run(args),
        Command::Score(args) => handle_score(args),
        Command::Compare(args) => handle_compare(args),
    }
}

fn handle_simulate(args: SimulateArgs) -> Result<()> {
    let (scenario, dataset) = match args.scenario {
        Scenario::Compressor => {
            let defaults = CompressorSimulation::default();
            let config = CompressorSimulation {
                n_samples: args.samples.unwrap_or(defaults.n_samples),
                n_anomalies: args.anomalies.unwrap_or(defaults.n_anomalies),
                seed: args.seed.unwrap_or(defaults.seed),
            };
            ("compressor", simulate_compressor(&config)?)
        }
        Scenario::Flare => {
            let defaults = FlareSimulation::default();
            let config = FlareSimulation {
                n_samples: args.samples.unwrap_or(defaults.n_samples),
                n_anomalies: args.anomalies.unwrap_or(defaults.n_anomalies),
                seed: args.seed.unwrap_or(defaults.seed),
                ..defaults
            };
            ("flare", simulate_flare(&config)?)
        }
    };

    // a simulated dataset is itself a valid `--dataset` input
    match args.output.as_deref() {
        Some(path) => write_json_output(&dataset, Some(path)),
        None => write_json_output(
            &SimulateOutput {
                command: "simulate",
                scenario,
                samples: dataset.len(),
                events: dataset.events().len(),
                dataset: &dataset,
            },
            None,
        ),
    }
}

fn handle_run(args: RunArgs) -> Result<()> {
    let dataset = load_dataset(&args.dataset)?;
    let pipeline = load_pipeline_spec(args.pipeline.as_deref())?;
    let result = run_pipeline(&dataset, &pipeline, &ExecutionContext::new())
        .context("pipeline run failed")?;

    let model_path = match (&args.model_out, &result.model) {
        (Some(path), Some(model)) => {
            model
                .save(path)
                .with_context(|| format!("failed to persist model to '{}'", path.display()))?;
            Some(path.display().to_string())
        }
        (Some(path), None) => {
            anyhow::bail!(ImonError::invalid_input(format!(
                "--model-out '{}' requires the ensemble detector; got '{}'",
                path.display(),
                pipeline.detector.kind()
            )));
        }
        (None, _) => None,
    };

    write_json_output(
        &RunOutput {
            command: "run",
            metrics: result.metrics.to_flat_map(),
            pipeline,
            result,
            model_path,
        },
        args.output.as_deref(),
    )
}

fn handle_score(args: ScoreArgs) -> Result<()> {
    let model = ModelHandle::load(&args.model)
        .with_context(|| format!("failed to load model '{}'", args.model.display()))?;
    let dataset = load_dataset(&args.dataset)?;
    let result = score_dataset(&model, &dataset)?;
    info!(
        rows = result.rows,
        detections = result.detections.len(),
        "scored dataset"
    );
    write_json_output(
        &ScoreOutput {
            command: "score",
            result,
        },
        args.output.as_deref(),
    )
}

fn handle_compare(args: CompareArgs) -> Result<()> {
    let dataset = load_dataset(&args.dataset)?;
    let pipeline = load_pipeline_spec(args.pipeline.as_deref())?;
    let baseline = DetectorConfig::StaticBaseline(StaticBaselineSpec {
        channel: args.baseline_channel,
        sigma: args.baseline_sigma,
    });
    let result = run_comparison(&dataset, &pipeline, &baseline, &ExecutionContext::new())
        .context("comparison run failed")?;

    write_json_output(
        &CompareOutput {
            command: "compare",
            false_alarm_reduction_percent: result.false_alarm_reduction_percent,
            event_detection_rate: result.candidate.metrics.detection_rate,
            average_detection_delay_minutes: result.candidate.metrics.mean_delay,
            pipeline,
            baseline,
            result,
        },
        args.output.as_deref(),
    )
}

fn load_dataset(path: &Path) -> Result<Dataset> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset '{}'", path.display()))?;
    parse_dataset(&raw).with_context(|| format!("failed to parse dataset '{}'", path.display()))
}

fn load_pipeline_spec(path: Option<&Path>) -> Result<PipelineSpec> {
    let Some(path) = path else {
        return Ok(PipelineSpec::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read pipeline spec '{}'", path.display()))?;
    parse_pipeline_spec(&raw)
        .with_context(|| format!("failed to parse pipeline spec '{}'", path.display()))
}

fn write_json_output<T: Serialize>(payload: &T, output_path: Option<&Path>) -> Result<()> {
    let encoded =
        serde_json::to_string_pretty(payload).context("failed to serialize JSON output")?;

    if let Some(path) = output_path {
        fs::write(path, format!("{encoded}\n"))
            .with_context(|| format!("failed to write '{}'", path.display()))
    } else {
        println!("{encoded}");
        Ok(())
    }
}

fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(err) = err.downcast_ref::<ImonError>() {
        return match err {
            ImonError::InvalidWindow { .. } => "invalid_window",
            ImonError::EmptyTrainingSet => "empty_training_set",
            ImonError::InvalidQuantile(_) => "invalid_quantile",
            ImonError::OverlappingEvents { .. } => "overlapping_events",
            ImonError::InvalidInput(_) => "invalid_input",
            ImonError::NumericalIssue(_) => "numerical_issue",
            ImonError::ResourceLimit(_) => "resource_limit",
            ImonError::Serialization(_) => "serialization",
        };
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return "io_error";
    }
    if err.downcast_ref::<serde_json::Error>().is_some() {
        return "json_error";
    }
    "internal"
}

fn emit_structured_error(err: &anyhow::Error) {
    let code = error_code(err);
    let envelope = ErrorEnvelope {
        error: ErrorPayload {
            code: code.to_string(),
            message: format!("{err:#}"),
        },
    };

    match serde_json::to_string_pretty(&envelope) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("{{\"error\":{{\"code\":\"{code}\",\"message\":\"{err}\"}}}}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, Scenario, error_code, load_dataset, load_pipeline_spec};
    use anyhow::Context;
    use clap::Parser;
    use imon_core::ImonError;
    use imon_pipeline::{FlareSimulation, PipelineSpec, simulate_flare};
    use std::fs;

    #[test]
    fn parses_simulate_with_overrides() {
        let cli = Cli::try_parse_from([
            "imon", "simulate", "flare", "--samples", "1000", "--seed", "3",
        ])
        .expect("arguments should parse");
        match cli.command {
            Command::Simulate(args) => {
                assert!(matches!(args.scenario, Scenario::Flare));
                assert_eq!(args.samples, Some(1000));
                assert_eq!(args.seed, Some(3));
                assert_eq!(args.anomalies, None);
            }
            other => panic!("expected simulate, got {other:?}"),
        }
    }

    #[test]
    fn verbose_flag_is_global_and_counted() {
        let cli = Cli::try_parse_from(["imon", "run", "--dataset", "d.json", "-vv"])
            .expect("arguments should parse");
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Run(_)));
    }

    #[test]
    fn compare_defaults_baseline_sigma() {
        let cli = Cli::try_parse_from(["imon", "compare", "--dataset", "d.json"])
            .expect("arguments should parse");
        match cli.command {
            Command::Compare(args) => {
                assert_eq!(args.baseline_sigma, 3.0);
                assert!(args.baseline_channel.is_none());
            }
            other => panic!("expected compare, got {other:?}"),
        }
    }

    #[test]
    fn missing_required_dataset_is_a_usage_error() {
        assert!(Cli::try_parse_from(["imon", "score", "--model", "m.json"]).is_err());
    }

    #[test]
    fn error_codes_follow_the_root_cause() {
        let err = anyhow::Error::new(ImonError::InvalidQuantile(2.0));
        assert_eq!(error_code(&err), "invalid_quantile");

        let wrapped: anyhow::Result<()> =
            Err(ImonError::EmptyTrainingSet).context("pipeline run failed");
        let err = wrapped.expect_err("context keeps the error");
        assert_eq!(error_code(&err), "empty_training_set");

        let io = anyhow::Error::new(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(error_code(&io), "io_error");
    }

    #[test]
    fn dataset_and_spec_files_load_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let dataset = simulate_flare(&FlareSimulation {
            n_samples: 400,
            n_anomalies: 1,
            ..FlareSimulation::default()
        })
        .expect("simulate");
        let dataset_path = dir.path().join("flare.json");
        fs::write(
            &dataset_path,
            serde_json::to_string(&dataset).expect("dataset should serialize"),
        )
        .expect("dataset should be written");
        assert_eq!(load_dataset(&dataset_path).expect("dataset should load"), dataset);

        let spec_path = dir.path().join("spec.json");
        fs::write(&spec_path, r#"{"window_size": 12}"#).expect("spec should be written");
        let spec = load_pipeline_spec(Some(&spec_path)).expect("spec should load");
        assert_eq!(spec.window_size, 12);
        assert_eq!(
            load_pipeline_spec(None).expect("defaults"),
            PipelineSpec::default()
        );

        let err = load_dataset(&dir.path().join("missing.json")).expect_err("missing file");
        assert!(format!("{err:#}").contains("failed to read dataset"));
        assert_eq!(error_code(&err), "io_error");
    }
}
