//! Rollstream - streaming online-learning runner
//!
//! Replays a delimited file as a stream through the four-worker pipeline
//! and writes the run summary with its evaluation report as JSON.

mod logging;
mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prometheus::{Encoder, TextEncoder};
use settings::{EvaluatorKind, LogFormat, Overrides, Settings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stream_lib::evaluation::{ChunkEvaluator, Metric, PrequentialEvaluator};
use stream_lib::model::LinearFactory;
use stream_lib::source::{CsvConfig, CsvSource, MovingWindowConfig, MovingWindowGenerator, StreamSource};
use stream_lib::{Pipeline, RunSummary};
use tracing::info;

/// Streaming online-learning pipeline runner
#[derive(Parser)]
#[command(name = "rollstream")]
#[command(author, version, about = "Train, predict and evaluate over a replayed stream", long_about = None)]
pub struct Cli {
    /// Settings file (TOML, YAML or JSON)
    #[arg(long, short, env = "ROLLSTREAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline over a stream file
    Run(RunArgs),

    /// Print the effective settings as JSON
    Config(RunArgs),
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Stream file to replay
    #[arg(long, short)]
    pub input: Option<PathBuf>,

    /// Instances per training batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Batches kept in the rolling training window
    #[arg(long)]
    pub num_batches_fed: Option<usize>,

    /// Sleep between empty polls in milliseconds (0 spins)
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Delay between stream events in milliseconds
    #[arg(long)]
    pub stream_period_ms: Option<u64>,

    /// Label columns (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub target_columns: Option<Vec<usize>>,

    /// Past observations per forecasting input; enables the moving window
    #[arg(long)]
    pub past_history: Option<usize>,

    /// Future steps per forecasting label; enables the moving window
    #[arg(long)]
    pub forecasting_horizon: Option<usize>,

    /// Evaluation strategy
    #[arg(long)]
    pub evaluator: Option<EvaluatorKind>,

    /// Evaluation metric (mae, mse, rmse, mape, accuracy)
    #[arg(long)]
    pub metric: Option<Metric>,

    /// SGD learning rate of the linear model
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Write the run summary here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Write Prometheus metrics in text exposition format after the run
    #[arg(long)]
    pub metrics_output: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self, args: &RunArgs) -> Overrides {
        Overrides {
            input: args.input.clone(),
            batch_size: args.batch_size,
            num_batches_fed: args.num_batches_fed,
            poll_interval_ms: args.poll_interval_ms,
            stream_period_ms: args.stream_period_ms,
            target_columns: args.target_columns.clone(),
            past_history: args.past_history,
            forecasting_horizon: args.forecasting_horizon,
            evaluator: args.evaluator,
            metric: args.metric,
            learning_rate: args.learning_rate,
            log_level: self.log_level.clone(),
            log_format: self.log_format,
            output: args.output.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = match &cli.command {
        Commands::Run(args) | Commands::Config(args) => args.clone(),
    };
    let mut settings = Settings::load(cli.config.as_deref())?;
    settings.apply(cli.overrides(&args));

    // Fail before anything runs if the level is unusable
    logging::init(&settings.logging)?;

    match cli.command {
        Commands::Config(_) => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Run(args) => {
            let summary = run(&settings).await?;
            write_summary(&settings, &summary)?;
            if let Some(path) = args.metrics_output {
                write_metrics(&path)?;
            }
            Ok(())
        }
    }
}

async fn run(settings: &Settings) -> Result<RunSummary> {
    let source = open_source(settings)?;

    let builder = Pipeline::builder()
        .config(settings.pipeline.clone())
        .source(source)
        .model_factory(Arc::new(LinearFactory))
        .model_spec(settings.model.clone());

    let evaluation = &settings.evaluation;
    let builder = match evaluation.kind {
        EvaluatorKind::Prequential => builder.evaluator(PrequentialEvaluator::new(
            evaluation.metric,
            evaluation.window_size,
        )),
        EvaluatorKind::Chunk => {
            builder.evaluator(ChunkEvaluator::new(evaluation.metric, evaluation.window_size))
        }
    };

    let mut pipeline = builder.build()?;
    info!(run_id = %pipeline.run_id(), "Pipeline configured");

    let summary = pipeline.run().await?;
    info!(
        ingested = summary.ingested,
        training_rounds = summary.training_rounds,
        predictions = summary.predictions,
        overall = ?summary.report.as_ref().and_then(|r| r.overall),
        "Run complete"
    );
    Ok(summary)
}

/// Open the configured stream file, windowed when forecasting
fn open_source(settings: &Settings) -> Result<Box<dyn StreamSource>> {
    let input = &settings.input;
    let mut csv = CsvConfig::new(settings.input_path()?);
    csv.delimiter = input.delimiter;
    csv.has_header = input.has_header;

    match &input.window {
        Some(window) => {
            let observations = CsvSource::open(csv)?;
            info!(
                path = ?observations.path(),
                past_history = window.past_history,
                forecasting_horizon = window.forecasting_horizon,
                "Stream file opened as a moving window"
            );
            let generator = MovingWindowGenerator::new(
                observations,
                MovingWindowConfig {
                    past_history: window.past_history,
                    forecasting_horizon: window.forecasting_horizon,
                    target_columns: input.target_columns.clone(),
                },
            )?;
            Ok(Box::new(generator))
        }
        None => {
            if input.target_columns.is_none() {
                anyhow::bail!("target_columns are required unless a moving window is configured");
            }
            csv.target_columns = input.target_columns.clone();
            let source = CsvSource::open(csv)?;
            info!(path = ?source.path(), "Stream file opened");
            Ok(Box::new(source))
        }
    }
}

fn write_summary(settings: &Settings, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    match &settings.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write run summary to {:?}", path))?;
            info!(path = ?path, "Run summary written");
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn write_metrics(path: &Path) -> Result<()> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    std::fs::write(path, buffer).with_context(|| format!("Failed to write metrics to {:?}", path))
}
