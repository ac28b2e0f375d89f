//! Runner settings
//!
//! Layered lowest to highest: built-in defaults, an optional settings file,
//! `ROLLSTREAM_*` environment variables (`__` separates nested keys, e.g.
//! `ROLLSTREAM_PIPELINE__BATCH_SIZE=64`), then command-line flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stream_lib::evaluation::Metric;
use stream_lib::model::ModelOptions;
use stream_lib::PipelineConfig;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ROLLSTREAM";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub input: InputSettings,

    #[serde(default)]
    pub model: ModelOptions,

    #[serde(default)]
    pub evaluation: EvaluationSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Where the run summary is written; stdout when unset
    #[serde(default)]
    pub output: Option<PathBuf>,
}

/// Stream file and how its rows become instances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSettings {
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    #[serde(default)]
    pub has_header: bool,

    /// Label columns; forecast columns when `window` is set
    #[serde(default)]
    pub target_columns: Option<Vec<usize>>,

    /// Turn a time series into forecasting instances
    #[serde(default)]
    pub window: Option<WindowSettings>,
}

fn default_delimiter() -> char {
    ','
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            path: None,
            delimiter: default_delimiter(),
            has_header: false,
            target_columns: None,
            window: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSettings {
    #[serde(default = "default_past_history")]
    pub past_history: usize,

    #[serde(default = "default_forecasting_horizon")]
    pub forecasting_horizon: usize,
}

fn default_past_history() -> usize {
    10
}

fn default_forecasting_horizon() -> usize {
    1
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            past_history: default_past_history(),
            forecasting_horizon: default_forecasting_horizon(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorKind {
    /// Sliding-window metric per instance
    Prequential,
    /// Metric per fixed-size chunk
    Chunk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSettings {
    #[serde(default = "default_evaluator")]
    pub kind: EvaluatorKind,

    #[serde(default = "default_metric")]
    pub metric: Metric,

    /// Sliding window or chunk size
    #[serde(default = "default_evaluation_window")]
    pub window_size: usize,
}

fn default_evaluator() -> EvaluatorKind {
    EvaluatorKind::Prequential
}

fn default_metric() -> Metric {
    Metric::Mae
}

fn default_evaluation_window() -> usize {
    100
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            kind: default_evaluator(),
            metric: default_metric(),
            window_size: default_evaluation_window(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Command-line values that take precedence over every other layer
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub input: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub num_batches_fed: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub stream_period_ms: Option<u64>,
    pub target_columns: Option<Vec<usize>>,
    pub past_history: Option<usize>,
    pub forecasting_horizon: Option<usize>,
    pub evaluator: Option<EvaluatorKind>,
    pub metric: Option<Metric>,
    pub learning_rate: Option<f64>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub output: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the optional file and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read settings")?;

        config
            .try_deserialize()
            .context("Failed to parse settings")
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(path) = overrides.input {
            self.input.path = Some(path);
        }
        if let Some(batch_size) = overrides.batch_size {
            self.pipeline.batch_size = batch_size;
        }
        if let Some(num_batches_fed) = overrides.num_batches_fed {
            self.pipeline.num_batches_fed = num_batches_fed;
        }
        if let Some(interval) = overrides.poll_interval_ms {
            self.pipeline.poll_interval_ms = interval;
        }
        if let Some(period) = overrides.stream_period_ms {
            self.pipeline.stream_period_ms = period;
        }
        if let Some(columns) = overrides.target_columns {
            self.input.target_columns = Some(columns);
        }
        if overrides.past_history.is_some() || overrides.forecasting_horizon.is_some() {
            let window = self.input.window.get_or_insert_with(WindowSettings::default);
            if let Some(past_history) = overrides.past_history {
                window.past_history = past_history;
            }
            if let Some(horizon) = overrides.forecasting_horizon {
                window.forecasting_horizon = horizon;
            }
        }
        if let Some(kind) = overrides.evaluator {
            self.evaluation.kind = kind;
        }
        if let Some(metric) = overrides.metric {
            self.evaluation.metric = metric;
        }
        if let Some(learning_rate) = overrides.learning_rate {
            set_param(&mut self.model, "learning_rate", learning_rate);
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
        if let Some(output) = overrides.output {
            self.output = Some(output);
        }
    }

    /// Path of the stream file, required to run
    pub fn input_path(&self) -> Result<&Path> {
        self.input
            .path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No input file given (use --input or input.path)"))
    }
}

fn set_param(options: &mut ModelOptions, key: &str, value: f64) {
    if !options.params.is_object() {
        options.params = serde_json::Value::Object(serde_json::Map::new());
    }
    if let Some(params) = options.params.as_object_mut() {
        params.insert(key.to_string(), serde_json::json!(value));
    }
}
