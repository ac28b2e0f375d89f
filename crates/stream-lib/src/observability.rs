//! Observability infrastructure for the pipeline
//!
//! Provides:
//! - Prometheus metrics (ingestion, training, prediction and evaluation counters,
//!   buffer gauges, fit/predict latency)
//! - Structured logging of pipeline lifecycle events with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for fit/predict latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    instances_ingested: IntCounter,
    training_rounds: IntCounter,
    predictions_made: IntCounter,
    eval_drains: IntCounter,
    training_window_size: IntGauge,
    pending_instances: IntGauge,
    weights_version: IntGauge,
    fit_latency_seconds: Histogram,
    predict_latency_seconds: Histogram,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            instances_ingested: register_int_counter!(
                "rollstream_instances_ingested_total",
                "Stream events added to the shared context"
            )
            .expect("Failed to register instances_ingested"),

            training_rounds: register_int_counter!(
                "rollstream_training_rounds_total",
                "Incremental fits completed by the trainer"
            )
            .expect("Failed to register training_rounds"),

            predictions_made: register_int_counter!(
                "rollstream_predictions_total",
                "Inputs predicted by the predictor"
            )
            .expect("Failed to register predictions_made"),

            eval_drains: register_int_counter!(
                "rollstream_eval_drains_total",
                "Non-empty eval drains forwarded to the evaluator"
            )
            .expect("Failed to register eval_drains"),

            training_window_size: register_int_gauge!(
                "rollstream_training_window_size",
                "Rows in the last training window snapshot"
            )
            .expect("Failed to register training_window_size"),

            pending_instances: register_int_gauge!(
                "rollstream_pending_instances",
                "Inputs drained for prediction in the last predictor round"
            )
            .expect("Failed to register pending_instances"),

            weights_version: register_int_gauge!(
                "rollstream_weights_version",
                "Number of weight snapshots published"
            )
            .expect("Failed to register weights_version"),

            fit_latency_seconds: register_histogram!(
                "rollstream_fit_latency_seconds",
                "Time spent in one incremental fit",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register fit_latency_seconds"),

            predict_latency_seconds: register_histogram!(
                "rollstream_predict_latency_seconds",
                "Time spent predicting one drained batch",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register predict_latency_seconds"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn inc_instances_ingested(&self) {
        self.inner().instances_ingested.inc();
    }

    pub fn inc_training_rounds(&self) {
        self.inner().training_rounds.inc();
    }

    pub fn add_predictions(&self, count: usize) {
        self.inner().predictions_made.inc_by(count as u64);
    }

    pub fn inc_eval_drains(&self) {
        self.inner().eval_drains.inc();
    }

    pub fn set_training_window_size(&self, rows: usize) {
        self.inner().training_window_size.set(rows as i64);
    }

    pub fn set_pending_instances(&self, count: usize) {
        self.inner().pending_instances.set(count as i64);
    }

    pub fn set_weights_version(&self, version: u64) {
        self.inner().weights_version.set(version as i64);
    }

    pub fn observe_fit_latency(&self, duration_secs: f64) {
        self.inner().fit_latency_seconds.observe(duration_secs);
    }

    pub fn observe_predict_latency(&self, duration_secs: f64) {
        self.inner().predict_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for pipeline lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    run_id: String,
}

impl StructuredLogger {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log_pipeline_started(&self, batch_size: usize, num_batches_fed: usize, poll_interval_ms: u64) {
        info!(
            event = "pipeline_started",
            run_id = %self.run_id,
            batch_size,
            num_batches_fed,
            max_train_window = batch_size * num_batches_fed,
            poll_interval_ms,
            "Streaming pipeline started"
        );
    }

    pub fn log_model_created(&self, role: &str, input_shape: &[usize], output_size: usize) {
        info!(
            event = "model_created",
            run_id = %self.run_id,
            role = %role,
            input_shape = ?input_shape,
            output_size,
            "Model created for observed shapes"
        );
    }

    pub fn log_role_stopped(&self, role: &str, detail: &str) {
        info!(
            event = "role_stopped",
            run_id = %self.run_id,
            role = %role,
            detail = %detail,
            "Worker stopped"
        );
    }

    pub fn log_role_failed(&self, role: &str, error: &str) {
        warn!(
            event = "role_failed",
            run_id = %self.run_id,
            role = %role,
            error = %error,
            "Worker terminated abnormally"
        );
    }

    pub fn log_pipeline_finished(&self, output_size: Option<usize>, weights_version: u64, elapsed_ms: u128) {
        info!(
            event = "pipeline_finished",
            run_id = %self.run_id,
            output_size = ?output_size,
            weights_version,
            elapsed_ms = elapsed_ms as u64,
            "Streaming pipeline finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_metrics_creation() {
        let metrics = PipelineMetrics::new();
        let again = PipelineMetrics::new();

        metrics.inc_instances_ingested();
        metrics.inc_training_rounds();
        metrics.add_predictions(3);
        again.inc_eval_drains();
        again.set_training_window_size(10);
        again.set_pending_instances(2);
        again.set_weights_version(4);
        metrics.observe_fit_latency(0.001);
        metrics.observe_predict_latency(0.002);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("run-1");
        assert_eq!(logger.run_id(), "run-1");
        logger.log_role_stopped("trainer", "finished");
    }
}
