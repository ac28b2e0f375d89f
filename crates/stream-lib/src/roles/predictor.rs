//! Predictor role: serves predictions and ends the run
//!
//! The predictor is the only role that finishes a healthy run, either when
//! the stream ends before any model was trained or once the stream has ended
//! and every pending input has been predicted.

use super::Poller;
use crate::context::StreamContext;
use crate::model::{Model, ModelFactory, ModelOptions, ModelSpec};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::types::Sample;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictorOutcome {
    pub predictions: u64,
    pub batches: u64,
    /// Weight snapshots loaded into the predictor's model
    pub weight_loads: u64,
    /// The stream ended before the trainer published any weights
    pub ended_without_model: bool,
}

/// How the wait for the first model ended
enum FirstWeights {
    Ready,
    StreamEnded,
    /// Another worker already finished the run
    Halted,
}

pub struct PredictorRole {
    ctx: Arc<dyn StreamContext>,
    factory: Arc<dyn ModelFactory>,
    options: ModelOptions,
    poller: Poller,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl PredictorRole {
    pub fn new(
        ctx: Arc<dyn StreamContext>,
        factory: Arc<dyn ModelFactory>,
        options: ModelOptions,
        poller: Poller,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            ctx,
            factory,
            options,
            poller,
            metrics: PipelineMetrics::new(),
            logger,
        }
    }

    pub fn run(self) -> Result<PredictorOutcome> {
        info!("Starting predictor");
        let mut outcome = PredictorOutcome::default();

        match self.wait_for_first_weights() {
            FirstWeights::Ready => {}
            FirstWeights::StreamEnded => {
                outcome.ended_without_model = true;
                self.ctx.set_finished();
                self.logger
                    .log_role_stopped("predictor", "stream ended before any model was trained");
                return Ok(outcome);
            }
            FirstWeights::Halted => {
                self.logger.log_role_stopped("predictor", "halted");
                return Ok(outcome);
            }
        }

        let mut model: Option<Box<dyn Model>> = None;
        while !self.ctx.is_finished() {
            // Read the flag before draining so nothing added in between is lost
            let ended = self.ctx.is_stream_ended();
            let x = self.ctx.drain_pending();
            self.metrics.set_pending_instances(x.len());

            if x.is_empty() {
                if ended {
                    break;
                }
                self.poller.wait();
                continue;
            }

            if model.is_none() {
                let Some(output_size) = self.wait_for_output_size() else {
                    break;
                };
                model = Some(self.create_model(&x[0], output_size)?);
            }
            let Some(model) = model.as_mut() else {
                continue;
            };

            if let Some(weights) = self.ctx.take_new_weights() {
                model
                    .set_weights(&weights)
                    .context("Failed to load published weights")?;
                outcome.weight_loads += 1;
            }

            let start = Instant::now();
            let predictions = model.predict(&x).context("Model predict failed")?;
            self.metrics
                .observe_predict_latency(start.elapsed().as_secs_f64());

            outcome.predictions += predictions.len() as u64;
            outcome.batches += 1;
            self.metrics.add_predictions(predictions.len());
            debug!(inputs = x.len(), "Predicted pending batch");

            self.ctx.append_eval_outputs(predictions);
        }

        self.ctx.set_finished();
        self.logger.log_role_stopped(
            "predictor",
            &format!("{} predictions", outcome.predictions),
        );
        Ok(outcome)
    }

    fn wait_for_first_weights(&self) -> FirstWeights {
        loop {
            if self.ctx.has_new_weights() {
                return FirstWeights::Ready;
            }
            if self.ctx.is_finished() {
                return FirstWeights::Halted;
            }
            let ended = self.ctx.is_stream_ended();
            if ended && self.ctx.pending_count() == 0 {
                return FirstWeights::StreamEnded;
            }
            self.poller.wait();
        }
    }

    fn create_model(&self, first_input: &Sample, output_size: usize) -> Result<Box<dyn Model>> {
        let spec = ModelSpec::for_sample(&self.options, first_input, output_size);
        let model = self
            .factory
            .create(&spec)
            .context("Failed to create predictor model")?;
        self.logger
            .log_model_created("predictor", &spec.input_shape, output_size);
        Ok(model)
    }

    /// The trainer fixes the output size before its first publish
    fn wait_for_output_size(&self) -> Option<usize> {
        loop {
            if let Some(size) = self.ctx.output_size() {
                return Some(size);
            }
            if self.ctx.is_finished() {
                return None;
            }
            self.poller.wait();
        }
    }
}
