//! Trainer role: incremental fitting on the rolling training window
//!
//! The trainer waits for the first complete batch, binds the model shape
//! to it, then refits and republishes weights every round until the run
//! is finished.

use super::Poller;
use crate::context::StreamContext;
use crate::model::{Model, ModelFactory, ModelOptions, ModelSpec};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::types::{Matrix, Sample};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Epochs per incremental fit
const EPOCHS_PER_ROUND: usize = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainerOutcome {
    pub rounds: u64,
    /// Shapes bound on the first window, `None` if no window ever filled
    pub input_shape: Option<Vec<usize>>,
    pub output_size: Option<usize>,
}

pub struct TrainerRole {
    ctx: Arc<dyn StreamContext>,
    factory: Arc<dyn ModelFactory>,
    options: ModelOptions,
    batch_size: usize,
    poller: Poller,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl TrainerRole {
    pub fn new(
        ctx: Arc<dyn StreamContext>,
        factory: Arc<dyn ModelFactory>,
        options: ModelOptions,
        batch_size: usize,
        poller: Poller,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            ctx,
            factory,
            options,
            batch_size,
            poller,
            metrics: PipelineMetrics::new(),
            logger,
        }
    }

    pub fn run(self) -> Result<TrainerOutcome> {
        info!(batch_size = self.batch_size, "Starting trainer");
        let mut outcome = TrainerOutcome::default();
        let mut model: Option<(Box<dyn Model>, usize)> = None;

        while !self.ctx.is_finished() {
            let (mut x, mut y) = self.ctx.training_window();
            if y.is_empty() {
                self.poller.wait();
                continue;
            }

            // Labels may run ahead of inputs; fit only complete pairs
            let rows = x.len().min(y.len());
            if rows == 0 {
                self.poller.wait();
                continue;
            }
            x.truncate(rows);
            y.truncate(rows);

            if model.is_none() {
                let (bound, spec) = self.bind_model(&x, &y)?;
                outcome.input_shape = Some(spec.input_shape);
                outcome.output_size = Some(spec.output_size);
                model = Some((bound, spec.output_size));
            }
            let Some((model, output_size)) = model.as_mut() else {
                continue;
            };
            let output_size = *output_size;

            let targets = Matrix::from_rows(&y, output_size)
                .context("Training targets do not match the bound output size")?;

            let start = Instant::now();
            model
                .fit(&x, &targets, self.batch_size, EPOCHS_PER_ROUND)
                .context("Model fit failed")?;
            self.metrics.observe_fit_latency(start.elapsed().as_secs_f64());

            let weights = model.get_weights().context("Failed to read model weights")?;
            self.ctx.publish_weights(weights);

            outcome.rounds += 1;
            self.metrics.inc_training_rounds();
            self.metrics.set_training_window_size(rows);
            self.metrics.set_weights_version(self.ctx.weights_version());
            debug!(round = outcome.rounds, rows, "Training round complete");
        }

        self.logger
            .log_role_stopped("trainer", &format!("{} rounds", outcome.rounds));
        Ok(outcome)
    }

    /// Create the model from the first window and publish its output size
    fn bind_model(&self, x: &[Sample], y: &[Sample]) -> Result<(Box<dyn Model>, ModelSpec)> {
        let output_size = y[0].len();
        self.ctx.set_output_size(output_size);

        let spec = ModelSpec::for_sample(&self.options, &x[0], output_size);
        let model = self
            .factory
            .create(&spec)
            .context("Failed to create trainer model")?;
        self.logger
            .log_model_created("trainer", &spec.input_shape, output_size);
        Ok((model, spec))
    }
}
