//! Producer role: feeds the stream into the shared context

use crate::context::StreamContext;
use crate::error::PipelineError;
use crate::observability::PipelineMetrics;
use crate::source::StreamSource;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Instances pulled from the source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerOutcome {
    pub ingested: u64,
    /// Stopped because the run was finished before the source was exhausted
    pub interrupted: bool,
}

pub struct ProducerRole {
    ctx: Arc<dyn StreamContext>,
    source: Box<dyn StreamSource>,
    stream_period: Duration,
    metrics: PipelineMetrics,
}

impl ProducerRole {
    pub fn new(ctx: Arc<dyn StreamContext>, source: Box<dyn StreamSource>) -> Self {
        Self {
            ctx,
            source,
            stream_period: Duration::ZERO,
            metrics: PipelineMetrics::new(),
        }
    }

    /// Delay between two events, for replaying recorded data at stream pace
    pub fn with_stream_period(mut self, period: Duration) -> Self {
        self.stream_period = period;
        self
    }

    pub fn run(mut self) -> Result<ProducerOutcome> {
        info!("Starting producer");
        let mut outcome = ProducerOutcome::default();

        loop {
            if self.ctx.is_finished() {
                outcome.interrupted = true;
                break;
            }

            let next = self.source.next().map_err(|e| {
                PipelineError::Source(format!("failed after {} events: {:#}", outcome.ingested, e))
            })?;
            let Some(instance) = next else {
                break;
            };

            self.ctx.add(instance.x, instance.y);
            outcome.ingested += 1;
            self.metrics.inc_instances_ingested();

            if !self.stream_period.is_zero() {
                std::thread::sleep(self.stream_period);
            }
        }

        // Set even when interrupted so the predictor can still wind down
        self.ctx.set_stream_ended();
        debug!(ingested = outcome.ingested, interrupted = outcome.interrupted, "Stream ended");
        Ok(outcome)
    }
}
