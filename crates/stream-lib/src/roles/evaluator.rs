//! Evaluator role: forwards eval triples to the pluggable evaluator

use super::Poller;
use crate::context::StreamContext;
use crate::evaluation::Evaluator;
use crate::observability::{PipelineMetrics, StructuredLogger};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

pub struct EvaluatorOutcome {
    /// Non-empty drains forwarded to the evaluator
    pub drains: u64,
    pub inputs: u64,
    pub targets: u64,
    pub outputs: u64,
    /// Handed back so the caller can read its report
    pub evaluator: Box<dyn Evaluator>,
}

impl std::fmt::Debug for EvaluatorOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluatorOutcome")
            .field("drains", &self.drains)
            .field("inputs", &self.inputs)
            .field("targets", &self.targets)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

pub struct EvaluatorRole {
    ctx: Arc<dyn StreamContext>,
    evaluator: Box<dyn Evaluator>,
    poller: Poller,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl EvaluatorRole {
    pub fn new(
        ctx: Arc<dyn StreamContext>,
        evaluator: Box<dyn Evaluator>,
        poller: Poller,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            ctx,
            evaluator,
            poller,
            metrics: PipelineMetrics::new(),
            logger,
        }
    }

    pub fn run(mut self) -> Result<EvaluatorOutcome> {
        info!("Starting evaluator");
        let (mut drains, mut inputs, mut targets, mut outputs) = (0u64, 0u64, 0u64, 0u64);

        loop {
            // A drain that starts after finished was seen is the final one
            let finished = self.ctx.is_finished();
            let (x, y, o) = self.ctx.drain_eval_triples();

            if x.is_empty() && y.is_empty() && o.is_empty() {
                if finished {
                    break;
                }
                self.poller.wait();
                continue;
            }

            drains += 1;
            inputs += x.len() as u64;
            targets += y.len() as u64;
            outputs += o.len() as u64;
            debug!(
                inputs = x.len(),
                targets = y.len(),
                outputs = o.len(),
                "Scoring eval drain"
            );

            self.evaluator
                .score(x, y, o)
                .context("Evaluator failed to score triples")?;
            self.metrics.inc_eval_drains();
        }

        self.evaluator
            .finish()
            .context("Evaluator failed to finish")?;
        self.logger
            .log_role_stopped("evaluator", &format!("{} drains scored", drains));

        Ok(EvaluatorOutcome {
            drains,
            inputs,
            targets,
            outputs,
            evaluator: self.evaluator,
        })
    }
}
