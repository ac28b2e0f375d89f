//! Interleaved chunk evaluation
//!
//! Matched triples are grouped into consecutive chunks of `chunk_size`;
//! each full chunk yields one metric value. A trailing partial chunk is
//! scored when the evaluator is finished.

use super::{Aligner, EvaluationReport, Evaluator, Metric, OverallMetric};
use crate::types::Sample;
use anyhow::Result;
use tracing::{debug, info};

/// Default number of instances per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 100;

pub struct ChunkEvaluator {
    metric: Metric,
    chunk_size: usize,
    aligner: Aligner,
    chunk_targets: Vec<Sample>,
    chunk_outputs: Vec<Sample>,
    overall: OverallMetric,
    history: Vec<f64>,
}

impl ChunkEvaluator {
    pub fn new(metric: Metric, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            metric,
            chunk_size,
            aligner: Aligner::new(),
            chunk_targets: Vec::with_capacity(chunk_size),
            chunk_outputs: Vec::with_capacity(chunk_size),
            overall: OverallMetric::default(),
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[f64] {
        &self.history
    }

    fn close_chunk(&mut self) {
        if let Some(value) = self.metric.compute(&self.chunk_targets, &self.chunk_outputs) {
            debug!(
                metric = %self.metric,
                chunk = self.history.len(),
                size = self.chunk_targets.len(),
                value,
                "Chunk evaluated"
            );
            self.history.push(value);
        }
        self.chunk_targets.clear();
        self.chunk_outputs.clear();
    }
}

impl Default for ChunkEvaluator {
    fn default() -> Self {
        Self::new(Metric::Mae, DEFAULT_CHUNK_SIZE)
    }
}

impl Evaluator for ChunkEvaluator {
    fn score(&mut self, x: Vec<Sample>, y: Vec<Sample>, o: Vec<Sample>) -> Result<()> {
        self.aligner.push(x, y, o);

        for (_, target, output) in self.aligner.drain_ready() {
            self.overall.push(&target, &output);
            self.chunk_targets.push(target);
            self.chunk_outputs.push(output);

            if self.chunk_targets.len() == self.chunk_size {
                self.close_chunk();
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.chunk_targets.is_empty() {
            self.close_chunk();
        }
        info!(
            metric = %self.metric,
            chunks = self.history.len(),
            instances = self.overall.len(),
            overall = ?self.overall.value(self.metric),
            "Chunk evaluation finished"
        );
        Ok(())
    }

    fn report(&self) -> Option<EvaluationReport> {
        Some(EvaluationReport {
            evaluator: "chunk".to_string(),
            metric: self.metric,
            instances: self.overall.len(),
            history: self.history.clone(),
            overall: self.overall.value(self.metric),
            unmatched: self.aligner.backlog(),
            generated_at: chrono::Utc::now().timestamp(),
        })
    }
}
