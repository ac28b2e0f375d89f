//! Evaluation of predictions against ground truth
//!
//! This module provides:
//! - The pluggable [`Evaluator`] capability driven by the evaluator role
//! - Regression and classification metrics
//! - Prequential (sliding window) and interleaved chunk evaluators

mod aligner;
mod chunk;
mod metrics;
mod prequential;

pub use aligner::{Aligner, Triple};
pub use chunk::ChunkEvaluator;
pub use metrics::Metric;
pub use prequential::PrequentialEvaluator;

use crate::types::Sample;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Trait for scoring `(input, truth, prediction)` triples
pub trait Evaluator: Send {
    /// Consume one drain of the eval queue; sequences may differ in length
    fn score(&mut self, x: Vec<Sample>, y: Vec<Sample>, o: Vec<Sample>) -> Result<()>;

    /// Called once after the final drain
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    /// Results gathered so far
    fn report(&self) -> Option<EvaluationReport> {
        None
    }
}

/// Summary of an evaluation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub evaluator: String,
    pub metric: Metric,
    /// Triples scored
    pub instances: usize,
    /// Metric value per window/chunk step
    pub history: Vec<f64>,
    /// Metric over every scored triple
    pub overall: Option<f64>,
    /// Inputs, targets and outputs still waiting for their counterparts
    pub unmatched: (usize, usize, usize),
    pub generated_at: i64,
}

impl EvaluationReport {
    pub fn last(&self) -> Option<f64> {
        self.history.last().copied()
    }
}

/// Running totals for the overall metric
///
/// Holds sums and counts only, so memory stays constant over the run.
#[derive(Debug, Clone, Default)]
struct OverallMetric {
    abs_error: f64,
    squared_error: f64,
    elements: usize,
    /// Percentage error over non-zero targets
    abs_percentage_error: f64,
    nonzero_targets: usize,
    hits: usize,
    rows: usize,
}

impl OverallMetric {
    fn push(&mut self, target: &[f32], output: &[f32]) {
        for (&t, &o) in target.iter().zip(output) {
            let (t, o) = (t as f64, o as f64);
            self.abs_error += (t - o).abs();
            self.squared_error += (t - o).powi(2);
            self.elements += 1;
            if t != 0.0 {
                self.abs_percentage_error += ((t - o) / t).abs() * 100.0;
                self.nonzero_targets += 1;
            }
        }
        if metrics::class_of(target) == metrics::class_of(output) {
            self.hits += 1;
        }
        self.rows += 1;
    }

    fn value(&self, metric: Metric) -> Option<f64> {
        let ratio = |sum: f64, count: usize| (count > 0).then(|| sum / count as f64);
        match metric {
            Metric::Mae => ratio(self.abs_error, self.elements),
            Metric::Mse => ratio(self.squared_error, self.elements),
            Metric::Rmse => ratio(self.squared_error, self.elements).map(f64::sqrt),
            Metric::Mape => ratio(self.abs_percentage_error, self.nonzero_targets),
            Metric::Accuracy => ratio(self.hits as f64, self.rows),
        }
    }

    fn len(&self) -> usize {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METRICS: [Metric; 5] = [
        Metric::Mae,
        Metric::Mse,
        Metric::Rmse,
        Metric::Mape,
        Metric::Accuracy,
    ];

    #[test]
    fn test_overall_metric_matches_direct_computation() {
        let mut overall = OverallMetric::default();
        let mut targets = Vec::new();
        let mut outputs = Vec::new();

        for drain in 0..200 {
            for i in 0..25 {
                let step = (drain * 25 + i) as f32;
                let target = vec![(step % 7.0) - 3.0, (step % 3.0) * 0.5];
                let output = vec![(step % 5.0) - 2.0, (step % 4.0) * 0.25];
                overall.push(&target, &output);
                targets.push(target);
                outputs.push(output);
            }
        }

        assert_eq!(overall.len(), 5000);
        for metric in METRICS {
            let expected = metric.compute(&targets, &outputs).unwrap();
            let actual = overall.value(metric).unwrap();
            assert!(
                (expected - actual).abs() < 1e-9 * expected.abs().max(1.0),
                "{}: {} != {}",
                metric,
                actual,
                expected
            );
        }
    }

    #[test]
    fn test_overall_metric_empty_and_zero_targets() {
        let mut overall = OverallMetric::default();
        for metric in METRICS {
            assert_eq!(overall.value(metric), None);
        }

        overall.push(&[0.0], &[2.0]);
        assert_eq!(overall.value(Metric::Mae), Some(2.0));
        assert_eq!(overall.value(Metric::Mape), None);
        assert_eq!(overall.value(Metric::Accuracy), Some(0.0));
    }
}
