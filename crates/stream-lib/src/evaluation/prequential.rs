//! Prequential evaluation over a sliding window
//!
//! Every matched triple is scored as it arrives ("test then train"): the
//! metric is recomputed over the last `window_size` instances and appended
//! to the history.

use super::{Aligner, EvaluationReport, Evaluator, Metric, OverallMetric};
use crate::types::Sample;
use anyhow::Result;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Default sliding window size
pub const DEFAULT_WINDOW_SIZE: usize = 100;

pub struct PrequentialEvaluator {
    metric: Metric,
    window_size: usize,
    aligner: Aligner,
    window_targets: VecDeque<Sample>,
    window_outputs: VecDeque<Sample>,
    overall: OverallMetric,
    history: Vec<f64>,
}

impl PrequentialEvaluator {
    pub fn new(metric: Metric, window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            metric,
            window_size,
            aligner: Aligner::new(),
            window_targets: VecDeque::with_capacity(window_size),
            window_outputs: VecDeque::with_capacity(window_size),
            overall: OverallMetric::default(),
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[f64] {
        &self.history
    }

    fn window_value(&mut self) -> Option<f64> {
        let targets = self.window_targets.make_contiguous();
        let outputs = self.window_outputs.make_contiguous();
        self.metric.compute(targets, outputs)
    }
}

impl Default for PrequentialEvaluator {
    fn default() -> Self {
        Self::new(Metric::Mae, DEFAULT_WINDOW_SIZE)
    }
}

impl Evaluator for PrequentialEvaluator {
    fn score(&mut self, x: Vec<Sample>, y: Vec<Sample>, o: Vec<Sample>) -> Result<()> {
        self.aligner.push(x, y, o);

        for (_, target, output) in self.aligner.drain_ready() {
            if self.window_targets.len() == self.window_size {
                self.window_targets.pop_front();
                self.window_outputs.pop_front();
            }
            self.overall.push(&target, &output);
            self.window_targets.push_back(target);
            self.window_outputs.push_back(output);

            if let Some(value) = self.window_value() {
                self.history.push(value);
            }
        }

        debug!(
            metric = %self.metric,
            instances = self.overall.len(),
            current = ?self.history.last(),
            "Prequential evaluation updated"
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        info!(
            metric = %self.metric,
            instances = self.overall.len(),
            overall = ?self.overall.value(self.metric),
            "Prequential evaluation finished"
        );
        Ok(())
    }

    fn report(&self) -> Option<EvaluationReport> {
        Some(EvaluationReport {
            evaluator: "prequential".to_string(),
            metric: self.metric,
            instances: self.overall.len(),
            history: self.history.clone(),
            overall: self.overall.value(self.metric),
            unmatched: self.aligner.backlog(),
            generated_at: chrono::Utc::now().timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[f32]) -> Vec<Sample> {
        values.iter().map(|&v| vec![v]).collect()
    }

    #[test]
    fn test_sliding_window_history() {
        let mut evaluator = PrequentialEvaluator::new(Metric::Mae, 2);
        evaluator
            .score(rows(&[0.0; 3]), rows(&[1.0, 2.0, 3.0]), rows(&[2.0, 2.0, 5.0]))
            .unwrap();

        // Windows: [1], [1, 0], [0, 2]
        assert_eq!(evaluator.history(), &[1.0, 0.5, 1.0]);

        let report = evaluator.report().unwrap();
        assert_eq!(report.instances, 3);
        assert_eq!(report.overall, Some(1.0));
        assert_eq!(report.last(), Some(1.0));
        assert_eq!(report.unmatched, (0, 0, 0));
    }

    #[test]
    fn test_unmatched_outputs_wait_for_inputs() {
        let mut evaluator = PrequentialEvaluator::new(Metric::Mse, 10);
        evaluator.score(vec![], vec![], rows(&[1.0])).unwrap();
        assert!(evaluator.history().is_empty());
        assert_eq!(evaluator.report().unwrap().unmatched, (0, 0, 1));

        evaluator.score(rows(&[0.0]), rows(&[3.0]), vec![]).unwrap();
        assert_eq!(evaluator.history(), &[4.0]);
        evaluator.finish().unwrap();
    }

    #[test]
    fn test_overall_over_many_drains() {
        let mut evaluator = PrequentialEvaluator::new(Metric::Rmse, 10);
        let mut targets = Vec::new();
        let mut outputs = Vec::new();

        for drain in 0..500 {
            let y: Vec<f32> = (0..20).map(|i| ((drain + i) % 9) as f32).collect();
            let o: Vec<f32> = (0..20).map(|i| ((drain * 3 + i) % 7) as f32).collect();
            targets.extend(rows(&y));
            outputs.extend(rows(&o));
            evaluator.score(rows(&[0.0; 20]), rows(&y), rows(&o)).unwrap();
        }

        let report = evaluator.report().unwrap();
        let expected = Metric::Rmse.compute(&targets, &outputs).unwrap();
        assert_eq!(report.instances, 10_000);
        assert!((report.overall.unwrap() - expected).abs() < 1e-9);
        assert_eq!(evaluator.window_targets.len(), 10);
    }
}
