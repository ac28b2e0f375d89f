//! Moving-window generator for time-series forecasting
//!
//! Turns a stream of observations into supervised instances: the input is
//! the last `past_history` observations, the label is the next
//! `forecasting_horizon` values of the target columns. An input is emitted
//! as soon as enough history exists; its label follows once the horizon
//! has been observed, so labels lag behind inputs by `forecasting_horizon`
//! events.

use super::StreamSource;
use crate::error::PipelineError;
use crate::types::{Instance, Sample};
use anyhow::Result;
use std::collections::VecDeque;

/// Configuration for the moving-window generator
#[derive(Debug, Clone, PartialEq)]
pub struct MovingWindowConfig {
    pub past_history: usize,
    pub forecasting_horizon: usize,
    /// Columns forecast in the label; `None` forecasts every column
    pub target_columns: Option<Vec<usize>>,
}

impl Default for MovingWindowConfig {
    fn default() -> Self {
        Self {
            past_history: 10,
            forecasting_horizon: 1,
            target_columns: None,
        }
    }
}

/// Label being accumulated for an already emitted input
#[derive(Debug)]
struct OpenLabel {
    remaining: usize,
    values: Sample,
}

/// Source adapter producing `(past window, future values)` instances
pub struct MovingWindowGenerator<S> {
    inner: S,
    config: MovingWindowConfig,
    history: VecDeque<Sample>,
    open_labels: VecDeque<OpenLabel>,
}

impl<S: StreamSource> MovingWindowGenerator<S> {
    pub fn new(inner: S, config: MovingWindowConfig) -> Result<Self, PipelineError> {
        if config.past_history == 0 || config.forecasting_horizon == 0 {
            return Err(PipelineError::invalid_config(
                "past_history and forecasting_horizon must be at least 1",
            ));
        }
        Ok(Self {
            inner,
            history: VecDeque::with_capacity(config.past_history),
            open_labels: VecDeque::new(),
            config,
        })
    }

    fn target_values(&self, row: &[f32]) -> Result<Sample> {
        match &self.config.target_columns {
            None => Ok(row.to_vec()),
            Some(columns) => columns
                .iter()
                .map(|&c| {
                    row.get(c).copied().ok_or_else(|| {
                        anyhow::anyhow!("Target column {} out of range ({} columns)", c, row.len())
                    })
                })
                .collect(),
        }
    }

    /// Fold one observation in, returning whatever became ready
    fn observe(&mut self, row: Sample) -> Result<Instance> {
        let targets = self.target_values(&row)?;

        for label in self.open_labels.iter_mut() {
            label.values.extend_from_slice(&targets);
            label.remaining -= 1;
        }

        // Labels open one step apart, so only the oldest can complete now
        let y = match self.open_labels.front() {
            Some(label) if label.remaining == 0 => self.open_labels.pop_front().map(|l| l.values),
            _ => None,
        };

        if self.history.len() == self.config.past_history {
            self.history.pop_front();
        }
        self.history.push_back(row);

        let x = if self.history.len() == self.config.past_history {
            self.open_labels.push_back(OpenLabel {
                remaining: self.config.forecasting_horizon,
                values: Vec::with_capacity(targets.len() * self.config.forecasting_horizon),
            });
            Some(self.history.iter().flatten().copied().collect())
        } else {
            None
        };

        Ok(Instance { x, y })
    }
}

impl<S: StreamSource> StreamSource for MovingWindowGenerator<S> {
    fn next(&mut self) -> Result<Option<Instance>> {
        while let Some(event) = self.inner.next()? {
            let Some(row) = event.x else {
                continue;
            };
            let instance = self.observe(row)?;
            if !instance.is_empty() {
                return Ok(Some(instance));
            }
        }
        Ok(None)
    }
}
