//! Multi-output linear regressor trained with mini-batch SGD
//!
//! Small enough to run inside tests and the runner binary; any heavier
//! model plugs in through [`ModelFactory`].

use super::{Model, ModelFactory, ModelSpec};
use crate::error::PipelineError;
use crate::types::{Matrix, Sample, Weights};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_LEARNING_RATE: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Loss {
    SquaredError,
    AbsoluteError,
}

impl Loss {
    fn parse(name: &str) -> Result<Self, PipelineError> {
        match name.to_ascii_lowercase().as_str() {
            "mse" | "mean_squared_error" => Ok(Self::SquaredError),
            "mae" | "mean_absolute_error" => Ok(Self::AbsoluteError),
            other => Err(PipelineError::invalid_config(format!(
                "unsupported loss {:?} for linear model",
                other
            ))),
        }
    }

    /// d(loss)/d(prediction) for a single output
    fn gradient(self, predicted: f32, actual: f32) -> f32 {
        let error = predicted - actual;
        match self {
            Self::SquaredError => 2.0 * error,
            Self::AbsoluteError => error.signum(),
        }
    }
}

/// Serialized parameter layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LinearParams {
    input_dim: usize,
    output_size: usize,
    coefficients: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

/// Linear model `o = W x + b` with one row of `W` per output
#[derive(Debug, Clone)]
pub struct LinearRegressor {
    params: LinearParams,
    loss: Loss,
    learning_rate: f32,
    l2: f32,
    samples_seen: u64,
}

impl LinearRegressor {
    pub fn new(spec: &ModelSpec) -> Result<Self, PipelineError> {
        if !spec.optimizer.eq_ignore_ascii_case("sgd") {
            return Err(PipelineError::invalid_config(format!(
                "unsupported optimizer {:?} for linear model",
                spec.optimizer
            )));
        }
        let input_dim = spec.input_dim();
        if input_dim == 0 || spec.output_size == 0 {
            return Err(PipelineError::invalid_config(
                "linear model needs non-empty input and output",
            ));
        }

        let learning_rate = param_f32(&spec.params, "learning_rate").unwrap_or(DEFAULT_LEARNING_RATE);
        let l2 = param_f32(&spec.params, "l2").unwrap_or(0.0);

        Ok(Self {
            params: LinearParams {
                input_dim,
                output_size: spec.output_size,
                coefficients: vec![vec![0.0; input_dim]; spec.output_size],
                bias: vec![0.0; spec.output_size],
            },
            loss: Loss::parse(&spec.loss)?,
            learning_rate,
            l2,
            samples_seen: 0,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.params.input_dim
    }

    pub fn output_size(&self) -> usize {
        self.params.output_size
    }

    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    fn check_input(&self, row: &[f32]) -> Result<(), PipelineError> {
        if row.len() != self.params.input_dim {
            return Err(PipelineError::ShapeMismatch {
                expected: self.params.input_dim,
                actual: row.len(),
            });
        }
        Ok(())
    }

    fn forward(&self, row: &[f32]) -> Sample {
        self.params
            .coefficients
            .iter()
            .zip(&self.params.bias)
            .map(|(w, b)| w.iter().zip(row).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect()
    }

    fn step(&mut self, rows: &[Sample], targets: &[&[f32]]) {
        let n = rows.len() as f32;
        let out = self.params.output_size;
        let dim = self.params.input_dim;
        let mut grad_w = vec![vec![0.0f32; dim]; out];
        let mut grad_b = vec![0.0f32; out];

        for (row, target) in rows.iter().zip(targets) {
            let predicted = self.forward(row);
            for k in 0..out {
                let g = self.loss.gradient(predicted[k], target[k]);
                grad_b[k] += g;
                for (gw, x) in grad_w[k].iter_mut().zip(row) {
                    *gw += g * x;
                }
            }
        }

        for k in 0..out {
            for (w, gw) in self.params.coefficients[k].iter_mut().zip(&grad_w[k]) {
                *w -= self.learning_rate * (gw / n + self.l2 * *w);
            }
            self.params.bias[k] -= self.learning_rate * grad_b[k] / n;
        }
    }
}

fn param_f32(params: &serde_json::Value, key: &str) -> Option<f32> {
    params.get(key).and_then(|v| v.as_f64()).map(|v| v as f32)
}

impl Model for LinearRegressor {
    fn fit(&mut self, x: &[Sample], y: &Matrix, batch_size: usize, epochs: usize) -> Result<()> {
        if x.len() != y.rows() {
            return Err(PipelineError::ShapeMismatch {
                expected: x.len(),
                actual: y.rows(),
            }
            .into());
        }
        if y.cols() != self.params.output_size {
            return Err(PipelineError::ShapeMismatch {
                expected: self.params.output_size,
                actual: y.cols(),
            }
            .into());
        }
        for row in x {
            self.check_input(row)?;
        }

        let targets: Vec<&[f32]> = y.iter_rows().collect();
        let batch_size = batch_size.max(1);
        for _ in 0..epochs {
            for (rows, batch_targets) in x.chunks(batch_size).zip(targets.chunks(batch_size)) {
                self.step(rows, batch_targets);
            }
        }
        self.samples_seen += (x.len() * epochs) as u64;

        debug!(rows = x.len(), epochs, "Linear model fitted");
        Ok(())
    }

    fn predict(&mut self, x: &[Sample]) -> Result<Vec<Sample>> {
        x.iter()
            .map(|row| {
                self.check_input(row)?;
                Ok(self.forward(row))
            })
            .collect()
    }

    fn get_weights(&self) -> Result<Weights> {
        let bytes = serde_json::to_vec(&self.params).context("Failed to serialize weights")?;
        Ok(Weights::from(bytes))
    }

    fn set_weights(&mut self, weights: &Weights) -> Result<()> {
        let params: LinearParams =
            serde_json::from_slice(weights.as_bytes()).context("Failed to deserialize weights")?;
        if params.input_dim != self.params.input_dim {
            return Err(PipelineError::ShapeMismatch {
                expected: self.params.input_dim,
                actual: params.input_dim,
            }
            .into());
        }
        if params.output_size != self.params.output_size {
            return Err(PipelineError::ShapeMismatch {
                expected: self.params.output_size,
                actual: params.output_size,
            }
            .into());
        }
        self.params = params;
        Ok(())
    }
}

/// Factory building [`LinearRegressor`] models
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearFactory;

impl ModelFactory for LinearFactory {
    fn create(&self, spec: &ModelSpec) -> Result<Box<dyn Model>> {
        Ok(Box::new(LinearRegressor::new(spec)?))
    }
}
