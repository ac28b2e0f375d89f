//! Model capability consumed by the trainer and predictor roles
//!
//! The pipeline treats models as opaque: it only fits, predicts and moves
//! weight snapshots between the two roles.

mod linear;

pub use linear::{LinearFactory, LinearRegressor};

use crate::types::{Matrix, Sample, Weights};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Trait for incremental model implementations
pub trait Model: Send {
    /// Fit on `x` against `(n, output_size)` targets
    fn fit(&mut self, x: &[Sample], y: &Matrix, batch_size: usize, epochs: usize) -> Result<()>;

    /// One output vector per input row
    fn predict(&mut self, x: &[Sample]) -> Result<Vec<Sample>>;

    /// Serialize current parameters
    fn get_weights(&self) -> Result<Weights>;

    /// Replace parameters with a snapshot from `get_weights`
    fn set_weights(&mut self, weights: &Weights) -> Result<()>;
}

/// Trait for building models once the stream shapes are known
pub trait ModelFactory: Send + Sync {
    fn create(&self, spec: &ModelSpec) -> Result<Box<dyn Model>>;
}

/// Shape-independent model settings supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    #[serde(default = "default_loss")]
    pub loss: String,
    #[serde(default = "default_optimizer")]
    pub optimizer: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

fn default_loss() -> String {
    "mse".to_string()
}

fn default_optimizer() -> String {
    "sgd".to_string()
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            loss: default_loss(),
            optimizer: default_optimizer(),
            params: serde_json::Value::Null,
        }
    }
}

/// Everything a factory needs to build a model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub input_shape: Vec<usize>,
    pub output_size: usize,
    pub loss: String,
    pub optimizer: String,
    pub params: serde_json::Value,
}

impl ModelSpec {
    pub fn new(options: &ModelOptions, input_shape: Vec<usize>, output_size: usize) -> Self {
        Self {
            input_shape,
            output_size,
            loss: options.loss.clone(),
            optimizer: options.optimizer.clone(),
            params: options.params.clone(),
        }
    }

    /// Spec for flat input vectors of the given sample
    pub fn for_sample(options: &ModelOptions, sample: &[f32], output_size: usize) -> Self {
        Self::new(options, vec![sample.len()], output_size)
    }

    /// Number of scalar inputs per row
    pub fn input_dim(&self) -> usize {
        self.input_shape.iter().product()
    }
}
