//! Pipeline configuration

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of instances per training batch
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default number of batches kept in the rolling training window
pub const DEFAULT_NUM_BATCHES_FED: usize = 20;

/// Configuration for a single pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Instances per training batch; also the size of the initial window
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of batches kept in the rolling training window
    #[serde(default = "default_num_batches_fed")]
    pub num_batches_fed: usize,

    /// Sleep between empty polls in milliseconds (0 spins)
    #[serde(default)]
    pub poll_interval_ms: u64,

    /// Delay between two stream events in milliseconds
    #[serde(default)]
    pub stream_period_ms: u64,

    /// Stop sibling workers when one of them fails
    #[serde(default = "default_halt_on_worker_error")]
    pub halt_on_worker_error: bool,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_num_batches_fed() -> usize {
    DEFAULT_NUM_BATCHES_FED
}

fn default_halt_on_worker_error() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            num_batches_fed: DEFAULT_NUM_BATCHES_FED,
            poll_interval_ms: 0,
            stream_period_ms: 0,
            halt_on_worker_error: true,
        }
    }
}

impl PipelineConfig {
    pub fn new(batch_size: usize, num_batches_fed: usize) -> Self {
        Self {
            batch_size,
            num_batches_fed,
            ..Default::default()
        }
    }

    /// Check values that would make the protocol meaningless
    pub fn validate(&self) -> PipelineResult<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::invalid_config("batch_size must be at least 1"));
        }
        if self.num_batches_fed == 0 {
            return Err(PipelineError::invalid_config(
                "num_batches_fed must be at least 1",
            ));
        }
        if self.batch_size.checked_mul(self.num_batches_fed).is_none() {
            return Err(PipelineError::invalid_config(format!(
                "training window {} x {} overflows",
                self.batch_size, self.num_batches_fed
            )));
        }
        Ok(())
    }

    /// Upper bound of the rolling training window
    pub fn max_train_window(&self) -> usize {
        self.batch_size * self.num_batches_fed
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stream_period(&self) -> Duration {
        Duration::from_millis(self.stream_period_ms)
    }
}
