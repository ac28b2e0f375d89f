//! Shared stream context
//!
//! The context is the only state shared by the four pipeline workers.
//! Workers never talk to each other directly; they poll and mutate the
//! context through the [`StreamContext`] service interface.

mod shared;

pub use shared::SharedStreamContext;

use crate::types::{Sample, Weights};
use serde::Serialize;

/// Eval triples drained in one call: inputs, targets and model outputs
pub type EvalTriples = (Vec<Sample>, Vec<Sample>, Vec<Sample>);

/// Service interface over the shared context
///
/// Every call is internally serialized; no lock is ever held across a call
/// boundary, so callers may run on any thread.
pub trait StreamContext: Send + Sync {
    /// Route a new input and/or label to the training window or the pending queue
    fn add(&self, x: Option<Sample>, y: Option<Sample>);

    /// Move the pending queue into the training window and the eval queue,
    /// returning the drained inputs
    fn drain_pending(&self) -> Vec<Sample>;

    /// Approximate pending queue length
    fn pending_count(&self) -> usize;

    /// Snapshot of the rolling training window, empty until the first batch is complete
    fn training_window(&self) -> (Vec<Sample>, Vec<Sample>);

    /// Publish a new weight snapshot and raise the new-weights flag
    fn publish_weights(&self, weights: Weights);

    /// Last published weights, if any
    fn weights(&self) -> Option<Weights>;

    fn has_new_weights(&self) -> bool;

    fn clear_new_weights_flag(&self);

    /// Read the latest weights and clear the flag in one step
    fn take_new_weights(&self) -> Option<Weights>;

    /// Number of publishes so far
    fn weights_version(&self) -> u64;

    /// Swap out every eval sequence
    fn drain_eval_triples(&self) -> EvalTriples;

    fn append_eval_outputs(&self, outputs: Vec<Sample>);

    fn set_stream_ended(&self);

    fn is_stream_ended(&self) -> bool;

    fn set_finished(&self);

    fn is_finished(&self) -> bool;

    /// Fix the number of target dimensions; later calls are ignored
    fn set_output_size(&self, size: usize);

    /// Number of target dimensions, `None` until the trainer has seen a batch
    fn output_size(&self) -> Option<usize>;

    fn stats(&self) -> ContextStats;
}

/// Buffer sizes at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    pub training_inputs: usize,
    pub training_targets: usize,
    pub pending_inputs: usize,
    pub pending_targets: usize,
    pub eval_inputs: usize,
    pub eval_targets: usize,
    pub eval_outputs: usize,
    pub weights_version: u64,
}
