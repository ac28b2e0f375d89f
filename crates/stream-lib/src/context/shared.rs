//! In-process implementation of the shared stream context
//!
//! Two locks guard the buffers:
//! - `data_lock` guards the training window and the pending queue
//! - `eval_lock` guards the eval queue
//!
//! Only `drain_pending` takes both, always `data_lock` first.

use super::{ContextStats, EvalTriples, StreamContext};
use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::types::{Sample, Weights};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;
use tracing::debug;

/// Training window and pending-prediction queue
#[derive(Debug, Default)]
struct DataBuffers {
    training_inputs: VecDeque<Sample>,
    training_targets: VecDeque<Sample>,
    pending_inputs: Vec<Sample>,
    pending_targets: Vec<Sample>,
}

/// Matched triples awaiting the evaluator
#[derive(Debug, Default)]
struct EvalBuffers {
    inputs: Vec<Sample>,
    targets: Vec<Sample>,
    outputs: Vec<Sample>,
}

#[derive(Debug, Default)]
struct WeightState {
    latest: Option<Weights>,
    fresh: bool,
    version: u64,
}

/// Shared state of one pipeline run
#[derive(Debug)]
pub struct SharedStreamContext {
    batch_size: usize,
    num_batches_fed: usize,
    max_train_window: usize,
    data_lock: Mutex<DataBuffers>,
    eval_lock: Mutex<EvalBuffers>,
    weights: Mutex<WeightState>,
    /// Mirror of `pending_inputs.len()`, written under `data_lock`
    pending_len: AtomicUsize,
    output_size: OnceLock<usize>,
    stream_ended: AtomicBool,
    finished: AtomicBool,
}

impl SharedStreamContext {
    /// Create a context sized by `batch_size * num_batches_fed`
    pub fn new(batch_size: usize, num_batches_fed: usize) -> PipelineResult<Self> {
        let config = PipelineConfig::new(batch_size, num_batches_fed);
        config.validate()?;
        Ok(Self::from_config(&config))
    }

    /// Create a context from an already validated configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            num_batches_fed: config.num_batches_fed,
            max_train_window: config.max_train_window(),
            data_lock: Mutex::new(DataBuffers::default()),
            eval_lock: Mutex::new(EvalBuffers::default()),
            weights: Mutex::new(WeightState::default()),
            pending_len: AtomicUsize::new(0),
            output_size: OnceLock::new(),
            stream_ended: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_batches_fed(&self) -> usize {
        self.num_batches_fed
    }

    pub fn max_train_window(&self) -> usize {
        self.max_train_window
    }
}

/// Keep only the newest `max` entries
fn evict_oldest(buffer: &mut VecDeque<Sample>, max: usize) -> usize {
    let excess = buffer.len().saturating_sub(max);
    buffer.drain(..excess);
    excess
}

impl StreamContext for SharedStreamContext {
    fn add(&self, x: Option<Sample>, y: Option<Sample>) {
        let mut data = self.data_lock.lock();

        if let Some(x) = x {
            if data.training_inputs.len() < self.batch_size {
                data.training_inputs.push_back(x);
            } else {
                data.pending_inputs.push(x);
                self.pending_len
                    .store(data.pending_inputs.len(), Ordering::Release);
            }
        }

        if let Some(y) = y {
            if data.training_targets.len() < self.batch_size {
                data.training_targets.push_back(y);
            } else {
                data.pending_targets.push(y);
            }
        }
    }

    fn drain_pending(&self) -> Vec<Sample> {
        let mut data = self.data_lock.lock();

        let inputs = std::mem::take(&mut data.pending_inputs);
        let targets = std::mem::take(&mut data.pending_targets);
        self.pending_len.store(0, Ordering::Release);

        if inputs.is_empty() && targets.is_empty() {
            return inputs;
        }

        data.training_inputs.extend(inputs.iter().cloned());
        data.training_targets.extend(targets.iter().cloned());

        {
            // Lock order: data_lock -> eval_lock
            let mut eval = self.eval_lock.lock();
            eval.inputs.extend(inputs.iter().cloned());
            eval.targets.extend(targets);
        }

        inputs
    }

    fn pending_count(&self) -> usize {
        self.pending_len.load(Ordering::Acquire)
    }

    fn training_window(&self) -> (Vec<Sample>, Vec<Sample>) {
        let mut data = self.data_lock.lock();

        if data.training_targets.len() < self.batch_size {
            return (Vec::new(), Vec::new());
        }

        let evicted_inputs = evict_oldest(&mut data.training_inputs, self.max_train_window);
        let evicted_targets = evict_oldest(&mut data.training_targets, self.max_train_window);
        if evicted_inputs > 0 || evicted_targets > 0 {
            debug!(
                evicted_inputs,
                evicted_targets,
                window = self.max_train_window,
                "Trimmed training window"
            );
        }

        // Both halves are cut at the target length taken after the trim.
        // Each half was trimmed by its own length, so targets running more
        // than a window ahead of inputs lose their oldest labels only.
        let len = data.training_targets.len();
        let inputs = data.training_inputs.iter().take(len).cloned().collect();
        let targets = data.training_targets.iter().cloned().collect();
        (inputs, targets)
    }

    fn publish_weights(&self, weights: Weights) {
        let mut state = self.weights.lock();
        state.latest = Some(weights);
        state.fresh = true;
        state.version += 1;
    }

    fn weights(&self) -> Option<Weights> {
        self.weights.lock().latest.clone()
    }

    fn has_new_weights(&self) -> bool {
        self.weights.lock().fresh
    }

    fn clear_new_weights_flag(&self) {
        self.weights.lock().fresh = false;
    }

    fn take_new_weights(&self) -> Option<Weights> {
        let mut state = self.weights.lock();
        if !state.fresh {
            return None;
        }
        state.fresh = false;
        state.latest.clone()
    }

    fn weights_version(&self) -> u64 {
        self.weights.lock().version
    }

    fn drain_eval_triples(&self) -> EvalTriples {
        let mut eval = self.eval_lock.lock();
        (
            std::mem::take(&mut eval.inputs),
            std::mem::take(&mut eval.targets),
            std::mem::take(&mut eval.outputs),
        )
    }

    fn append_eval_outputs(&self, outputs: Vec<Sample>) {
        self.eval_lock.lock().outputs.extend(outputs);
    }

    fn set_stream_ended(&self) {
        self.stream_ended.store(true, Ordering::Release);
    }

    fn is_stream_ended(&self) -> bool {
        self.stream_ended.load(Ordering::Acquire)
    }

    fn set_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn set_output_size(&self, size: usize) {
        if self.output_size.set(size).is_err() {
            debug!(size, "Output size already fixed, ignoring");
        }
    }

    fn output_size(&self) -> Option<usize> {
        self.output_size.get().copied()
    }

    fn stats(&self) -> ContextStats {
        let (training_inputs, training_targets, pending_inputs, pending_targets) = {
            let data = self.data_lock.lock();
            (
                data.training_inputs.len(),
                data.training_targets.len(),
                data.pending_inputs.len(),
                data.pending_targets.len(),
            )
        };
        let (eval_inputs, eval_targets, eval_outputs) = {
            let eval = self.eval_lock.lock();
            (eval.inputs.len(), eval.targets.len(), eval.outputs.len())
        };

        ContextStats {
            training_inputs,
            training_targets,
            pending_inputs,
            pending_targets,
            eval_inputs,
            eval_targets,
            eval_outputs,
            weights_version: self.weights_version(),
        }
    }
}
