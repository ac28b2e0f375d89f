//! Positional matching of eval inputs, targets and outputs
//!
//! The three eval sequences are filled by different roles at different
//! times: a drain may carry inputs whose outputs arrive in a later drain,
//! and labels may lag behind both. The aligner keeps each sequence
//! separately and releases a triple only once all three halves exist.

use crate::types::Sample;
use std::collections::VecDeque;

/// One matched `(input, target, output)` triple
pub type Triple = (Sample, Sample, Sample);

#[derive(Debug, Default)]
pub struct Aligner {
    inputs: VecDeque<Sample>,
    targets: VecDeque<Sample>,
    outputs: VecDeque<Sample>,
}

impl Aligner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, x: Vec<Sample>, y: Vec<Sample>, o: Vec<Sample>) {
        self.inputs.extend(x);
        self.targets.extend(y);
        self.outputs.extend(o);
    }

    /// Remove and return every complete triple, oldest first
    pub fn drain_ready(&mut self) -> Vec<Triple> {
        let ready = self
            .inputs
            .len()
            .min(self.targets.len())
            .min(self.outputs.len());

        self.inputs
            .drain(..ready)
            .zip(self.targets.drain(..ready))
            .zip(self.outputs.drain(..ready))
            .map(|((x, y), o)| (x, y, o))
            .collect()
    }

    /// Unmatched `(inputs, targets, outputs)` counts
    pub fn backlog(&self) -> (usize, usize, usize) {
        (self.inputs.len(), self.targets.len(), self.outputs.len())
    }
}
