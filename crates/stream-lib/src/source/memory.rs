use super::StreamSource;
use crate::types::{Instance, Sample};
use anyhow::Result;
use std::collections::VecDeque;

/// Source replaying a fixed list of events
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    events: VecDeque<Instance>,
}

impl VecSource {
    pub fn new(events: impl IntoIterator<Item = Instance>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }

    /// Build a fully labeled source from parallel input and target lists
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Sample, Sample)>) -> Self {
        Self::new(pairs.into_iter().map(|(x, y)| Instance::new(x, y)))
    }
}

impl StreamSource for VecSource {
    fn next(&mut self) -> Result<Option<Instance>> {
        Ok(self.events.pop_front())
    }
}
