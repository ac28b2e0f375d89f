//! Pipeline worker roles
//!
//! Each role owns a synchronous loop that runs on its own thread and talks
//! to its siblings only through the shared [`StreamContext`]:
//! - Producer: pulls instances from a [`StreamSource`](crate::source::StreamSource)
//! - Trainer: fits the model on the rolling training window
//! - Predictor: predicts pending inputs and decides when the run is over
//! - Evaluator: forwards eval triples to the pluggable evaluator

mod evaluator;
mod predictor;
mod producer;
mod trainer;

#[cfg(test)]
mod tests;

pub use evaluator::{EvaluatorOutcome, EvaluatorRole};
pub use predictor::{PredictorOutcome, PredictorRole};
pub use producer::{ProducerOutcome, ProducerRole};
pub use trainer::{TrainerOutcome, TrainerRole};

use std::fmt;
use std::time::Duration;

/// The four workers of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Producer,
    Trainer,
    Predictor,
    Evaluator,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Trainer => "trainer",
            Role::Predictor => "predictor",
            Role::Evaluator => "evaluator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Suspension point shared by every polling loop
///
/// A zero interval spins; anything else sleeps. Neither form waits on an
/// event, so a loop resumes as soon as its release condition holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Poller {
    interval: Duration,
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Poller that never sleeps
    pub fn spinning() -> Self {
        Self::default()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn wait(&self) {
        if self.interval.is_zero() {
            std::hint::spin_loop();
            std::thread::yield_now();
        } else {
            std::thread::sleep(self.interval);
        }
    }
}
