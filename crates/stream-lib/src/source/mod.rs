//! Stream sources
//!
//! A source is pulled repeatedly by the producer role until it signals
//! end-of-stream. Sources fail closed: a read error terminates the producer.

mod csv;
mod memory;
mod window;

pub use csv::{CsvConfig, CsvSource};
pub use memory::VecSource;
pub use window::{MovingWindowConfig, MovingWindowGenerator};

use crate::types::Instance;
use anyhow::Result;

/// Trait for stream source implementations
pub trait StreamSource: Send {
    /// Next event, or `None` once the stream has ended
    fn next(&mut self) -> Result<Option<Instance>>;
}

impl<S: StreamSource + ?Sized> StreamSource for Box<S> {
    fn next(&mut self) -> Result<Option<Instance>> {
        (**self).next()
    }
}
