//! Streaming online-learning pipeline
//!
//! This crate provides the core functionality for:
//! - A shared stream context coordinating four independent workers
//! - Producer, trainer, predictor and evaluator roles
//! - Pipeline orchestration over tokio's blocking pool
//! - Stream sources, a reference model and prequential evaluation

pub mod config;
pub mod context;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod observability;
pub mod orchestrator;
pub mod roles;
pub mod source;
pub mod types;

pub use config::PipelineConfig;
pub use context::{ContextStats, SharedStreamContext, StreamContext};
pub use error::{PipelineError, PipelineResult};
pub use observability::{PipelineMetrics, StructuredLogger};
pub use orchestrator::{Pipeline, PipelineBuilder, RunSummary};
pub use types::*;
