//! Pipeline orchestration
//!
//! Creates the shared context, runs the four roles in parallel on tokio's
//! blocking pool, waits for all of them and keeps the final shapes, weights
//! and evaluator for the caller.

use crate::config::PipelineConfig;
use crate::context::{ContextStats, SharedStreamContext, StreamContext};
use crate::error::PipelineError;
use crate::evaluation::{EvaluationReport, Evaluator, PrequentialEvaluator};
use crate::model::{Model, ModelFactory, ModelOptions, ModelSpec};
use crate::observability::StructuredLogger;
use crate::roles::{
    EvaluatorOutcome, EvaluatorRole, Poller, PredictorOutcome, PredictorRole, ProducerOutcome,
    ProducerRole, Role, TrainerOutcome, TrainerRole,
};
use crate::source::StreamSource;
use crate::types::Weights;
use anyhow::{Context, Result};
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::error;

/// What a finished run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub ingested: u64,
    pub training_rounds: u64,
    pub predictions: u64,
    pub eval_drains: u64,
    pub input_shape: Option<Vec<usize>>,
    pub output_size: Option<usize>,
    pub weights_version: u64,
    /// The stream ended before any model was trained
    pub ended_without_model: bool,
    pub elapsed_ms: u64,
    pub stats: ContextStats,
    pub report: Option<EvaluationReport>,
}

enum RoleOutput {
    Producer(ProducerOutcome),
    Trainer(TrainerOutcome),
    Predictor(PredictorOutcome),
    Evaluator(EvaluatorOutcome),
}

/// One streaming run, built by [`PipelineBuilder`]
pub struct Pipeline {
    config: PipelineConfig,
    run_id: String,
    source: Option<Box<dyn StreamSource>>,
    factory: Arc<dyn ModelFactory>,
    options: ModelOptions,
    evaluator: Option<Box<dyn Evaluator>>,
    logger: StructuredLogger,
    /// Context of the last run, kept for the post-run accessors
    context: Option<Arc<SharedStreamContext>>,
    input_shape: Option<Vec<usize>>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run the pipeline until the predictor finishes it
    ///
    /// A pipeline runs once; the source is consumed by the first call.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let source = self
            .source
            .take()
            .ok_or_else(|| anyhow::anyhow!("Pipeline {} has already run", self.run_id))?;
        let evaluator = self
            .evaluator
            .take()
            .ok_or_else(|| anyhow::anyhow!("Pipeline {} has no evaluator", self.run_id))?;

        let start = Instant::now();
        let context = Arc::new(SharedStreamContext::from_config(&self.config));
        self.context = Some(context.clone());
        self.logger.log_pipeline_started(
            self.config.batch_size,
            self.config.num_batches_fed,
            self.config.poll_interval_ms,
        );

        let ctx: Arc<dyn StreamContext> = context.clone();
        let poller = Poller::new(self.config.poll_interval());
        let halt = self.config.halt_on_worker_error;

        let producer = ProducerRole::new(ctx.clone(), source)
            .with_stream_period(self.config.stream_period());
        let trainer = TrainerRole::new(
            ctx.clone(),
            self.factory.clone(),
            self.options.clone(),
            self.config.batch_size,
            poller,
            self.logger.clone(),
        );
        let predictor = PredictorRole::new(
            ctx.clone(),
            self.factory.clone(),
            self.options.clone(),
            poller,
            self.logger.clone(),
        );
        let evaluator = EvaluatorRole::new(ctx.clone(), evaluator, poller, self.logger.clone());

        let mut workers = JoinSet::new();
        {
            let (ctx, logger) = (ctx.clone(), self.logger.clone());
            workers.spawn_blocking(move || {
                supervise(Role::Producer, &ctx, halt, &logger, || {
                    producer.run().map(RoleOutput::Producer)
                })
            });
        }
        {
            let (ctx, logger) = (ctx.clone(), self.logger.clone());
            workers.spawn_blocking(move || {
                supervise(Role::Trainer, &ctx, halt, &logger, || {
                    trainer.run().map(RoleOutput::Trainer)
                })
            });
        }
        {
            let (ctx, logger) = (ctx.clone(), self.logger.clone());
            workers.spawn_blocking(move || {
                supervise(Role::Predictor, &ctx, halt, &logger, || {
                    predictor.run().map(RoleOutput::Predictor)
                })
            });
        }
        {
            let (ctx, logger) = (ctx.clone(), self.logger.clone());
            workers.spawn_blocking(move || {
                supervise(Role::Evaluator, &ctx, halt, &logger, || {
                    evaluator.run().map(RoleOutput::Evaluator)
                })
            });
        }

        let mut first_error: Option<PipelineError> = None;
        let mut producer = ProducerOutcome::default();
        let mut trainer = TrainerOutcome::default();
        let mut predictor = PredictorOutcome::default();
        let mut eval_drains = 0;

        while let Some(joined) = workers.join_next().await {
            let (role, result) = joined.context("Pipeline worker was cancelled")?;
            match result {
                Ok(RoleOutput::Producer(outcome)) => producer = outcome,
                Ok(RoleOutput::Trainer(outcome)) => trainer = outcome,
                Ok(RoleOutput::Predictor(outcome)) => predictor = outcome,
                Ok(RoleOutput::Evaluator(outcome)) => {
                    eval_drains = outcome.drains;
                    self.evaluator = Some(outcome.evaluator);
                }
                Err(message) => {
                    if first_error.is_none() {
                        first_error = Some(PipelineError::WorkerFailed {
                            role: role.name(),
                            message,
                        });
                    }
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err.into());
        }

        self.input_shape = trainer.input_shape.clone();
        let elapsed_ms = start.elapsed().as_millis();
        let summary = RunSummary {
            run_id: self.run_id.clone(),
            ingested: producer.ingested,
            training_rounds: trainer.rounds,
            predictions: predictor.predictions,
            eval_drains,
            input_shape: trainer.input_shape,
            output_size: context.output_size(),
            weights_version: context.weights_version(),
            ended_without_model: predictor.ended_without_model,
            elapsed_ms: elapsed_ms as u64,
            stats: context.stats(),
            report: self.evaluator.as_ref().and_then(|e| e.report()),
        };

        self.logger
            .log_pipeline_finished(summary.output_size, summary.weights_version, elapsed_ms);
        Ok(summary)
    }

    /// Target dimension bound by the trainer, `None` before a model existed
    pub fn output_size(&self) -> Option<usize> {
        self.context.as_ref().and_then(|ctx| ctx.output_size())
    }

    /// Last weights published by the trainer
    pub fn weights(&self) -> Option<Weights> {
        self.context.as_ref().and_then(|ctx| ctx.weights())
    }

    /// Build a model from the factory and load the final weights into it
    pub fn materialize_model(&self) -> Result<Box<dyn Model>> {
        let weights = self.weights().ok_or(PipelineError::WeightsUnavailable)?;
        let (Some(input_shape), Some(output_size)) = (self.input_shape.clone(), self.output_size())
        else {
            return Err(PipelineError::WeightsUnavailable.into());
        };

        let spec = ModelSpec::new(&self.options, input_shape, output_size);
        let mut model = self
            .factory
            .create(&spec)
            .context("Failed to create model from final shapes")?;
        model
            .set_weights(&weights)
            .context("Failed to load final weights")?;
        Ok(model)
    }

    /// The evaluator handed back by the evaluator role after a successful run
    pub fn evaluator(&self) -> Option<&dyn Evaluator> {
        self.evaluator.as_deref()
    }

    pub fn context(&self) -> Option<&Arc<SharedStreamContext>> {
        self.context.as_ref()
    }
}

/// Run one role to completion, turning errors and panics into a message
///
/// With `halt` set, a failing role finishes the run so its siblings exit
/// at their next poll.
fn supervise<F>(
    role: Role,
    ctx: &Arc<dyn StreamContext>,
    halt: bool,
    logger: &StructuredLogger,
    body: F,
) -> (Role, Result<RoleOutput, String>)
where
    F: FnOnce() -> Result<RoleOutput>,
{
    let result = match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(err)) => Err(format!("{:#}", err)),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    };

    if let Err(message) = &result {
        logger.log_role_failed(role.name(), message);
        if halt {
            error!(role = %role, "Halting pipeline after worker failure");
            ctx.set_finished();
        }
    }

    (role, result)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Builder for a [`Pipeline`]
pub struct PipelineBuilder {
    config: PipelineConfig,
    run_id: Option<String>,
    source: Option<Box<dyn StreamSource>>,
    factory: Option<Arc<dyn ModelFactory>>,
    options: ModelOptions,
    evaluator: Option<Box<dyn Evaluator>>,
}

impl PipelineBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            run_id: None,
            source: None,
            factory: None,
            options: ModelOptions::default(),
            evaluator: None,
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn num_batches_fed(mut self, num_batches_fed: usize) -> Self {
        self.config.num_batches_fed = num_batches_fed;
        self
    }

    /// Identifier attached to every lifecycle event
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn source(mut self, source: impl StreamSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn model_factory(mut self, factory: Arc<dyn ModelFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Loss, optimizer and free-form parameters passed to the factory
    pub fn model_spec(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }

    /// Evaluator scoring the predictions; prequential MAE if unset
    pub fn evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Some(Box::new(evaluator));
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        self.config.validate()?;

        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Stream source is required"))?;
        let factory = self
            .factory
            .ok_or_else(|| anyhow::anyhow!("Model factory is required"))?;
        let run_id = self.run_id.unwrap_or_else(default_run_id);

        Ok(Pipeline {
            config: self.config,
            logger: StructuredLogger::new(run_id.clone()),
            run_id,
            source: Some(source),
            factory,
            options: self.options,
            evaluator: Some(
                self.evaluator
                    .unwrap_or_else(|| Box::new(PrequentialEvaluator::default())),
            ),
            context: None,
            input_shape: None,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_run_id() -> String {
    format!("run-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{ChunkEvaluator, Metric};
    use crate::model::LinearFactory;
    use crate::source::VecSource;
    use crate::types::{Instance, Sample};

    fn pairs(n: usize) -> VecSource {
        VecSource::from_pairs((0..n).map(|i| {
            let x = (i % 10) as f32 / 10.0;
            (vec![x, 1.0 - x], vec![x + 0.5])
        }))
    }

    fn builder(source: VecSource) -> PipelineBuilder {
        let mut config = PipelineConfig::new(4, 2);
        config.poll_interval_ms = 1;
        Pipeline::builder()
            .config(config)
            .run_id("orchestrator-test")
            .source(source)
            .model_factory(Arc::new(LinearFactory))
    }

    #[test]
    fn test_builder_requires_source_and_factory() {
        let err = Pipeline::builder()
            .model_factory(Arc::new(LinearFactory))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("Stream source is required"));

        let err = Pipeline::builder().source(pairs(1)).build().err().unwrap();
        assert!(err.to_string().contains("Model factory is required"));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let err = builder(pairs(1)).batch_size(0).build().err().unwrap();
        assert!(err.to_string().contains("batch_size"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pipeline_run_summary() {
        let mut pipeline = builder(pairs(60))
            .evaluator(ChunkEvaluator::new(Metric::Mae, 10))
            .build()
            .unwrap();
        assert!(pipeline.output_size().is_none());

        let summary = pipeline.run().await.unwrap();
        assert_eq!(summary.run_id, "orchestrator-test");
        assert_eq!(summary.ingested, 60);
        assert_eq!(summary.predictions, 56);
        assert!(summary.training_rounds >= 1);
        assert_eq!(summary.output_size, Some(1));
        assert_eq!(summary.input_shape, Some(vec![2]));
        assert!(!summary.ended_without_model);
        assert_eq!(summary.stats.pending_inputs, 0);

        let report = summary.report.unwrap();
        assert_eq!(report.evaluator, "chunk");
        assert_eq!(report.instances, 56);

        assert_eq!(pipeline.output_size(), Some(1));
        assert!(pipeline.weights().is_some());
        assert_eq!(pipeline.evaluator().unwrap().report().unwrap().instances, 56);

        let mut model = pipeline.materialize_model().unwrap();
        let out = model.predict(&[vec![0.2, 0.8]]).unwrap();
        assert_eq!(out[0].len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pipeline_runs_once() {
        let mut pipeline = builder(pairs(10)).build().unwrap();
        pipeline.run().await.unwrap();
        let err = pipeline.run().await.unwrap_err();
        assert!(err.to_string().contains("already run"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_stream_leaves_no_model() {
        let mut pipeline = builder(VecSource::default()).build().unwrap();
        let summary = pipeline.run().await.unwrap();

        assert!(summary.ended_without_model);
        assert_eq!(summary.training_rounds, 0);
        assert_eq!(summary.output_size, None);
        assert!(pipeline.weights().is_none());
        let err = pipeline.materialize_model().err().unwrap();
        assert!(err.to_string().contains("no weights"));
    }

    struct PanickingEvaluator;

    impl Evaluator for PanickingEvaluator {
        fn score(&mut self, _x: Vec<Sample>, _y: Vec<Sample>, _o: Vec<Sample>) -> Result<()> {
            panic!("scoring exploded");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_panic_halts_pipeline() {
        let mut pipeline = builder(pairs(40))
            .evaluator(PanickingEvaluator)
            .build()
            .unwrap();

        let err = pipeline.run().await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("evaluator worker failed"), "{}", message);
        assert!(message.contains("scoring exploded"), "{}", message);
        assert!(pipeline.context().unwrap().is_finished());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_model_error_halts_pipeline() {
        // Inputs after the first batch are wider than the bound model
        let events = (0..20).map(|i| {
            let x = if i < 4 { vec![1.0] } else { vec![1.0, 2.0] };
            Instance::new(x, vec![i as f32])
        });
        let mut pipeline = builder(VecSource::new(events)).build().unwrap();

        let err = pipeline.run().await.unwrap_err();
        assert!(err.to_string().contains("shape mismatch"), "{}", err);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
