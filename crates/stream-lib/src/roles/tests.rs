//! Role interplay tests
//!
//! Every test runs the roles on plain threads against a real shared
//! context, the same way the orchestrator does.

use super::*;
use crate::context::{SharedStreamContext, StreamContext};
use crate::error::PipelineError;
use crate::evaluation::{Metric, PrequentialEvaluator};
use crate::model::{LinearFactory, Model, ModelFactory, ModelOptions, ModelSpec};
use crate::observability::StructuredLogger;
use crate::source::{StreamSource, VecSource};
use crate::types::{Instance, Matrix, Sample, Weights};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn context(batch_size: usize, num_batches_fed: usize) -> Arc<dyn StreamContext> {
    Arc::new(SharedStreamContext::new(batch_size, num_batches_fed).unwrap())
}

fn logger() -> StructuredLogger {
    StructuredLogger::new("roles-test")
}

fn linear_pairs(n: usize) -> VecSource {
    VecSource::from_pairs((0..n).map(|i| {
        let x = i as f32 / n as f32;
        (vec![x], vec![3.0 * x - 1.0])
    }))
}

fn poller() -> Poller {
    Poller::new(Duration::from_micros(50))
}

struct Outcomes {
    producer: ProducerOutcome,
    trainer: TrainerOutcome,
    predictor: PredictorOutcome,
    evaluator: EvaluatorOutcome,
}

fn run_roles(
    ctx: Arc<dyn StreamContext>,
    source: Box<dyn StreamSource>,
    factory: Arc<dyn ModelFactory>,
    batch_size: usize,
) -> Outcomes {
    let producer = ProducerRole::new(ctx.clone(), source);
    let trainer = TrainerRole::new(
        ctx.clone(),
        factory.clone(),
        ModelOptions::default(),
        batch_size,
        poller(),
        logger(),
    );
    let predictor = PredictorRole::new(
        ctx.clone(),
        factory,
        ModelOptions::default(),
        poller(),
        logger(),
    );
    let evaluator = EvaluatorRole::new(
        ctx,
        Box::new(PrequentialEvaluator::new(Metric::Mae, 8)),
        poller(),
        logger(),
    );

    let evaluator = thread::spawn(move || evaluator.run());
    let predictor = thread::spawn(move || predictor.run());
    let trainer = thread::spawn(move || trainer.run());
    let producer = thread::spawn(move || producer.run());

    Outcomes {
        producer: producer.join().unwrap().unwrap(),
        trainer: trainer.join().unwrap().unwrap(),
        predictor: predictor.join().unwrap().unwrap(),
        evaluator: evaluator.join().unwrap().unwrap(),
    }
}

#[test]
fn test_roles_run_to_completion() {
    let ctx = context(2, 2);
    let outcomes = run_roles(
        ctx.clone(),
        Box::new(linear_pairs(40)),
        Arc::new(LinearFactory),
        2,
    );

    assert!(ctx.is_finished());
    assert!(ctx.is_stream_ended());
    assert_eq!(ctx.output_size(), Some(1));
    assert!(ctx.weights().is_some());

    assert_eq!(outcomes.producer.ingested, 40);
    assert!(!outcomes.producer.interrupted);
    assert!(outcomes.trainer.rounds >= 1);
    assert_eq!(outcomes.trainer.output_size, Some(1));

    // The first batch fills the training window; everything after is predicted once
    assert_eq!(outcomes.predictor.predictions, 38);
    assert!(!outcomes.predictor.ended_without_model);
    assert!(outcomes.predictor.weight_loads >= 1);

    assert_eq!(outcomes.evaluator.inputs, 38);
    assert_eq!(outcomes.evaluator.targets, 38);
    assert_eq!(outcomes.evaluator.outputs, 38);

    let report = outcomes.evaluator.evaluator.report().unwrap();
    assert_eq!(report.instances, 38);
    assert_eq!(report.unmatched, (0, 0, 0));
    assert!(report.overall.is_some());
}

#[test]
fn test_empty_stream_finishes_without_training() {
    let ctx = context(2, 1);
    let outcomes = run_roles(
        ctx.clone(),
        Box::new(VecSource::default()),
        Arc::new(LinearFactory),
        2,
    );

    assert!(ctx.is_finished());
    assert_eq!(outcomes.producer.ingested, 0);
    assert_eq!(outcomes.trainer.rounds, 0);
    assert_eq!(outcomes.trainer.output_size, None);
    assert!(outcomes.predictor.ended_without_model);
    assert_eq!(outcomes.predictor.predictions, 0);
    assert_eq!(outcomes.evaluator.drains, 0);
    assert!(ctx.weights().is_none());
    assert_eq!(ctx.output_size(), None);
}

#[test]
fn test_stream_shorter_than_first_batch_trains_nothing() {
    let ctx = context(4, 1);
    let outcomes = run_roles(
        ctx.clone(),
        Box::new(linear_pairs(3)),
        Arc::new(LinearFactory),
        4,
    );

    assert_eq!(outcomes.producer.ingested, 3);
    assert_eq!(outcomes.trainer.rounds, 0);
    assert!(outcomes.predictor.ended_without_model);
    assert_eq!(ctx.stats().training_inputs, 3);
}

#[test]
fn test_lagging_labels_are_scored_once_they_arrive() {
    // Inputs arrive first, their labels one event later
    let mut events = vec![Instance::unlabeled(vec![0.0])];
    for i in 1..30 {
        events.push(Instance {
            x: Some(vec![i as f32]),
            y: Some(vec![(i - 1) as f32]),
        });
    }
    events.push(Instance::label(vec![29.0]));

    let ctx = context(2, 4);
    let outcomes = run_roles(
        ctx.clone(),
        Box::new(VecSource::new(events)),
        Arc::new(LinearFactory),
        2,
    );

    assert_eq!(outcomes.producer.ingested, 31);
    assert_eq!(outcomes.evaluator.inputs, 28);
    assert_eq!(outcomes.evaluator.targets, 28);
    let report = outcomes.evaluator.evaluator.report().unwrap();
    assert_eq!(report.instances, 28);
}

#[test]
fn test_producer_stops_when_run_is_finished() {
    let ctx = context(2, 1);
    ctx.set_finished();

    let outcome = ProducerRole::new(ctx.clone(), Box::new(linear_pairs(10)))
        .run()
        .unwrap();
    assert_eq!(outcome.ingested, 0);
    assert!(outcome.interrupted);
    assert!(ctx.is_stream_ended());
}

struct FailingSource {
    remaining: usize,
}

impl StreamSource for FailingSource {
    fn next(&mut self) -> anyhow::Result<Option<Instance>> {
        if self.remaining == 0 {
            anyhow::bail!("connection reset");
        }
        self.remaining -= 1;
        Ok(Some(Instance::new(vec![1.0], vec![1.0])))
    }
}

#[test]
fn test_producer_fails_closed_on_source_error() {
    let ctx = context(2, 1);
    let err = ProducerRole::new(ctx.clone(), Box::new(FailingSource { remaining: 3 }))
        .run()
        .unwrap_err();

    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::Source(message)) => {
            assert_eq!(message, "failed after 3 events: connection reset")
        }
        other => panic!("expected a source error, got {:?}", other),
    }
    assert!(!ctx.is_stream_ended());
    assert_eq!(ctx.stats().training_inputs, 2);
}

#[test]
fn test_trainer_fit_error_terminates_trainer() {
    struct RejectingFactory;

    impl ModelFactory for RejectingFactory {
        fn create(&self, spec: &ModelSpec) -> anyhow::Result<Box<dyn Model>> {
            anyhow::bail!("no model for input shape {:?}", spec.input_shape)
        }
    }

    let ctx = context(2, 1);
    ctx.add(Some(vec![1.0, 2.0]), Some(vec![1.0]));
    ctx.add(Some(vec![3.0, 4.0]), Some(vec![2.0]));

    let trainer = TrainerRole::new(
        ctx.clone(),
        Arc::new(RejectingFactory),
        ModelOptions::default(),
        2,
        Poller::spinning(),
        logger(),
    );
    let err = trainer.run().unwrap_err();
    assert!(format!("{:#}", err).contains("no model for input shape"));
    assert_eq!(ctx.output_size(), Some(1));
    assert_eq!(ctx.weights_version(), 0);
}

#[test]
fn test_trainer_exits_on_finished_without_data() {
    let ctx = context(2, 1);
    let trainer = TrainerRole::new(
        ctx.clone(),
        Arc::new(LinearFactory),
        ModelOptions::default(),
        2,
        poller(),
        logger(),
    );
    let handle = thread::spawn(move || trainer.run());

    thread::sleep(Duration::from_millis(5));
    ctx.set_finished();
    let outcome = handle.join().unwrap().unwrap();
    assert_eq!(outcome.rounds, 0);
}

#[test]
fn test_predictor_halts_when_finished_externally() {
    let ctx = context(2, 1);
    let predictor = PredictorRole::new(
        ctx.clone(),
        Arc::new(LinearFactory),
        ModelOptions::default(),
        poller(),
        logger(),
    );
    let handle = thread::spawn(move || predictor.run());

    thread::sleep(Duration::from_millis(5));
    ctx.set_finished();
    let outcome = handle.join().unwrap().unwrap();
    assert!(!outcome.ended_without_model);
    assert_eq!(outcome.predictions, 0);
}

#[test]
fn test_evaluator_drains_remaining_triples_after_finish() {
    let ctx = context(1, 1);
    ctx.add(Some(vec![0.0]), Some(vec![0.0]));
    ctx.add(Some(vec![1.0]), Some(vec![2.0]));
    let drained: Vec<Sample> = ctx.drain_pending();
    assert_eq!(drained.len(), 1);
    ctx.append_eval_outputs(vec![vec![1.5]]);
    ctx.set_finished();

    let outcome = EvaluatorRole::new(
        ctx.clone(),
        Box::new(PrequentialEvaluator::new(Metric::Mae, 4)),
        Poller::spinning(),
        logger(),
    )
    .run()
    .unwrap();

    assert_eq!(outcome.drains, 1);
    let report = outcome.evaluator.report().unwrap();
    assert_eq!(report.instances, 1);
    assert_eq!(report.overall, Some(0.5));
}

#[derive(Debug, Clone, PartialEq)]
enum ModelCall {
    SetWeights(Vec<u8>),
    Predict(usize),
}

/// Model that logs its calls and publishes a newer snapshot during its first predict
struct RecordingModel {
    calls: Arc<Mutex<Vec<ModelCall>>>,
    ctx: Arc<dyn StreamContext>,
    predicts: usize,
}

impl Model for RecordingModel {
    fn fit(&mut self, _x: &[Sample], _y: &Matrix, _batch_size: usize, _epochs: usize) -> anyhow::Result<()> {
        Ok(())
    }

    fn predict(&mut self, x: &[Sample]) -> anyhow::Result<Vec<Sample>> {
        self.calls.lock().push(ModelCall::Predict(x.len()));
        self.predicts += 1;
        if self.predicts == 1 {
            self.ctx.add(Some(vec![3.0]), None);
            self.ctx.publish_weights(Weights::from(vec![3u8]));
        }
        Ok(x.iter().map(|_| vec![0.0]).collect())
    }

    fn get_weights(&self) -> anyhow::Result<Weights> {
        Ok(Weights::from(Vec::new()))
    }

    fn set_weights(&mut self, weights: &Weights) -> anyhow::Result<()> {
        self.calls
            .lock()
            .push(ModelCall::SetWeights(weights.as_bytes().to_vec()));
        Ok(())
    }
}

struct RecordingFactory {
    calls: Arc<Mutex<Vec<ModelCall>>>,
    ctx: Arc<dyn StreamContext>,
}

impl ModelFactory for RecordingFactory {
    fn create(&self, _spec: &ModelSpec) -> anyhow::Result<Box<dyn Model>> {
        Ok(Box::new(RecordingModel {
            calls: self.calls.clone(),
            ctx: self.ctx.clone(),
            predicts: 0,
        }))
    }
}

#[test]
fn test_predictor_loads_latest_weights_before_each_predict() {
    let ctx = context(1, 1);
    ctx.add(Some(vec![0.0]), Some(vec![0.0]));
    ctx.add(Some(vec![1.0]), Some(vec![1.0]));
    ctx.add(Some(vec![2.0]), Some(vec![2.0]));
    ctx.set_output_size(1);
    // Two publishes before the first take: only the second is ever loaded
    ctx.publish_weights(Weights::from(vec![1u8]));
    ctx.publish_weights(Weights::from(vec![2u8]));
    ctx.set_stream_ended();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let factory = RecordingFactory {
        calls: calls.clone(),
        ctx: ctx.clone(),
    };
    let outcome = PredictorRole::new(
        ctx.clone(),
        Arc::new(factory),
        ModelOptions::default(),
        Poller::spinning(),
        logger(),
    )
    .run()
    .unwrap();

    assert_eq!(
        *calls.lock(),
        vec![
            ModelCall::SetWeights(vec![2]),
            ModelCall::Predict(2),
            ModelCall::SetWeights(vec![3]),
            ModelCall::Predict(1),
        ]
    );
    assert_eq!(outcome.weight_loads, 2);
    assert_eq!(outcome.predictions, 3);
    assert_eq!(ctx.weights_version(), 3);
    assert!(ctx.is_finished());
}

#[test]
fn test_poller_waits_for_interval() {
    let start = std::time::Instant::now();
    Poller::new(Duration::from_millis(2)).wait();
    assert!(start.elapsed() >= Duration::from_millis(2));

    assert!(Poller::spinning().interval().is_zero());
    assert_eq!(Role::Predictor.to_string(), "predictor");
}
