//! BDD-style behavioral tests for the engine actor.
//!
//! Drives engines through `EngineClient` only: dispatch, training
//! lifecycle, behaviour transitions, properties and hyperparameters.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use ractor::ActorId;
use tokio::sync::{mpsc, watch};

use flowmesh_core::{Done, Error, ErrorKind, Outcome, Payload, Result};
use flowmesh_dataflow::{Promise, Recipient};
use flowmesh_engine::{
    Behavior, Capability, DynamicHyperparameters, EngineArguments, EngineClient, EngineContext,
    EngineEvent, EngineRequest, Evaluatable, Evaluator, HyperparameterMap, Inform,
    OpenHyperparameters, QueryHandler, Queryable, Reply, Response, TRAINING_STOPPED, Trainable,
    Trainer, Updatable, UpdateMode, Updater, spawn_engine,
};

// ═══════════════════════════════════════════════════════════════════════════════
// FIXTURES
// ═══════════════════════════════════════════════════════════════════════════════

/// Doubles integers and counts how often it ran.
struct Doubler {
    hits: Arc<AtomicUsize>,
}

impl QueryHandler for Doubler {
    type Input = i64;
    type Output = i64;

    fn handle_query(&mut self, input: i64) -> Promise<i64> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Promise::resolved(input * 2)
    }
}

/// Echoes integers once the gate opens; counts queries it has started.
struct GatedLookup {
    gate: watch::Receiver<bool>,
    started: Arc<AtomicUsize>,
}

impl QueryHandler for GatedLookup {
    type Input = i64;
    type Output = i64;

    fn handle_query(&mut self, input: i64) -> Promise<i64> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.clone();
        Promise::from_future(async move {
            gate.wait_for(|open| *open)
                .await
                .map_err(|_| Error::Cancelled)?;
            Ok(input)
        })
    }
}

/// Trains until the gate opens, then yields `input * 10`.
struct GatedTrainer {
    gate: watch::Receiver<bool>,
    stoppable: bool,
    stop_fails: bool,
}

impl Trainer for GatedTrainer {
    type Input = i64;
    type Params = ();
    type Output = i64;

    fn train(&mut self, input: i64, _params: ()) -> Promise<i64> {
        let mut gate = self.gate.clone();
        Promise::from_future(async move {
            gate.wait_for(|open| *open)
                .await
                .map_err(|_| Error::Cancelled)?;
            Ok(input * 10)
        })
    }

    fn can_training_be_stopped(&self) -> bool {
        self.stoppable
    }

    fn stop_training(&mut self) -> Result<()> {
        if self.stop_fails {
            Err(Error::failed_execution("stop raised"))
        } else {
            Ok(())
        }
    }
}

fn trainer(stoppable: bool, stop_fails: bool) -> (GatedTrainer, watch::Sender<bool>) {
    let (gate, rx) = watch::channel(false);
    (
        GatedTrainer {
            gate: rx,
            stoppable,
            stop_fails,
        },
        gate,
    )
}

struct Negator;

impl Evaluator for Negator {
    type Input = f64;
    type Output = f64;

    fn evaluate(&mut self, input: f64) -> Promise<Outcome<f64>> {
        Promise::resolved(Outcome::Data(-input))
    }
}

struct BatchSink {
    applied: Arc<AtomicUsize>,
}

impl Updater for BatchSink {
    type Input = Vec<f64>;
    const MODE: UpdateMode = UpdateMode::Batch;

    fn update(&mut self, input: Vec<f64>) -> Promise<Done> {
        self.applied.fetch_add(input.len(), Ordering::SeqCst);
        Promise::resolved(Done)
    }
}

/// Reports whether its setup ran before the first request.
struct SetupRecorder {
    ready: bool,
    fail: bool,
}

impl Capability for SetupRecorder {
    fn name(&self) -> &str {
        "setup-recorder"
    }

    fn setup(&mut self) -> Result<()> {
        if self.fail {
            return Err(Error::failed_execution("model file missing"));
        }
        self.ready = true;
        Ok(())
    }

    fn accepts(&self, request: &EngineRequest) -> bool {
        matches!(request, EngineRequest::Query { .. })
    }

    fn handle(&mut self, _request: EngineRequest, _ctx: &mut EngineContext) -> Reply {
        Reply::Now(Response::Data(Payload::Bool(self.ready)))
    }
}

fn inform_sink(id: u64) -> (Recipient<Inform>, mpsc::UnboundedReceiver<Inform>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let recipient = Recipient::from_fn(ActorId::Local(id), move |inform| {
        tx.send(inform).map_err(|_| Error::actor_unavailable(id))
    });
    (recipient, rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Inform>) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("inform should arrive")
        .expect("engine should still be sending")
        .event
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn setup_engine(args: EngineArguments) -> EngineClient {
    init_tracing();
    let engine = spawn_engine(None, args).await.expect("engine should start");
    EngineClient::new(engine).with_timeout(Duration::from_secs(2))
}

async fn wait_for_property(client: &EngineClient, name: &str, expected: Payload) {
    for _ in 0..100 {
        if client.property(name).await.unwrap() == Some(expected.clone()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("property {name} never became {expected:?}");
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISPATCH
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn given_mismatched_query_when_sent_then_one_unexpected_content_and_no_mutation() {
    // Given: a queryable engine that counts handled queries
    let hits = Arc::new(AtomicUsize::new(0));
    let client = setup_engine(EngineArguments::new(
        Behavior::new("serving").with(Queryable::new(Doubler {
            hits: Arc::clone(&hits),
        })),
    ))
    .await;

    // When: the payload is text instead of an integer
    let fault = client
        .query(Payload::Text("twenty-one".into()))
        .await
        .unwrap_err();

    // Then: the caller gets UNEXPECTEDCONTENT and the handler never ran
    assert_eq!(fault.kind, ErrorKind::UnexpectedContent);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // And: a well-typed query still works
    assert_eq!(client.query(Payload::Integer(21)).await, Ok(Payload::Integer(42)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn given_slow_query_when_in_flight_then_engine_keeps_serving() {
    // Given: a query held at the gate
    let (gate, rx) = watch::channel(false);
    let started = Arc::new(AtomicUsize::new(0));
    let client = setup_engine(EngineArguments::new(
        Behavior::new("serving").with(Queryable::new(GatedLookup {
            gate: rx,
            started: Arc::clone(&started),
        })),
    ))
    .await;
    let pending = client.query(Payload::Integer(5));
    let answer = tokio::spawn(async move { pending.await });
    for _ in 0..100 {
        if started.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(started.load(Ordering::SeqCst), 1);

    // When: other requests arrive meanwhile
    let queryable = client.property("canBeQueried").await.unwrap();

    // Then: they are answered before the query settles
    assert_eq!(queryable, Some(Payload::Bool(true)));
    assert!(!answer.is_finished());

    gate.send_replace(true);
    assert_eq!(answer.await.unwrap(), Ok(Payload::Integer(5)));
}

#[tokio::test]
async fn given_no_accepting_component_when_request_sent_then_refused() {
    let client = setup_engine(EngineArguments::new(
        Behavior::new("serving").with(Queryable::new(Doubler {
            hits: Arc::new(AtomicUsize::new(0)),
        })),
    ))
    .await;

    let fault = client.stop_training(false).await.unwrap_err();
    assert_eq!(fault.kind, ErrorKind::RefusedRequest);
}

#[tokio::test]
async fn given_evaluator_and_batch_updater_when_used_then_outcomes_are_routed() {
    let applied = Arc::new(AtomicUsize::new(0));
    let client = setup_engine(EngineArguments::new(
        Behavior::new("mixed")
            .with(Evaluatable::new(Negator))
            .with(Updatable::new(BatchSink {
                applied: Arc::clone(&applied),
            })),
    ))
    .await;

    assert_eq!(
        client.evaluate(Payload::Float(1.5)).await,
        Ok(Outcome::Data(Payload::Float(-1.5)))
    );

    assert_eq!(
        client
            .update(UpdateMode::Batch, Payload::Vector(vec![1.0, 2.0, 3.0]))
            .await,
        Ok(Done)
    );
    assert_eq!(applied.load(Ordering::SeqCst), 3);

    // Instance updates have no component
    let fault = client
        .update(UpdateMode::Instance, Payload::Vector(vec![1.0]))
        .await
        .unwrap_err();
    assert_eq!(fault.kind, ErrorKind::RefusedRequest);
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRAINING LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn given_idle_engine_when_stop_training_then_done() {
    let (trainer, _gate) = trainer(false, true);
    let client = setup_engine(EngineArguments::new(
        Behavior::new("training").with(Trainable::new(trainer)),
    ))
    .await;

    assert_eq!(client.stop_training(false).await, Ok(Done));
}

#[tokio::test]
async fn given_busy_unstoppable_engine_when_stop_then_refused_and_still_training() {
    // Given: a run that cannot be interrupted
    let (trainer, gate) = trainer(false, false);
    let client = setup_engine(EngineArguments::new(
        Behavior::new("training").with(Trainable::new(trainer)),
    ))
    .await;
    let pending = client
        .start_training(Payload::Integer(4), Payload::Unit)
        .compel();
    wait_for_property(&client, "isTraining", Payload::Bool(true)).await;

    // When: a normal stop arrives
    let fault = client.stop_training(false).await.unwrap_err();

    // Then: it is refused and nothing changed
    assert_eq!(fault.kind, ErrorKind::RefusedRequest);
    assert_eq!(
        client.property("isTraining").await.unwrap(),
        Some(Payload::Bool(true))
    );

    // And: the run still completes normally
    gate.send_replace(true);
    assert_eq!(pending.await.unwrap(), Ok(Payload::Integer(40)));
    assert_eq!(
        client.property("isTraining").await.unwrap(),
        Some(Payload::Bool(false))
    );
}

#[tokio::test]
async fn given_busy_engine_when_forced_stop_raises_then_done_and_start_gets_training_error() {
    // Given: a run whose stop hook fails
    let (trainer, _gate) = trainer(false, true);
    let (controller, mut informs) = inform_sink(10_001);
    let client = setup_engine(
        EngineArguments::new(Behavior::new("training").with(Trainable::new(trainer)))
            .with_controller(controller),
    )
    .await;
    assert_eq!(next_event(&mut informs).await, EngineEvent::Ready);

    let pending = client
        .start_training(Payload::Integer(1), Payload::Unit)
        .compel();
    assert_eq!(next_event(&mut informs).await, EngineEvent::TrainingStarted);

    // When: a forced stop arrives
    let stopped = client.stop_training(true).await;

    // Then: the stop succeeds despite the failure
    assert_eq!(stopped, Ok(Done));
    assert_eq!(
        next_event(&mut informs).await,
        EngineEvent::TrainingStopped { forced: true }
    );

    // And: the pending start is answered with a training error
    let fault = pending.await.unwrap().unwrap_err();
    assert_eq!(fault.kind, ErrorKind::FailedExecution);
    assert_eq!(fault.message, TRAINING_STOPPED);
    assert_eq!(
        client.property("isTraining").await.unwrap(),
        Some(Payload::Bool(false))
    );
}

#[tokio::test]
async fn given_open_gate_when_training_started_then_training_done_and_informs_sent() {
    let (trainer, gate) = trainer(true, false);
    gate.send_replace(true);
    let (controller, mut informs) = inform_sink(10_002);
    let client = setup_engine(
        EngineArguments::new(Behavior::new("training").with(Trainable::new(trainer)))
            .with_controller(controller),
    )
    .await;

    let result = client
        .start_training(Payload::Integer(7), Payload::Unit)
        .await;

    assert_eq!(result, Ok(Payload::Integer(70)));
    assert_eq!(next_event(&mut informs).await, EngineEvent::Ready);
    assert_eq!(next_event(&mut informs).await, EngineEvent::TrainingStarted);
    assert_eq!(
        next_event(&mut informs).await,
        EngineEvent::TrainingFinished { succeeded: true }
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// BEHAVIOUR TRANSITIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn given_two_controllers_when_behavior_changes_then_both_stay_subscribed() {
    // Given: an engine with two subscribed controllers
    let (first, mut first_informs) = inform_sink(10_003);
    let (second, mut second_informs) = inform_sink(10_004);
    let client = setup_engine(
        EngineArguments::new(Behavior::new("serving").with(Queryable::new(Doubler {
            hits: Arc::new(AtomicUsize::new(0)),
        })))
        .with_controller(first)
        .with_controller(second),
    )
    .await;
    assert_eq!(next_event(&mut first_informs).await, EngineEvent::Ready);
    assert_eq!(next_event(&mut second_informs).await, EngineEvent::Ready);

    // When: the engine switches to a training behaviour
    let (trainer, _gate) = trainer(true, false);
    let changed = client
        .change_behavior(Behavior::new("training").with(Trainable::new(trainer)))
        .await;

    // Then: both controllers remain and both are told
    assert_eq!(changed, Ok(Done));
    let mut controllers = client.controllers().await.unwrap();
    controllers.sort_by_key(ToString::to_string);
    assert_eq!(controllers, vec![ActorId::Local(10_003), ActorId::Local(10_004)]);
    let expected = EngineEvent::BehaviorChanged {
        name: "training".to_string(),
    };
    assert_eq!(next_event(&mut first_informs).await, expected);
    assert_eq!(next_event(&mut second_informs).await, expected);

    // And: the new components answer, the old ones are gone
    assert_eq!(client.stop_training(false).await, Ok(Done));
    let fault = client.query(Payload::Integer(1)).await.unwrap_err();
    assert_eq!(fault.kind, ErrorKind::RefusedRequest);
    assert_eq!(
        client.property("behavior").await.unwrap(),
        Some(Payload::Text("training".to_string()))
    );
}

#[tokio::test]
async fn given_failing_setup_when_behavior_changes_then_current_behavior_is_kept() {
    let client = setup_engine(EngineArguments::new(
        Behavior::new("recording").with(SetupRecorder {
            ready: false,
            fail: false,
        }),
    ))
    .await;

    let fault = client
        .change_behavior(Behavior::new("broken").with(SetupRecorder {
            ready: false,
            fail: true,
        }))
        .await
        .unwrap_err();

    assert_eq!(fault.kind, ErrorKind::FailedExecution);
    assert_eq!(
        client.property("behavior").await.unwrap(),
        Some(Payload::Text("recording".to_string()))
    );
}

#[tokio::test]
async fn given_training_in_flight_when_behavior_changes_then_start_is_answered() {
    let (trainer, _gate) = trainer(true, false);
    let client = setup_engine(EngineArguments::new(
        Behavior::new("training").with(Trainable::new(trainer)),
    ))
    .await;
    let pending = client
        .start_training(Payload::Integer(1), Payload::Unit)
        .compel();
    wait_for_property(&client, "isTraining", Payload::Bool(true)).await;

    client
        .change_behavior(Behavior::new("idle"))
        .await
        .unwrap();

    let fault = pending.await.unwrap().unwrap_err();
    assert_eq!(fault.kind, ErrorKind::FailedExecution);
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIFECYCLE AND PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn given_component_with_setup_when_first_request_arrives_then_setup_already_ran() {
    let client = setup_engine(EngineArguments::new(
        Behavior::new("recording").with(SetupRecorder {
            ready: false,
            fail: false,
        }),
    ))
    .await;

    assert_eq!(client.query(Payload::Unit).await, Ok(Payload::Bool(true)));
}

#[tokio::test]
async fn given_failing_setup_when_spawned_then_engine_does_not_start() {
    let spawned = spawn_engine(
        None,
        EngineArguments::new(Behavior::new("recording").with(SetupRecorder {
            ready: false,
            fail: true,
        })),
    )
    .await;

    assert_eq!(spawned.map(|_| ()).unwrap_err().kind(), ErrorKind::FailedExecution);
}

#[tokio::test]
async fn given_served_property_when_queried_then_value_is_computed_each_time() {
    // Given: a property backed by a live counter
    let counter = Arc::new(AtomicI64::new(1));
    let served = Arc::clone(&counter);
    let client = setup_engine(
        EngineArguments::new(Behavior::new("serving").with(Queryable::new(Doubler {
            hits: Arc::new(AtomicUsize::new(0)),
        })))
        .serve_property("generation", move || {
            Payload::Integer(served.load(Ordering::SeqCst))
        }),
    )
    .await;

    assert_eq!(
        client.property("generation").await.unwrap(),
        Some(Payload::Integer(1))
    );

    // When: the underlying value changes
    counter.store(5, Ordering::SeqCst);

    // Then: the next query sees it
    assert_eq!(
        client.property("generation").await.unwrap(),
        Some(Payload::Integer(5))
    );
    assert_eq!(
        client.property("canBeQueried").await.unwrap(),
        Some(Payload::Bool(true))
    );
    assert_eq!(client.property("missing").await.unwrap(), None);

    let names = client.properties().await.unwrap();
    assert_eq!(names, vec!["behavior", "canBeQueried", "generation"]);
}

#[tokio::test]
async fn given_late_subscriber_when_subscribed_then_ready_is_not_replayed() {
    // Given: a running engine that already announced readiness
    let client = setup_engine(EngineArguments::new(Behavior::new("empty"))).await;
    let (controller, mut informs) = inform_sink(10_005);

    // When: a controller subscribes afterwards
    client.subscribe(controller).unwrap();
    assert_eq!(client.controllers().await.unwrap(), vec![ActorId::Local(10_005)]);

    // Then: nothing is delivered until the engine has news
    let replay = tokio::time::timeout(Duration::from_millis(200), informs.recv()).await;
    assert!(replay.is_err(), "late subscriber received {replay:?}");

    client.change_behavior(Behavior::new("next")).await.unwrap();
    assert_eq!(
        next_event(&mut informs).await,
        EngineEvent::BehaviorChanged {
            name: "next".to_string()
        }
    );

    client.unsubscribe(ActorId::Local(10_005)).unwrap();
    assert!(client.controllers().await.unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// HYPERPARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn given_dynamic_hyperparameters_when_one_entry_is_invalid_then_nothing_is_applied() {
    let params = DynamicHyperparameters::new([
        ("depth".to_string(), 4i64),
        ("width".to_string(), 16i64),
    ])
    .with_validator(|_, value| {
        if *value > 0 {
            Ok(())
        } else {
            Err(Error::failed_execution("must be positive"))
        }
    });
    let client = setup_engine(EngineArguments::new(Behavior::new("tuning").with(params))).await;

    let invalid = HyperparameterMap::from([
        ("depth".to_string(), Payload::Integer(8)),
        ("width".to_string(), Payload::Integer(-1)),
    ]);
    let fault = client.set_hyperparameters(invalid).await.unwrap_err();
    assert_eq!(fault.kind, ErrorKind::UnexpectedContent);

    let current = client.hyperparameters(None).await.unwrap();
    assert_eq!(current.get("depth"), Some(&Payload::Integer(4)));
    assert_eq!(current.get("width"), Some(&Payload::Integer(16)));

    let valid = HyperparameterMap::from([("depth".to_string(), Payload::Integer(8))]);
    assert_eq!(client.set_hyperparameters(valid).await, Ok(Done));
    let depth = client
        .hyperparameters(Some(vec!["depth".to_string()]))
        .await
        .unwrap();
    assert_eq!(
        depth,
        HyperparameterMap::from([("depth".to_string(), Payload::Integer(8))])
    );
}

#[tokio::test]
async fn given_open_hyperparameters_when_set_then_refused() {
    let params = OpenHyperparameters::new([("seed".to_string(), 42i64)]);
    let client = setup_engine(EngineArguments::new(Behavior::new("fixed").with(params))).await;

    let fault = client
        .set_hyperparameters(HyperparameterMap::from([(
            "seed".to_string(),
            Payload::Integer(7),
        )]))
        .await
        .unwrap_err();
    assert_eq!(fault.kind, ErrorKind::RefusedRequest);
    assert_eq!(
        client.hyperparameters(None).await.unwrap(),
        HyperparameterMap::from([("seed".to_string(), Payload::Integer(42))])
    );
}

#[tokio::test]
async fn given_running_engine_when_asked_then_requirements_are_the_union_of_components() {
    let (trainer, _gate) = trainer(true, false);
    let client = setup_engine(EngineArguments::new(
        Behavior::new("full")
            .with(Queryable::new(Doubler {
                hits: Arc::new(AtomicUsize::new(0)),
            }))
            .with(Trainable::new(trainer)),
    ))
    .await;

    let required: Vec<String> = client
        .requirements()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.to_string())
        .collect();
    assert_eq!(required, vec!["querying", "training_control"]);
}
