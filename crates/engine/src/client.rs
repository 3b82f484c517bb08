//! Promise-returning access to an engine actor.
//!
//! The raw [`EngineClient::send`] resolves with whatever `Response` the
//! engine produced. The typed helpers unpack the expected variant and turn
//! error replies into rejections carrying the wire [`Fault`]; transport
//! failures (timeout, stopped engine) are converted the same way.

use std::collections::BTreeSet;
use std::time::Duration;

use ractor::{ActorId, ActorRef};

use flowmesh_core::{Done, EngineConfig, Fault, Outcome, Payload, Result};
use flowmesh_dataflow::{Promise, Recipient, request};

use crate::capability::{Behavior, ControllerCapability};
use crate::messages::{
    EngineMessage, EngineRequest, HyperparameterMap, Inform, Response, UpdateMode,
};

fn unexpected(response: &Response) -> Fault {
    Fault::unexpected_content(format!("unexpected reply {response:?}"))
}

fn expect_done(response: Response) -> std::result::Result<Done, Fault> {
    match response {
        Response::Done => Ok(Done),
        Response::Error(fault) => Err(fault),
        other => Err(unexpected(&other)),
    }
}

fn expect_data(response: Response) -> std::result::Result<Payload, Fault> {
    match response {
        Response::Data(payload) => Ok(payload),
        Response::Error(fault) => Err(fault),
        other => Err(unexpected(&other)),
    }
}

/// Client for an `EngineActorDef`.
#[derive(Clone)]
pub struct EngineClient {
    engine: ActorRef<EngineMessage>,
    timeout: Option<Duration>,
}

impl EngineClient {
    /// Wrap an engine reference; requests wait forever.
    pub const fn new(engine: ActorRef<EngineMessage>) -> Self {
        Self {
            engine,
            timeout: None,
        }
    }

    /// Wrap an engine reference using the configured request timeout.
    pub const fn with_config(engine: ActorRef<EngineMessage>, config: &EngineConfig) -> Self {
        Self {
            engine,
            timeout: config.request_timeout,
        }
    }

    /// Apply a timeout to every request.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The underlying actor.
    pub const fn actor(&self) -> &ActorRef<EngineMessage> {
        &self.engine
    }

    pub fn id(&self) -> ActorId {
        self.engine.get_id()
    }

    /// Send a request and resolve with the raw response.
    pub fn send(&self, request_body: EngineRequest) -> Promise<Response> {
        request(
            &self.engine,
            move |reply| EngineMessage::Request {
                request: request_body,
                reply,
            },
            self.timeout,
        )
    }

    fn send_expecting<T, F>(&self, request_body: EngineRequest, unpack: F) -> Promise<T, Fault>
    where
        T: Send + 'static,
        F: FnOnce(Response) -> std::result::Result<T, Fault> + Send + 'static,
    {
        self.send(request_body).map_err(Fault::from).try_map(unpack)
    }

    pub fn query(&self, payload: Payload) -> Promise<Payload, Fault> {
        self.send_expecting(EngineRequest::Query { payload }, expect_data)
    }

    /// Start training; resolves when the run settles.
    ///
    /// A `TrainingError` reply rejects with a `FAILEDEXECUTION` fault.
    pub fn start_training(&self, input: Payload, params: Payload) -> Promise<Payload, Fault> {
        self.send_expecting(
            EngineRequest::StartTraining { input, params },
            |response| match response {
                Response::TrainingDone(payload) => Ok(payload),
                Response::TrainingError(message) => Err(Fault::failed_execution(message)),
                Response::Error(fault) => Err(fault),
                other => Err(unexpected(&other)),
            },
        )
    }

    pub fn stop_training(&self, force: bool) -> Promise<Done, Fault> {
        self.send_expecting(EngineRequest::StopTraining { force }, expect_done)
    }

    /// Evaluate; the engine's outcome is returned as-is.
    pub fn evaluate(&self, payload: Payload) -> Promise<Outcome<Payload>, Fault> {
        self.send_expecting(EngineRequest::Evaluate { payload }, |response| {
            match response {
                Response::Done => Ok(Outcome::Done),
                Response::Data(payload) => Ok(Outcome::Data(payload)),
                Response::Error(fault) => Ok(Outcome::Error(fault)),
                other => Err(unexpected(&other)),
            }
        })
    }

    pub fn update(&self, mode: UpdateMode, payload: Payload) -> Promise<Done, Fault> {
        self.send_expecting(EngineRequest::Update { mode, payload }, expect_done)
    }

    /// Read hyperparameters; `None` reads all of them.
    pub fn hyperparameters(&self, keys: Option<Vec<String>>) -> Promise<HyperparameterMap, Fault> {
        self.send_expecting(EngineRequest::GetHyperparameters { keys }, |response| {
            match response {
                Response::Hyperparameters(values) => Ok(values),
                Response::Error(fault) => Err(fault),
                other => Err(unexpected(&other)),
            }
        })
    }

    pub fn set_hyperparameters(&self, values: HyperparameterMap) -> Promise<Done, Fault> {
        self.send_expecting(EngineRequest::SetHyperparameters { values }, expect_done)
    }

    /// Current value of a property, `None` if nobody serves it.
    pub fn property(&self, name: impl Into<String>) -> Promise<Option<Payload>> {
        let name = name.into();
        request(
            &self.engine,
            move |reply| EngineMessage::QueryProperty { name, reply },
            self.timeout,
        )
    }

    pub fn properties(&self) -> Promise<Vec<String>> {
        request(
            &self.engine,
            |reply| EngineMessage::ListProperties { reply },
            self.timeout,
        )
    }

    pub fn requirements(&self) -> Promise<BTreeSet<ControllerCapability>> {
        request(
            &self.engine,
            |reply| EngineMessage::GetRequirements { reply },
            self.timeout,
        )
    }

    pub fn controllers(&self) -> Promise<Vec<ActorId>> {
        request(
            &self.engine,
            |reply| EngineMessage::GetControllers { reply },
            self.timeout,
        )
    }

    /// Swap the engine's components. Controllers stay subscribed.
    pub fn change_behavior(&self, behavior: Behavior) -> Promise<Done, Fault> {
        request(
            &self.engine,
            move |reply| EngineMessage::ChangeBehavior { behavior, reply },
            self.timeout,
        )
        .map_err(Fault::from)
        .try_map(expect_done)
    }

    /// Register `controller` for informs.
    ///
    /// # Errors
    ///
    /// Returns `Error::ActorUnavailable` if the engine has stopped.
    pub fn subscribe(&self, controller: Recipient<Inform>) -> Result<()> {
        self.cast(EngineMessage::SubscribeEngineController(controller))
    }

    /// Remove a controller.
    ///
    /// # Errors
    ///
    /// Returns `Error::ActorUnavailable` if the engine has stopped.
    pub fn unsubscribe(&self, controller: ActorId) -> Result<()> {
        self.cast(EngineMessage::UnsubscribeEngineController(controller))
    }

    fn cast(&self, message: EngineMessage) -> Result<()> {
        self.engine
            .send_message(message)
            .map_err(|_| flowmesh_core::Error::actor_unavailable(self.engine.get_id()))
    }
}
