//! Trainable: starts and stops long-running training runs.
//!
//! ```text
//!            StartTraining                 run settles / stop
//!   Idle ─────────────────> Training{tag} ────────────────────> Idle
//! ```
//!
//! `StartTraining` is answered only once the run settles, with
//! `TrainingDone(data)` or `TrainingError(message)`. A stop cancels the run
//! and the pending start is answered with `TrainingError`.

use std::collections::BTreeSet;

use tracing::{info, warn};

use flowmesh_core::{Error, Fault, FromPayload, IntoPayload, Payload, Result, ResultExt};
use flowmesh_dataflow::Promise;

use crate::capability::{Capability, ControllerCapability, EngineContext, Reply};
use crate::messages::{EngineEvent, EngineRequest, Response};

/// Reason reported to the pending start when a run is stopped.
pub const TRAINING_STOPPED: &str = "training stopped";

/// Typed training logic.
pub trait Trainer: Send + 'static {
    type Input: FromPayload;
    type Params: FromPayload;
    type Output: IntoPayload + Send + 'static;

    /// Start a run. The promise settles when the run ends.
    fn train(&mut self, input: Self::Input, params: Self::Params) -> Promise<Self::Output>;

    /// Whether a non-forced stop may interrupt the current run.
    fn can_training_be_stopped(&self) -> bool {
        true
    }

    /// Interrupt the current run.
    ///
    /// # Errors
    ///
    /// A failure refuses a normal stop; a forced stop logs it and proceeds.
    fn stop_training(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_ready_for_training(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrainingState {
    Idle,
    Training { tag: u64 },
}

/// Component wrapping a [`Trainer`].
pub struct Trainable<T> {
    trainer: T,
    state: TrainingState,
    next_tag: u64,
}

impl<T: Trainer> Trainable<T> {
    pub const fn new(trainer: T) -> Self {
        Self {
            trainer,
            state: TrainingState::Idle,
            next_tag: 0,
        }
    }

    pub const fn is_training(&self) -> bool {
        matches!(self.state, TrainingState::Training { .. })
    }

    fn start(&mut self, input: Payload, params: Payload, ctx: &mut EngineContext) -> Reply {
        if self.is_training() {
            return Reply::fault(Fault::refused_request("training already in progress"));
        }
        if !self.trainer.is_ready_for_training() {
            return Reply::fault(Fault::refused_request("not ready for training"));
        }
        let decoded = T::Input::from_payload(input)
            .and_then(|input| T::Params::from_payload(params).map(|params| (input, params)));
        let (input, params) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed training request");
                return Reply::fault(e);
            }
        };

        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);
        self.state = TrainingState::Training { tag };
        ctx.inform(EngineEvent::TrainingStarted);
        info!(tag, "Training started");

        let work = self
            .trainer
            .train(input, params)
            .try_map(IntoPayload::into_payload);
        Reply::Resume { tag, work }
    }

    fn stop(&mut self, force: bool, ctx: &mut EngineContext) -> Reply {
        let TrainingState::Training { tag } = self.state else {
            return Reply::Now(Response::Done);
        };
        if !force && !self.trainer.can_training_be_stopped() {
            return Reply::fault(Fault::refused_request("training cannot be stopped now"));
        }

        let stopped = self.trainer.stop_training();
        if force {
            stopped.swallow_logged("forced training stop");
        } else if let Err(e) = stopped {
            return Reply::fault(e);
        }

        self.state = TrainingState::Idle;
        ctx.cancel(tag);
        ctx.inform(EngineEvent::TrainingStopped { forced: force });
        info!(tag, force, "Training stopped");
        Reply::Now(Response::Done)
    }
}

impl<T: Trainer> Capability for Trainable<T> {
    fn name(&self) -> &str {
        "trainable"
    }

    fn requirements(&self) -> BTreeSet<ControllerCapability> {
        BTreeSet::from([ControllerCapability::TrainingControl])
    }

    fn accepts(&self, request: &EngineRequest) -> bool {
        matches!(
            request,
            EngineRequest::StartTraining { .. } | EngineRequest::StopTraining { .. }
        )
    }

    fn handle(&mut self, request: EngineRequest, ctx: &mut EngineContext) -> Reply {
        match request {
            EngineRequest::StartTraining { input, params } => self.start(input, params, ctx),
            EngineRequest::StopTraining { force } => self.stop(force, ctx),
            other => Reply::fault(Fault::refused_request(format!(
                "trainable does not handle {}",
                other.label()
            ))),
        }
    }

    fn resume(&mut self, tag: u64, outcome: Result<Payload>, ctx: &mut EngineContext) -> Response {
        if self.state == (TrainingState::Training { tag }) {
            self.state = TrainingState::Idle;
        }
        match outcome {
            Ok(payload) => {
                ctx.inform(EngineEvent::TrainingFinished { succeeded: true });
                Response::TrainingDone(payload)
            }
            Err(Error::Cancelled) => Response::TrainingError(TRAINING_STOPPED.to_string()),
            Err(e) => {
                ctx.inform(EngineEvent::TrainingFinished { succeeded: false });
                Response::TrainingError(e.to_string())
            }
        }
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["isTraining", "isReadyForTraining"]
    }

    fn property(&self, name: &str) -> Option<Payload> {
        match name {
            "isTraining" => Some(Payload::Bool(self.is_training())),
            "isReadyForTraining" => Some(Payload::Bool(
                !self.is_training() && self.trainer.is_ready_for_training(),
            )),
            _ => None,
        }
    }
}
