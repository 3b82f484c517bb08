//! Wire vocabulary between controllers and engines.
//!
//! Requests travel inside `EngineMessage::Request` together with the reply
//! port; the reply always goes back to the causal sender. Informs are
//! broadcast to the controllers subscribed at broadcast time.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ractor::{ActorId, RpcReplyPort};
use serde::{Deserialize, Serialize};

use flowmesh_core::{Done, Fault, Outcome, Payload, Result};
use flowmesh_dataflow::Recipient;

use crate::capability::{Behavior, ControllerCapability};

/// Hyperparameter assignment as carried on the wire.
pub type HyperparameterMap = BTreeMap<String, Payload>;

/// How an update is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// The payload is a whole batch.
    Batch,
    /// The payload is a single instance.
    Instance,
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batch => write!(f, "batch"),
            Self::Instance => write!(f, "instance"),
        }
    }
}

/// Commands a controller sends to an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum EngineRequest {
    Query { payload: Payload },
    StartTraining { input: Payload, params: Payload },
    StopTraining { force: bool },
    Evaluate { payload: Payload },
    Update { mode: UpdateMode, payload: Payload },
    /// `None` asks for every hyperparameter.
    GetHyperparameters { keys: Option<Vec<String>> },
    SetHyperparameters { values: HyperparameterMap },
}

impl EngineRequest {
    /// Short name for logs and refusals.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Query { .. } => "query",
            Self::StartTraining { .. } => "start_training",
            Self::StopTraining { .. } => "stop_training",
            Self::Evaluate { .. } => "evaluate",
            Self::Update { .. } => "update",
            Self::GetHyperparameters { .. } => "get_hyperparameters",
            Self::SetHyperparameters { .. } => "set_hyperparameters",
        }
    }
}

/// Replies to engine requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "response", content = "value", rename_all = "snake_case")]
pub enum Response {
    Done,
    Error(Fault),
    Data(Payload),
    TrainingDone(Payload),
    TrainingError(String),
    Hyperparameters(HyperparameterMap),
}

impl Response {
    /// The fault carried by an error reply.
    pub const fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Error(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<Done> for Response {
    fn from(_: Done) -> Self {
        Self::Done
    }
}

impl From<Fault> for Response {
    fn from(fault: Fault) -> Self {
        Self::Error(fault)
    }
}

impl From<Outcome<Payload>> for Response {
    fn from(outcome: Outcome<Payload>) -> Self {
        match outcome {
            Outcome::Done => Self::Done,
            Outcome::Error(fault) => Self::Error(fault),
            Outcome::Data(payload) => Self::Data(payload),
        }
    }
}

/// Lifecycle and outcome notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Ready,
    TrainingStarted,
    TrainingFinished { succeeded: bool },
    TrainingStopped { forced: bool },
    Updated { mode: UpdateMode },
    HyperparametersChanged { keys: Vec<String> },
    BehaviorChanged { name: String },
}

/// An event together with the engine that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inform {
    pub engine: ActorId,
    pub event: EngineEvent,
}

/// Messages for the engine actor.
pub enum EngineMessage {
    /// A command; the response goes to `reply`.
    Request {
        request: EngineRequest,
        reply: RpcReplyPort<Response>,
    },

    /// Register a controller for informs.
    SubscribeEngineController(Recipient<Inform>),

    /// Remove a controller.
    UnsubscribeEngineController(ActorId),

    /// Evaluate a property now.
    QueryProperty {
        name: String,
        reply: RpcReplyPort<Option<Payload>>,
    },

    /// Names of every property the engine can answer.
    ListProperties { reply: RpcReplyPort<Vec<String>> },

    /// Controller capabilities the current components require.
    GetRequirements {
        reply: RpcReplyPort<BTreeSet<ControllerCapability>>,
    },

    /// Ids of the subscribed controllers.
    GetControllers { reply: RpcReplyPort<Vec<ActorId>> },

    /// Swap the component set, keeping the controllers.
    ChangeBehavior {
        behavior: Behavior,
        reply: RpcReplyPort<Response>,
    },

    /// Long-running work settled (internal re-entry).
    Resume {
        generation: u64,
        component: usize,
        tag: u64,
        outcome: Result<Payload>,
    },
}

impl fmt::Debug for EngineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request { request, .. } => {
                f.debug_tuple("Request").field(&request.label()).finish()
            }
            Self::SubscribeEngineController(controller) => f
                .debug_tuple("SubscribeEngineController")
                .field(&controller.id())
                .finish(),
            Self::UnsubscribeEngineController(id) => {
                f.debug_tuple("UnsubscribeEngineController").field(id).finish()
            }
            Self::QueryProperty { name, .. } => f.debug_tuple("QueryProperty").field(name).finish(),
            Self::ListProperties { .. } => f.write_str("ListProperties"),
            Self::GetRequirements { .. } => f.write_str("GetRequirements"),
            Self::GetControllers { .. } => f.write_str("GetControllers"),
            Self::ChangeBehavior { behavior, .. } => {
                f.debug_tuple("ChangeBehavior").field(&behavior.name()).finish()
            }
            Self::Resume {
                generation,
                component,
                tag,
                outcome,
            } => f
                .debug_struct("Resume")
                .field("generation", generation)
                .field("component", component)
                .field("tag", tag)
                .field("ok", &outcome.is_ok())
                .finish(),
        }
    }
}
