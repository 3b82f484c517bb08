//! ControllerActor - coordinates engines it has negotiated with.
//!
//! Assignment is a two-step handshake:
//!
//! ```text
//!   AssignEngine(e) ──> GetRequirements ──> Negotiated
//!                                             ├─ covered  ──> Subscribe, Assigned
//!                                             └─ missing  ──> Rejected
//! ```
//!
//! The controller never subscribes before its capabilities were checked.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, RpcReplyPort};
use tracing::{debug, info, warn};

use flowmesh_core::{EngineConfig, Error, Result, ResultExt};
use flowmesh_dataflow::{Recipient, request};

use crate::capability::{ControllerCapability, negotiate};
use crate::client::EngineClient;
use crate::messages::{EngineMessage, Inform};

/// What a controller can do and how it reacts to informs.
pub trait ControllerBehavior: Send + 'static {
    /// Capabilities offered to engines during negotiation.
    fn capabilities(&self) -> BTreeSet<ControllerCapability>;

    /// Called for every inform from an assigned engine.
    fn on_inform(&mut self, engine: &EngineClient, inform: &Inform) {
        let _ = (engine, inform);
    }
}

/// A bare capability set is a controller that only records informs.
impl ControllerBehavior for BTreeSet<ControllerCapability> {
    fn capabilities(&self) -> BTreeSet<ControllerCapability> {
        self.clone()
    }
}

/// Where a controller stands with one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// Waiting for the engine's requirements.
    Negotiating,
    /// Subscribed and receiving informs.
    Assigned,
    /// The engine needs capabilities this controller lacks.
    Rejected { reason: String },
}

/// Messages for the controller actor.
pub enum ControllerMessage {
    /// Start coordinating `engine`.
    AssignEngine(ActorRef<EngineMessage>),

    /// Stop coordinating an engine and unsubscribe from it.
    ReleaseEngine(ActorId),

    /// A notification from a subscribed engine.
    Inform(Inform),

    /// Requirement lookup settled (internal re-entry).
    Negotiated {
        engine: ActorId,
        outcome: Result<BTreeSet<ControllerCapability>>,
    },

    /// Informs received so far, oldest first.
    GetHistory { reply: RpcReplyPort<Vec<Inform>> },

    /// Assignment status per engine.
    GetAssignments {
        reply: RpcReplyPort<Vec<(ActorId, Assignment)>>,
    },
}

impl fmt::Debug for ControllerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssignEngine(engine) => {
                f.debug_tuple("AssignEngine").field(&engine.get_id()).finish()
            }
            Self::ReleaseEngine(id) => f.debug_tuple("ReleaseEngine").field(id).finish(),
            Self::Inform(inform) => f.debug_tuple("Inform").field(inform).finish(),
            Self::Negotiated { engine, outcome } => f
                .debug_struct("Negotiated")
                .field("engine", engine)
                .field("ok", &outcome.is_ok())
                .finish(),
            Self::GetHistory { .. } => f.write_str("GetHistory"),
            Self::GetAssignments { .. } => f.write_str("GetAssignments"),
        }
    }
}

/// The controller actor definition.
#[derive(Debug, Default, Clone, Copy)]
pub struct ControllerActorDef;

/// Arguments passed to the actor on startup.
pub struct ControllerArguments {
    behavior: Box<dyn ControllerBehavior>,
    config: EngineConfig,
}

impl ControllerArguments {
    pub fn new(behavior: impl ControllerBehavior) -> Self {
        Self {
            behavior: Box::new(behavior),
            config: EngineConfig::default(),
        }
    }

    /// Set timeouts and history size.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }
}

#[derive(Clone)]
struct EngineSlot {
    client: EngineClient,
    assignment: Assignment,
}

/// Actor state.
pub struct ControllerState {
    behavior: Box<dyn ControllerBehavior>,
    capabilities: BTreeSet<ControllerCapability>,
    config: EngineConfig,
    engines: im::HashMap<ActorId, EngineSlot>,
    history: VecDeque<Inform>,
}

impl ControllerState {
    fn record(&mut self, inform: Inform) {
        if self.config.inform_history == 0 {
            return;
        }
        while self.history.len() >= self.config.inform_history {
            self.history.pop_front();
        }
        self.history.push_back(inform);
    }
}

impl Actor for ControllerActorDef {
    type Msg = ControllerMessage;
    type State = ControllerState;
    type Arguments = ControllerArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> std::result::Result<Self::State, ActorProcessingErr> {
        let capabilities = args.behavior.capabilities();
        info!(
            controller = %myself.get_id(),
            capabilities = ?capabilities,
            "ControllerActor starting"
        );
        Ok(ControllerState {
            behavior: args.behavior,
            capabilities,
            config: args.config,
            engines: im::HashMap::new(),
            history: VecDeque::new(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        match message {
            ControllerMessage::AssignEngine(engine) => {
                let id = engine.get_id();
                if state.engines.contains_key(&id) {
                    debug!(engine = %id, "Engine already assigned");
                    return Ok(());
                }
                debug!(engine = %id, "Negotiating with engine");
                request(
                    &engine,
                    |reply| EngineMessage::GetRequirements { reply },
                    Some(state.config.negotiation_timeout),
                )
                .pipe_to(&myself, move |outcome| ControllerMessage::Negotiated {
                    engine: id,
                    outcome,
                });
                state.engines.insert(
                    id,
                    EngineSlot {
                        client: EngineClient::with_config(engine, &state.config),
                        assignment: Assignment::Negotiating,
                    },
                );
            }

            ControllerMessage::Negotiated { engine, outcome } => {
                Self::conclude(&myself, state, engine, outcome);
            }

            ControllerMessage::ReleaseEngine(id) => {
                if let Some(slot) = state.engines.remove(&id) {
                    if slot.assignment == Assignment::Assigned {
                        slot.client
                            .unsubscribe(myself.get_id())
                            .swallow_logged("unsubscribe on release");
                    }
                    info!(engine = %id, "Engine released");
                }
            }

            ControllerMessage::Inform(inform) => {
                debug!(engine = %inform.engine, event = ?inform.event, "Inform");
                if let Some(slot) = state.engines.get(&inform.engine) {
                    let client = slot.client.clone();
                    state.behavior.on_inform(&client, &inform);
                }
                state.record(inform);
            }

            ControllerMessage::GetHistory { reply } => {
                let _ = reply.send(state.history.iter().cloned().collect());
            }

            ControllerMessage::GetAssignments { reply } => {
                let assignments = state
                    .engines
                    .iter()
                    .map(|(id, slot)| (*id, slot.assignment.clone()))
                    .collect();
                let _ = reply.send(assignments);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        let me = myself.get_id();
        let mut released = 0usize;
        for slot in state
            .engines
            .values()
            .filter(|slot| slot.assignment == Assignment::Assigned)
        {
            slot.client
                .unsubscribe(me)
                .swallow_logged("unsubscribe on stop");
            released += 1;
        }
        info!(controller = %me, released, "ControllerActor stopping");
        Ok(())
    }
}

impl ControllerActorDef {
    fn conclude(
        myself: &ActorRef<ControllerMessage>,
        state: &mut ControllerState,
        engine: ActorId,
        outcome: Result<BTreeSet<ControllerCapability>>,
    ) {
        let Some(slot) = state.engines.get_mut(&engine) else {
            debug!(engine = %engine, "Negotiation settled for a released engine");
            return;
        };

        let accepted = outcome
            .and_then(|required| negotiate(&required, &state.capabilities))
            .and_then(|()| {
                slot.client
                    .subscribe(Recipient::mapped(myself, ControllerMessage::Inform))
            });

        slot.assignment = match accepted {
            Ok(()) => {
                info!(engine = %engine, "Engine assigned");
                Assignment::Assigned
            }
            Err(e) => {
                warn!(engine = %engine, error = %e, "Engine assignment rejected");
                Assignment::Rejected {
                    reason: e.to_string(),
                }
            }
        };
    }
}

/// Spawn a controller actor.
///
/// # Errors
///
/// Returns `Error::ActorUnavailable` if the actor fails to start.
pub async fn spawn_controller(
    name: Option<String>,
    args: ControllerArguments,
) -> Result<ActorRef<ControllerMessage>> {
    let label = name.clone().unwrap_or_else(|| "controller".to_string());
    Actor::spawn(name, ControllerActorDef, args)
        .await
        .map(|(actor, _handle)| actor)
        .map_err(|e| Error::actor_unavailable(format!("{label}: {e}")))
}
