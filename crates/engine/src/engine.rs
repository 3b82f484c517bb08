//! EngineActor - capability components behind one mailbox.
//!
//! Design principles:
//! - Every request goes to the first accepting component, exactly once
//! - Long-running work runs off-actor and re-enters through `Resume`
//! - Controllers and served properties survive behaviour changes
//! - Business failures are replies; the actor itself never fails on them

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::{AbortHandle, abortable};
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, RpcReplyPort};
use tracing::{debug, info, warn};

use flowmesh_core::{Error, Fault, Payload, Result};
use flowmesh_dataflow::{Promise, Recipient};

use crate::capability::{Behavior, Capability, ControllerCapability, EngineContext, Reply};
use crate::messages::{EngineEvent, EngineMessage, EngineRequest, Inform, Response};

/// Name of the built-in property holding the current behaviour name.
pub const BEHAVIOR_PROPERTY: &str = "behavior";

type PropertySupplier = Arc<dyn Fn() -> Payload + Send + Sync>;

/// The engine actor definition.
#[derive(Debug, Default, Clone, Copy)]
pub struct EngineActorDef;

/// Arguments passed to the actor on startup.
pub struct EngineArguments {
    behavior: Behavior,
    properties: im::HashMap<String, PropertySupplier>,
    controllers: Vec<Recipient<Inform>>,
}

impl EngineArguments {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            properties: im::HashMap::new(),
            controllers: Vec::new(),
        }
    }

    /// Expose a property whose value is computed by `supplier` on every query.
    #[must_use]
    pub fn serve_property(
        mut self,
        name: impl Into<String>,
        supplier: impl Fn() -> Payload + Send + Sync + 'static,
    ) -> Self {
        self.properties.insert(name.into(), Arc::new(supplier));
        self
    }

    /// Subscribe a controller before the engine starts; it receives `Ready`.
    #[must_use]
    pub fn with_controller(mut self, controller: Recipient<Inform>) -> Self {
        self.controllers.push(controller);
        self
    }
}

/// A request waiting for its off-actor work.
struct InFlight {
    reply: RpcReplyPort<Response>,
    abort: AbortHandle,
}

/// Actor state.
pub struct EngineState {
    behavior: String,
    components: Vec<Box<dyn Capability>>,
    controllers: im::HashMap<ActorId, Recipient<Inform>>,
    properties: im::HashMap<String, PropertySupplier>,
    in_flight: HashMap<(usize, u64), InFlight>,
    generation: u64,
}

impl EngineState {
    fn broadcast(&self, engine: ActorId, event: &EngineEvent) {
        for (id, controller) in &self.controllers {
            let inform = Inform {
                engine,
                event: event.clone(),
            };
            if let Err(e) = controller.send(inform) {
                warn!(controller = %id, error = %e, "Dropped inform");
            }
        }
    }

    fn requirements(&self) -> BTreeSet<ControllerCapability> {
        self.components
            .iter()
            .flat_map(|component| component.requirements())
            .collect()
    }

    fn property(&self, name: &str) -> Option<Payload> {
        if let Some(supplier) = self.properties.get(name) {
            return Some(supplier());
        }
        if name == BEHAVIOR_PROPERTY {
            return Some(Payload::Text(self.behavior.clone()));
        }
        self.components
            .iter()
            .find_map(|component| component.property(name))
    }

    fn property_names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .properties
            .keys()
            .cloned()
            .chain(std::iter::once(BEHAVIOR_PROPERTY.to_string()))
            .chain(
                self.components
                    .iter()
                    .flat_map(|component| component.property_names())
                    .map(str::to_string),
            )
            .collect();
        names.into_iter().collect()
    }

    /// Broadcast the informs and resolve the cancellations a component asked for.
    fn apply(&mut self, engine: ActorId, component: usize, ctx: EngineContext) {
        let (informs, cancels) = ctx.into_parts();
        for event in &informs {
            self.broadcast(engine, event);
        }
        for tag in cancels {
            let Some(flight) = self.in_flight.remove(&(component, tag)) else {
                debug!(component, tag, "Cancel for work that already settled");
                continue;
            };
            flight.abort.abort();
            let mut nested = EngineContext::new();
            let response = match self.components.get_mut(component) {
                Some(owner) => owner.resume(tag, Err(Error::Cancelled), &mut nested),
                None => Response::Error(Fault::from(Error::Cancelled)),
            };
            self.apply(engine, component, nested);
            let _ = flight.reply.send(response);
        }
    }

    fn abort_all(&mut self, reason: &str) -> usize {
        let count = self.in_flight.len();
        for (_, flight) in self.in_flight.drain() {
            flight.abort.abort();
            let _ = flight
                .reply
                .send(Response::Error(Fault::failed_execution(reason)));
        }
        count
    }
}

impl Actor for EngineActorDef {
    type Msg = EngineMessage;
    type State = EngineState;
    type Arguments = EngineArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> std::result::Result<Self::State, ActorProcessingErr> {
        let (behavior, mut components) = args.behavior.into_parts();
        for component in &mut components {
            component.setup().map_err(|e| {
                warn!(component = component.name(), error = %e, "Component setup failed");
                Box::new(e) as ActorProcessingErr
            })?;
        }
        info!(
            engine = %myself.get_id(),
            behavior = %behavior,
            components = components.len(),
            "EngineActor starting"
        );
        Ok(EngineState {
            behavior,
            components,
            controllers: args
                .controllers
                .into_iter()
                .map(|controller| (controller.id(), controller))
                .collect(),
            properties: args.properties,
            in_flight: HashMap::new(),
            generation: 0,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        state.broadcast(myself.get_id(), &EngineEvent::Ready);
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        match message {
            EngineMessage::Request { request, reply } => {
                Self::dispatch(&myself, state, request, reply);
            }

            EngineMessage::SubscribeEngineController(controller) => {
                let id = controller.id();
                debug!(controller = %id, "Controller subscribed");
                state.controllers.insert(id, controller);
            }

            EngineMessage::UnsubscribeEngineController(id) => {
                if state.controllers.remove(&id).is_some() {
                    debug!(controller = %id, "Controller unsubscribed");
                }
            }

            EngineMessage::QueryProperty { name, reply } => {
                let _ = reply.send(state.property(&name));
            }

            EngineMessage::ListProperties { reply } => {
                let _ = reply.send(state.property_names());
            }

            EngineMessage::GetRequirements { reply } => {
                let _ = reply.send(state.requirements());
            }

            EngineMessage::GetControllers { reply } => {
                let _ = reply.send(state.controllers.keys().copied().collect());
            }

            EngineMessage::ChangeBehavior { behavior, reply } => {
                let response = Self::change_behavior(&myself, state, behavior);
                let _ = reply.send(response);
            }

            EngineMessage::Resume {
                generation,
                component,
                tag,
                outcome,
            } => {
                if generation != state.generation {
                    debug!(
                        generation,
                        current = state.generation,
                        "Ignoring resume from a replaced behaviour"
                    );
                    return Ok(());
                }
                let Some(flight) = state.in_flight.remove(&(component, tag)) else {
                    debug!(component, tag, "Ignoring resume for cancelled work");
                    return Ok(());
                };
                let mut ctx = EngineContext::new();
                let response = match state.components.get_mut(component) {
                    Some(owner) => owner.resume(tag, outcome, &mut ctx),
                    None => Response::Error(Fault::failed_execution("component no longer exists")),
                };
                state.apply(myself.get_id(), component, ctx);
                let _ = flight.reply.send(response);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        let aborted = state.abort_all("engine stopped");
        info!(
            engine = %myself.get_id(),
            behavior = %state.behavior,
            aborted,
            "EngineActor stopping"
        );
        Ok(())
    }
}

impl EngineActorDef {
    fn dispatch(
        myself: &ActorRef<EngineMessage>,
        state: &mut EngineState,
        request: EngineRequest,
        reply: RpcReplyPort<Response>,
    ) {
        let label = request.label();
        let Some((index, component)) = state
            .components
            .iter_mut()
            .enumerate()
            .find(|(_, component)| component.accepts(&request))
        else {
            warn!(request = label, behavior = %state.behavior, "No component accepts request");
            let _ = reply.send(Response::Error(Fault::refused_request(format!(
                "no component accepts {label}"
            ))));
            return;
        };

        debug!(request = label, component = component.name(), "Dispatching");
        let mut ctx = EngineContext::new();
        let answer = component.handle(request, &mut ctx);
        state.apply(myself.get_id(), index, ctx);

        match answer {
            Reply::Now(response) => {
                let _ = reply.send(response);
            }
            Reply::Later(promise) => {
                tokio::spawn(async move {
                    let response = match promise.await {
                        Ok(response) => response,
                        Err(e) => Response::Error(e.into()),
                    };
                    let _ = reply.send(response);
                });
            }
            Reply::Resume { tag, work } => {
                let (work, abort) = abortable(work.into_future());
                state.in_flight.insert((index, tag), InFlight { reply, abort });
                let generation = state.generation;
                Promise::from_future(async move {
                    work.await.unwrap_or(Err(Error::Cancelled))
                })
                .pipe_to(myself, move |outcome| EngineMessage::Resume {
                    generation,
                    component: index,
                    tag,
                    outcome,
                });
            }
        }
    }

    fn change_behavior(
        myself: &ActorRef<EngineMessage>,
        state: &mut EngineState,
        behavior: Behavior,
    ) -> Response {
        let (name, mut components) = behavior.into_parts();
        for component in &mut components {
            if let Err(e) = component.setup() {
                warn!(
                    behavior = %name,
                    component = component.name(),
                    error = %e,
                    "Behaviour setup failed, keeping current"
                );
                return Response::Error(e.into());
            }
        }

        let aborted = state.abort_all("behavior changed");
        let previous = std::mem::replace(&mut state.behavior, name.clone());
        state.components = components;
        state.generation = state.generation.wrapping_add(1);
        info!(
            from = %previous,
            to = %name,
            aborted,
            controllers = state.controllers.len(),
            "Behaviour changed"
        );
        state.broadcast(myself.get_id(), &EngineEvent::BehaviorChanged { name });
        Response::Done
    }
}

/// Spawn an engine actor.
///
/// Component setup runs before the actor accepts any message.
///
/// # Errors
///
/// Returns `Error::ActorUnavailable` if the actor fails to start, including
/// when a component's setup fails.
pub async fn spawn_engine(
    name: Option<String>,
    args: EngineArguments,
) -> Result<ActorRef<EngineMessage>> {
    let label = name.clone().unwrap_or_else(|| "engine".to_string());
    Actor::spawn(name, EngineActorDef, args)
        .await
        .map(|(actor, _handle)| actor)
        .map_err(|e| Error::actor_unavailable(format!("{label}: {e}")))
}
