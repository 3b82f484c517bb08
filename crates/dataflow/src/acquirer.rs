//! Acquirer: the producer at the head of a pipeline.
//!
//! `Emit` pushes inline data. `EmitStored` writes the value into a deferred
//! store under a fresh key first and pushes a stored reference instead, so
//! downstream stages resolve it through the ticket path.

use std::fmt;
use std::marker::PhantomData;

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tracing::{debug, info, warn};

use flowmesh_core::{Error, Result};

use crate::data::Data;
use crate::fabric::{DataSender, SubscriptionControl};
use crate::store::{DataKey, StoreClient};

/// Messages for the acquirer.
pub enum AcquirerMessage<T> {
    /// Push `value` inline.
    Emit(T),

    /// Store `value` and push a reference to it.
    EmitStored(T),

    /// Subscription management.
    Control(SubscriptionControl<T>),

    /// Number of current subscribers.
    GetSubscriberCount { reply: RpcReplyPort<usize> },
}

impl<T> fmt::Debug for AcquirerMessage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Emit(_) => f.write_str("Emit"),
            Self::EmitStored(_) => f.write_str("EmitStored"),
            Self::Control(control) => f.debug_tuple("Control").field(control).finish(),
            Self::GetSubscriberCount { .. } => f.write_str("GetSubscriberCount"),
        }
    }
}

impl<T> From<SubscriptionControl<T>> for AcquirerMessage<T> {
    fn from(control: SubscriptionControl<T>) -> Self {
        Self::Control(control)
    }
}

/// The acquirer actor definition.
pub struct AcquirerActor<T> {
    _value: PhantomData<fn() -> T>,
}

impl<T> AcquirerActor<T> {
    pub const fn new() -> Self {
        Self {
            _value: PhantomData,
        }
    }
}

impl<T> Default for AcquirerActor<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Actor state.
pub struct AcquirerState<T> {
    outbound: DataSender<T>,
    store: Option<StoreClient<T>>,
    emitted: u64,
}

impl<T> Actor for AcquirerActor<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Msg = AcquirerMessage<T>;
    type State = AcquirerState<T>;
    type Arguments = Option<StoreClient<T>>;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        store: Self::Arguments,
    ) -> std::result::Result<Self::State, ActorProcessingErr> {
        info!(actor = %myself.get_id(), has_store = store.is_some(), "Acquirer starting");
        Ok(AcquirerState {
            outbound: DataSender::new(),
            store,
            emitted: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        match message {
            AcquirerMessage::Emit(value) => {
                let reached = state.outbound.send_data(myself.get_id(), value);
                state.emitted = state.emitted.saturating_add(1);
                debug!(reached, "Emitted inline");
            }

            AcquirerMessage::EmitStored(value) => {
                let data = match &state.store {
                    Some(store) => {
                        let key = DataKey::new();
                        match store.put(key, value.clone()) {
                            Ok(()) => Data::stored(key, store.clone()),
                            Err(e) => {
                                warn!(error = %e, "Store unavailable, emitting inline");
                                Data::inline(value)
                            }
                        }
                    }
                    None => {
                        warn!("No store configured, emitting inline");
                        Data::inline(value)
                    }
                };
                let reached = state.outbound.send(myself.get_id(), data);
                state.emitted = state.emitted.saturating_add(1);
                debug!(reached, "Emitted stored");
            }

            AcquirerMessage::Control(control) => {
                state.outbound.handle_control(control);
            }

            AcquirerMessage::GetSubscriberCount { reply } => {
                let _ = reply.send(state.outbound.len());
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        info!(actor = %myself.get_id(), emitted = state.emitted, "Acquirer stopping");
        Ok(())
    }
}

/// Spawn an acquirer, optionally backed by a store for `EmitStored`.
///
/// # Errors
///
/// Returns `Error::ActorUnavailable` if the actor fails to start.
pub async fn spawn_acquirer<T>(
    name: Option<String>,
    store: Option<StoreClient<T>>,
) -> Result<ActorRef<AcquirerMessage<T>>>
where
    T: Clone + Send + Sync + 'static,
{
    let label = name.clone().unwrap_or_else(|| "acquirer".to_string());
    Actor::spawn(name, AcquirerActor::new(), store)
        .await
        .map(|(actor, _handle)| actor)
        .map_err(|e| Error::actor_unavailable(format!("{label}: {e}")))
}
