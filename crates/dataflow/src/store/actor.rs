//! StoreActor - the deferred store behind a mailbox.
//!
//! Design principles:
//! - Commands are fire-and-forget (`Put`, `PutMany`, `Reject`)
//! - Queries return responses through `RpcReplyPort`
//! - Loads run off-actor and re-enter through `StoreMessage::Loaded`

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tracing::{debug, info};

use flowmesh_core::{Error, Result, StoreConfig};

use super::{DataKey, DeferredStore, Lookup, Partitioned, Ticket, TicketRequest};
use crate::promise::Promise;

/// Produces values for keys that were requested before anyone put them.
pub trait Loader<V>: Send + Sync + 'static {
    /// Start loading `key`. Called at most once per pending key.
    fn load(&self, key: DataKey) -> Promise<V>;
}

impl<V, F> Loader<V> for F
where
    F: Fn(DataKey) -> Promise<V> + Send + Sync + 'static,
{
    fn load(&self, key: DataKey) -> Promise<V> {
        self(key)
    }
}

/// Store counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Stored entries.
    pub entries: usize,
    /// Open ticket slots.
    pub pending: usize,
    /// Loads triggered since start.
    pub loads: u64,
}

/// Messages for the StoreActor.
pub enum StoreMessage<V> {
    // ═══════════════════════════════════════════════════════════════════════
    // COMMANDS (fire-and-forget via cast!)
    // ═══════════════════════════════════════════════════════════════════════
    /// Upsert a value, settling any pending ticket.
    Put { key: DataKey, value: V },

    /// Upsert several values.
    PutMany { entries: Vec<(DataKey, V)> },

    /// Settle a pending ticket with a failure.
    Reject { key: DataKey, error: Error },

    /// A load finished (internal re-entry).
    Loaded { key: DataKey, outcome: Result<V> },

    // ═══════════════════════════════════════════════════════════════════════
    // QUERIES (request-response via call!)
    // ═══════════════════════════════════════════════════════════════════════
    /// Store a value under a fresh key.
    Add {
        value: V,
        reply: RpcReplyPort<DataKey>,
    },

    /// Store several values under fresh keys, in order.
    AddMany {
        values: Vec<V>,
        reply: RpcReplyPort<Vec<DataKey>>,
    },

    /// Immediate lookup.
    Get {
        key: DataKey,
        reply: RpcReplyPort<Lookup<V>>,
    },

    /// Immediate bulk lookup.
    GetMany {
        keys: Vec<DataKey>,
        reply: RpcReplyPort<Partitioned<V>>,
    },

    /// Ticket for a key, possibly pending.
    GetTicket {
        key: DataKey,
        reply: RpcReplyPort<Ticket<V>>,
    },

    /// Tickets for several keys, each paired with its key.
    GetTicketMany {
        keys: Vec<DataKey>,
        reply: RpcReplyPort<Vec<(DataKey, Ticket<V>)>>,
    },

    /// Store counters.
    GetStats { reply: RpcReplyPort<StoreStats> },
}

impl<V> fmt::Debug for StoreMessage<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Put { key, .. } => f.debug_struct("Put").field("key", key).finish(),
            Self::PutMany { entries } => {
                f.debug_struct("PutMany").field("len", &entries.len()).finish()
            }
            Self::Reject { key, error } => f
                .debug_struct("Reject")
                .field("key", key)
                .field("error", error)
                .finish(),
            Self::Loaded { key, .. } => f.debug_struct("Loaded").field("key", key).finish(),
            Self::Add { .. } => f.write_str("Add"),
            Self::AddMany { values, .. } => {
                f.debug_struct("AddMany").field("len", &values.len()).finish()
            }
            Self::Get { key, .. } => f.debug_struct("Get").field("key", key).finish(),
            Self::GetMany { keys, .. } => f.debug_struct("GetMany").field("keys", keys).finish(),
            Self::GetTicket { key, .. } => f.debug_struct("GetTicket").field("key", key).finish(),
            Self::GetTicketMany { keys, .. } => {
                f.debug_struct("GetTicketMany").field("keys", keys).finish()
            }
            Self::GetStats { .. } => f.write_str("GetStats"),
        }
    }
}

/// The store actor definition.
pub struct StoreActorDef<V> {
    _value: PhantomData<fn() -> V>,
}

impl<V> StoreActorDef<V> {
    /// Create the actor definition.
    pub const fn new() -> Self {
        Self {
            _value: PhantomData,
        }
    }
}

impl<V> Default for StoreActorDef<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments passed to the actor on startup.
pub struct StoreArguments<V> {
    /// Optional loader for keys requested before they are put.
    pub loader: Option<Arc<dyn Loader<V>>>,
    /// Store settings.
    pub config: StoreConfig,
}

impl<V> Default for StoreArguments<V> {
    fn default() -> Self {
        Self {
            loader: None,
            config: StoreConfig::default(),
        }
    }
}

impl<V> StoreArguments<V> {
    /// Create new arguments with no loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the loader.
    #[must_use]
    pub fn with_loader(mut self, loader: impl Loader<V>) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Set the store settings.
    #[must_use]
    pub const fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }
}

/// Actor state.
pub struct StoreState<V> {
    store: DeferredStore<V>,
    loader: Option<Arc<dyn Loader<V>>>,
    loads: u64,
}

impl<V> Actor for StoreActorDef<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Msg = StoreMessage<V>;
    type State = StoreState<V>;
    type Arguments = StoreArguments<V>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> std::result::Result<Self::State, ActorProcessingErr> {
        info!(
            retain_resolved = args.config.retain_resolved,
            has_loader = args.loader.is_some(),
            "StoreActor starting"
        );
        Ok(StoreState {
            store: DeferredStore::new(&args.config),
            loader: args.loader,
            loads: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        match message {
            StoreMessage::Put { key, value } => {
                let waiters = state.store.put(key, value);
                debug!(key = %key, waiters, "Put");
            }

            StoreMessage::PutMany { entries } => {
                for (key, value) in entries {
                    state.store.put(key, value);
                }
            }

            StoreMessage::Reject { key, error } => {
                let waiters = state.store.reject(key, error);
                debug!(key = %key, waiters, "Rejected pending ticket");
            }

            StoreMessage::Loaded { key, outcome } => {
                let waiters = state.store.resolve_loaded(key, outcome);
                debug!(key = %key, waiters, "Load settled");
            }

            StoreMessage::Add { value, reply } => {
                let key = state.store.add(value);
                // Ignore send error - caller may have timed out
                let _ = reply.send(key);
            }

            StoreMessage::AddMany { values, reply } => {
                let keys = values
                    .into_iter()
                    .map(|value| state.store.add(value))
                    .collect();
                let _ = reply.send(keys);
            }

            StoreMessage::Get { key, reply } => {
                let _ = reply.send(state.store.get(&key));
            }

            StoreMessage::GetMany { keys, reply } => {
                let _ = reply.send(state.store.get_many(keys));
            }

            StoreMessage::GetTicket { key, reply } => {
                let ticket = Self::issue_ticket(&myself, state, key);
                let _ = reply.send(ticket);
            }

            StoreMessage::GetTicketMany { keys, reply } => {
                let tickets = keys
                    .into_iter()
                    .map(|key| (key, Self::issue_ticket(&myself, state, key)))
                    .collect();
                let _ = reply.send(tickets);
            }

            StoreMessage::GetStats { reply } => {
                let _ = reply.send(StoreStats {
                    entries: state.store.len(),
                    pending: state.store.pending_len(),
                    loads: state.loads,
                });
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        info!(
            entries = state.store.len(),
            pending = state.store.pending_len(),
            "StoreActor stopping"
        );
        Ok(())
    }
}

impl<V> StoreActorDef<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Issue a ticket, triggering the loader when a new slot opens.
    fn issue_ticket(
        myself: &ActorRef<StoreMessage<V>>,
        state: &mut StoreState<V>,
        key: DataKey,
    ) -> Ticket<V> {
        match state.store.get_ticket(key) {
            TicketRequest::Opened(ticket) => {
                if let Some(loader) = &state.loader {
                    state.loads = state.loads.saturating_add(1);
                    debug!(key = %key, "Triggering load");
                    loader
                        .load(key)
                        .pipe_to(myself, move |outcome| StoreMessage::Loaded { key, outcome });
                }
                ticket
            }
            TicketRequest::Settled(ticket) | TicketRequest::Joined(ticket) => ticket,
        }
    }
}

/// Spawn a store actor.
///
/// # Errors
///
/// Returns `Error::ActorUnavailable` if the actor fails to start.
pub async fn spawn_store<V>(
    name: Option<String>,
    args: StoreArguments<V>,
) -> Result<ActorRef<StoreMessage<V>>>
where
    V: Clone + Send + Sync + 'static,
{
    let label = name.clone().unwrap_or_else(|| "store".to_string());
    Actor::spawn(name, StoreActorDef::new(), args)
        .await
        .map(|(actor, _handle)| actor)
        .map_err(|e| Error::actor_unavailable(format!("{label}: {e}")))
}
