//! Deferred store: keyed values with ticket-based, deduplicated resolution.
//!
//! `DeferredStore` is the actor-local data structure; `StoreActorDef` wraps it
//! in a ractor actor and `StoreClient` gives callers promise-returning access.
//!
//! # Ticket lifecycle
//!
//! ```text
//! GetTicket(k), k present   -> settled ticket
//! GetTicket(k), k absent    -> open slot (load triggered once), pending ticket
//! GetTicket(k), slot open   -> pending ticket sharing the slot
//! Put(k, v) / Loaded(k, v)  -> slot settled, removed; waiters see v
//! Reject(k, e)              -> slot settled with e, removed
//! ```

mod actor;
mod client;
mod ticket;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use either::Either;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;
use ulid::Ulid;

use flowmesh_core::{Error, Result, ResultExt, StoreConfig};

pub use actor::{
    Loader, StoreActorDef, StoreArguments, StoreMessage, StoreState, StoreStats, spawn_store,
};
pub use client::StoreClient;
pub use ticket::{Ticket, TicketState};

use ticket::TicketSlot;

/// Key of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataKey(Ulid);

impl DataKey {
    /// Allocate a fresh, globally unique key.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for DataKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DataKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::unexpected_content("data key", e.to_string()))
    }
}

/// Result of an immediate lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    Found(V),
    NotFound(DataKey),
}

impl<V> Lookup<V> {
    /// Convert to a `Result`, mapping `NotFound` to `Error::NotFound`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for a missing key.
    pub fn into_result(self) -> Result<V> {
        match self {
            Self::Found(value) => Ok(value),
            Self::NotFound(key) => Err(Error::not_found(key)),
        }
    }
}

/// Result of a bulk lookup; every value stays paired with its key.
#[derive(Debug, Clone, PartialEq)]
pub struct Partitioned<V> {
    pub found: Vec<(DataKey, V)>,
    pub missing: Vec<DataKey>,
}

/// How a ticket request was served.
#[derive(Debug)]
pub enum TicketRequest<V> {
    /// The key was present; the ticket is already settled.
    Settled(Ticket<V>),
    /// A slot was already open; the ticket shares it.
    Joined(Ticket<V>),
    /// A new slot was opened; the caller should trigger the load.
    Opened(Ticket<V>),
}

impl<V> TicketRequest<V> {
    /// The ticket, however it was obtained.
    pub fn into_ticket(self) -> Ticket<V> {
        match self {
            Self::Settled(t) | Self::Joined(t) | Self::Opened(t) => t,
        }
    }
}

/// Keyed store with pending tickets.
pub struct DeferredStore<V> {
    entries: HashMap<DataKey, V>,
    pending: HashMap<DataKey, TicketSlot<V>>,
    retain_resolved: bool,
}

impl<V: Clone + Send + Sync + 'static> DeferredStore<V> {
    /// Create an empty store.
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            entries: HashMap::new(),
            pending: HashMap::new(),
            retain_resolved: config.retain_resolved,
        }
    }

    /// Store `value` under a freshly allocated key.
    pub fn add(&mut self, value: V) -> DataKey {
        let key = DataKey::new();
        self.put(key, value);
        key
    }

    /// Immediate lookup.
    pub fn get(&self, key: &DataKey) -> Lookup<V> {
        self.entries
            .get(key)
            .map_or(Lookup::NotFound(*key), |value| Lookup::Found(value.clone()))
    }

    /// Immediate bulk lookup.
    pub fn get_many<I: IntoIterator<Item = DataKey>>(&self, keys: I) -> Partitioned<V> {
        let (found, missing) = keys
            .into_iter()
            .partition_map(|key| match self.entries.get(&key) {
                Some(value) => Either::Left((key, value.clone())),
                None => Either::Right(key),
            });
        Partitioned { found, missing }
    }

    /// Ticket for `key`, opening a shared slot if the value is not present.
    pub fn get_ticket(&mut self, key: DataKey) -> TicketRequest<V> {
        if let Some(value) = self.entries.get(&key) {
            return TicketRequest::Settled(Ticket::settled(key, Ok(value.clone())));
        }
        if let Some(slot) = self.pending.get_mut(&key) {
            return TicketRequest::Joined(slot.ticket());
        }
        let mut slot = TicketSlot::open(key);
        let ticket = slot.ticket();
        self.pending.insert(key, slot);
        debug!(key = %key, "Opened ticket slot");
        TicketRequest::Opened(ticket)
    }

    /// Upsert `value`, settling any pending ticket for `key`.
    ///
    /// Returns the number of tickets that were waiting.
    pub fn put(&mut self, key: DataKey, value: V) -> usize {
        let waiters = self.settle(key, Ok(value.clone()));
        self.entries.insert(key, value);
        waiters
    }

    /// Settle a pending ticket with a value produced by a loader.
    ///
    /// The value is cached only when `retain_resolved` is set; a failure is
    /// never cached, so a later request triggers a fresh load. A load that
    /// settles after the slot was closed by `put` or `reject` is dropped.
    pub fn resolve_loaded(&mut self, key: DataKey, outcome: Result<V>) -> usize {
        if !self.pending.contains_key(&key) {
            debug!(key = %key, ok = outcome.is_ok(), "Dropping load for an already settled key");
            return 0;
        }
        match outcome {
            Ok(value) if self.retain_resolved => self.put(key, value),
            other => self.settle(key, other),
        }
    }

    /// Settle a pending ticket with a failure.
    ///
    /// Returns the number of tickets that were waiting.
    pub fn reject(&mut self, key: DataKey, error: Error) -> usize {
        self.settle(key, Err(error))
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of open ticket slots.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn settle(&mut self, key: DataKey, outcome: Result<V>) -> usize {
        self.pending.remove(&key).map_or(0, |slot| {
            slot.settle(outcome).swallow_logged("settling ticket slot");
            slot.waiters()
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;

    fn store() -> DeferredStore<String> {
        DeferredStore::new(&StoreConfig::default())
    }

    #[test]
    fn should_find_added_values() {
        let mut store = store();
        let key = store.add("alpha".to_string());
        assert_eq!(store.get(&key), Lookup::Found("alpha".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn should_report_unknown_keys_as_not_found() {
        let store = store();
        let key = DataKey::new();
        assert_eq!(store.get(&key), Lookup::NotFound(key));
        assert_eq!(store.get(&key).into_result(), Err(Error::not_found(key)));
    }

    #[test]
    fn should_overwrite_on_put() {
        let mut store = store();
        let key = store.add("old".to_string());
        store.put(key, "new".to_string());
        assert_eq!(store.get(&key), Lookup::Found("new".to_string()));
    }

    #[test]
    fn should_partition_bulk_lookups_by_key() {
        let mut store = store();
        let a = store.add("a".to_string());
        let b = store.add("b".to_string());
        let missing = DataKey::new();

        let result = store.get_many([b, missing, a]);
        assert_eq!(
            result.found,
            vec![(b, "b".to_string()), (a, "a".to_string())]
        );
        assert_eq!(result.missing, vec![missing]);
    }

    #[test]
    fn should_issue_settled_ticket_for_present_key() {
        let mut store = store();
        let key = store.add("ready".to_string());
        match store.get_ticket(key) {
            TicketRequest::Settled(ticket) => {
                assert_eq!(ticket.peek(), TicketState::Resolved("ready".to_string()));
            }
            other => panic!("expected settled ticket, got {other:?}"),
        }
    }

    #[test]
    fn should_share_one_slot_between_concurrent_requests() {
        let mut store = store();
        let key = DataKey::new();

        assert!(matches!(store.get_ticket(key), TicketRequest::Opened(_)));
        assert!(matches!(store.get_ticket(key), TicketRequest::Joined(_)));
        assert!(matches!(store.get_ticket(key), TicketRequest::Joined(_)));
        assert_eq!(store.pending_len(), 1);
    }

    #[tokio::test]
    async fn should_settle_pending_tickets_on_put() {
        let mut store = store();
        let key = DataKey::new();
        let first = store.get_ticket(key).into_ticket();
        let second = store.get_ticket(key).into_ticket();

        assert_eq!(store.put(key, "late".to_string()), 2);
        assert_eq!(store.pending_len(), 0);
        assert_eq!(first.wait().await, Ok("late".to_string()));
        assert_eq!(second.wait().await, Ok("late".to_string()));
    }

    #[tokio::test]
    async fn should_not_cache_failed_loads() {
        let mut store = store();
        let key = DataKey::new();
        let ticket = store.get_ticket(key).into_ticket();

        store.resolve_loaded(key, Err(Error::failed_execution("disk")));
        assert_eq!(ticket.wait().await, Err(Error::failed_execution("disk")));
        assert!(matches!(store.get_ticket(key), TicketRequest::Opened(_)));
    }

    #[tokio::test]
    async fn should_drop_loaded_values_when_not_retaining() {
        let mut store = DeferredStore::new(&StoreConfig {
            retain_resolved: false,
        });
        let key = DataKey::new();
        let ticket = store.get_ticket(key).into_ticket();

        store.resolve_loaded(key, Ok("transient".to_string()));
        assert_eq!(ticket.wait().await, Ok("transient".to_string()));
        assert_eq!(store.get(&key), Lookup::NotFound(key));
    }

    #[tokio::test]
    async fn should_cache_loaded_values_when_retaining() {
        let mut store = store();
        let key = DataKey::new();
        let _ticket = store.get_ticket(key).into_ticket();

        store.resolve_loaded(key, Ok("cached".to_string()));
        assert_eq!(store.get(&key), Lookup::Found("cached".to_string()));
    }

    #[tokio::test]
    async fn should_keep_put_value_when_load_settles_afterwards() {
        let mut store = store();
        let key = DataKey::new();
        let ticket = store.get_ticket(key).into_ticket();

        store.put(key, "fresh".to_string());
        assert_eq!(store.resolve_loaded(key, Ok("stale".to_string())), 0);

        assert_eq!(ticket.wait().await, Ok("fresh".to_string()));
        assert_eq!(store.get(&key), Lookup::Found("fresh".to_string()));
    }

    #[tokio::test]
    async fn should_not_cache_load_that_settles_after_reject() {
        let mut store = store();
        let key = DataKey::new();
        let ticket = store.get_ticket(key).into_ticket();

        assert_eq!(store.reject(key, Error::failed_execution("source offline")), 1);
        assert_eq!(store.resolve_loaded(key, Ok("late".to_string())), 0);

        assert_eq!(ticket.wait().await, Err(Error::failed_execution("source offline")));
        assert_eq!(store.get(&key), Lookup::NotFound(key));
    }

    #[test]
    fn should_ignore_reject_without_pending_slot() {
        let mut store = store();
        let key = store.add("kept".to_string());

        assert_eq!(store.reject(key, Error::failed_execution("ignored")), 0);
        assert_eq!(store.get(&key), Lookup::Found("kept".to_string()));
        assert_eq!(store.pending_len(), 0);
    }

    #[test]
    fn should_parse_keys_from_display() {
        let key = DataKey::new();
        let parsed: DataKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
        assert!("not-a-key".parse::<DataKey>().is_err());
    }
}
