//! Promise-returning access to a store actor.

use std::time::Duration;

use ractor::ActorRef;

use flowmesh_core::{Error, Result};

use super::{DataKey, Lookup, Partitioned, StoreMessage, StoreStats, Ticket};
use crate::promise::{Promise, request};

/// Client for a `StoreActorDef`.
pub struct StoreClient<V> {
    store: ActorRef<StoreMessage<V>>,
    timeout: Option<Duration>,
}

impl<V> Clone for StoreClient<V> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            timeout: self.timeout,
        }
    }
}

impl<V> StoreClient<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Wrap a store actor reference.
    pub const fn new(store: ActorRef<StoreMessage<V>>) -> Self {
        Self {
            store,
            timeout: None,
        }
    }

    /// Apply a timeout to every request.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The underlying actor.
    pub const fn actor(&self) -> &ActorRef<StoreMessage<V>> {
        &self.store
    }

    /// Store `value` under a fresh key.
    pub fn add(&self, value: V) -> Promise<DataKey> {
        request(&self.store, |reply| StoreMessage::Add { value, reply }, self.timeout)
    }

    /// Store several values; keys come back in input order.
    pub fn add_many(&self, values: Vec<V>) -> Promise<Vec<DataKey>> {
        request(
            &self.store,
            |reply| StoreMessage::AddMany { values, reply },
            self.timeout,
        )
    }

    /// Immediate lookup.
    pub fn get(&self, key: DataKey) -> Promise<Lookup<V>> {
        request(&self.store, move |reply| StoreMessage::Get { key, reply }, self.timeout)
    }

    /// Immediate bulk lookup.
    pub fn get_many(&self, keys: Vec<DataKey>) -> Promise<Partitioned<V>> {
        request(
            &self.store,
            |reply| StoreMessage::GetMany { keys, reply },
            self.timeout,
        )
    }

    /// Ticket for `key`.
    pub fn ticket(&self, key: DataKey) -> Promise<Ticket<V>> {
        request(
            &self.store,
            move |reply| StoreMessage::GetTicket { key, reply },
            self.timeout,
        )
    }

    /// Tickets for several keys.
    pub fn tickets(&self, keys: Vec<DataKey>) -> Promise<Vec<(DataKey, Ticket<V>)>> {
        request(
            &self.store,
            |reply| StoreMessage::GetTicketMany { keys, reply },
            self.timeout,
        )
    }

    /// The value behind `key`, waiting for it if it is still pending.
    pub fn fetch(&self, key: DataKey) -> Promise<V> {
        self.ticket(key).then(Ticket::into_promise)
    }

    /// Store counters.
    pub fn stats(&self) -> Promise<StoreStats> {
        request(&self.store, |reply| StoreMessage::GetStats { reply }, self.timeout)
    }

    /// Upsert a value.
    ///
    /// # Errors
    ///
    /// Returns `Error::ActorUnavailable` if the store has stopped.
    pub fn put(&self, key: DataKey, value: V) -> Result<()> {
        self.cast(StoreMessage::Put { key, value })
    }

    /// Upsert several values.
    ///
    /// # Errors
    ///
    /// Returns `Error::ActorUnavailable` if the store has stopped.
    pub fn put_many(&self, entries: Vec<(DataKey, V)>) -> Result<()> {
        self.cast(StoreMessage::PutMany { entries })
    }

    /// Settle a pending ticket with a failure.
    ///
    /// # Errors
    ///
    /// Returns `Error::ActorUnavailable` if the store has stopped.
    pub fn reject(&self, key: DataKey, error: Error) -> Result<()> {
        self.cast(StoreMessage::Reject { key, error })
    }

    fn cast(&self, message: StoreMessage<V>) -> Result<()> {
        self.store
            .send_message(message)
            .map_err(|_| Error::actor_unavailable(self.store.get_id()))
    }
}
