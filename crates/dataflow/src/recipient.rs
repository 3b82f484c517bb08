//! Typed handles to actors that accept a particular message.
//!
//! Pipeline stages, controllers and producers all have their own message
//! enums. A `Recipient<T>` hides that: it is an actor id plus a delivery
//! function that converts `T` into the actor's message type.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ractor::{ActorId, ActorRef, Message};

use flowmesh_core::{Error, Result};

type Deliver<T> = Arc<dyn Fn(T) -> Result<()> + Send + Sync>;

/// A cloneable handle that can deliver `T` to one actor.
pub struct Recipient<T> {
    id: ActorId,
    deliver: Deliver<T>,
}

impl<T: Send + 'static> Recipient<T> {
    /// Deliver `T` to an actor whose message type converts from it.
    pub fn from_actor<M>(actor: &ActorRef<M>) -> Self
    where
        M: Message + From<T>,
    {
        Self::mapped(actor, <M as From<T>>::from)
    }

    /// Deliver `T` to an actor through an explicit conversion.
    pub fn mapped<M, F>(actor: &ActorRef<M>, convert: F) -> Self
    where
        M: Message,
        F: Fn(T) -> M + Send + Sync + 'static,
    {
        let actor = actor.clone();
        let id = actor.get_id();
        Self {
            id,
            deliver: Arc::new(move |value| {
                actor
                    .send_message(convert(value))
                    .map_err(|_| Error::actor_unavailable(id))
            }),
        }
    }

    /// Build a recipient from a raw delivery function.
    pub fn from_fn<F>(id: ActorId, deliver: F) -> Self
    where
        F: Fn(T) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            id,
            deliver: Arc::new(deliver),
        }
    }
}

impl<T> Recipient<T> {
    /// The id of the actor behind this handle.
    pub const fn id(&self) -> ActorId {
        self.id
    }

    /// Deliver a value.
    ///
    /// # Errors
    ///
    /// Returns `Error::ActorUnavailable` if the actor has stopped.
    pub fn send(&self, value: T) -> Result<()> {
        (self.deliver)(value)
    }
}

impl<T> Clone for Recipient<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            deliver: Arc::clone(&self.deliver),
        }
    }
}

impl<T> fmt::Debug for Recipient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipient").field("id", &self.id).finish()
    }
}

impl<T> PartialEq for Recipient<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Recipient<T> {}

impl<T> Hash for Recipient<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
