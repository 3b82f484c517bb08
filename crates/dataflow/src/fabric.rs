//! Push dataflow fabric: subscriber sets and inbound registrations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  SubscribeForDataPush(me)  ┌──────────────┐
//! │  downstream  │ ─────────────────────────> │   upstream   │
//! │ DataReceiver │                            │  DataSender  │
//! │              │ <───────────────────────── │              │
//! └──────────────┘       DataPush<T>          └──────────────┘
//! ```
//!
//! Delivery reaches the subscribers present at send time; nothing is
//! replayed to later subscribers. Both registries are persistent maps, so
//! carrying them into a new behaviour is a cheap clone.

use std::fmt;
use std::sync::Arc;

use im::HashMap;
use ractor::ActorId;
use tracing::{debug, warn};

use flowmesh_core::{Result, ResultExt};

use crate::data::Data;
use crate::recipient::Recipient;

/// A pushed payload and the actor that pushed it.
pub struct DataPush<T> {
    pub from: ActorId,
    pub data: Data<T>,
}

impl<T: Clone> Clone for DataPush<T> {
    fn clone(&self) -> Self {
        Self {
            from: self.from,
            data: self.data.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DataPush<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPush")
            .field("from", &self.from)
            .field("data", &self.data)
            .finish()
    }
}

impl<T> DataPush<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Transform the carried data.
    pub fn map<U, F>(self, f: F) -> DataPush<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        DataPush {
            from: self.from,
            data: self.data.map(f),
        }
    }
}

/// Control messages a sender accepts.
pub enum SubscriptionControl<T> {
    SubscribeForDataPush(Recipient<DataPush<T>>),
    UnsubscribeForDataPush(ActorId),
}

impl<T> fmt::Debug for SubscriptionControl<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubscribeForDataPush(r) => {
                f.debug_tuple("SubscribeForDataPush").field(&r.id()).finish()
            }
            Self::UnsubscribeForDataPush(id) => {
                f.debug_tuple("UnsubscribeForDataPush").field(id).finish()
            }
        }
    }
}

/// Outbound side: the current subscriber set of a producer.
pub struct DataSender<T> {
    subscribers: HashMap<ActorId, Recipient<DataPush<T>>>,
}

impl<T> Clone for DataSender<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: self.subscribers.clone(),
        }
    }
}

impl<T> Default for DataSender<T> {
    fn default() -> Self {
        Self {
            subscribers: HashMap::new(),
        }
    }
}

impl<T> DataSender<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty sender.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns `false` if it was already subscribed.
    pub fn subscribe(&mut self, subscriber: Recipient<DataPush<T>>) -> bool {
        let id = subscriber.id();
        let added = self.subscribers.insert(id, subscriber).is_none();
        debug!(subscriber = %id, added, "Subscribe for data push");
        added
    }

    /// Remove a subscriber. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&mut self, subscriber: ActorId) -> bool {
        let removed = self.subscribers.remove(&subscriber).is_some();
        debug!(subscriber = %subscriber, removed, "Unsubscribe from data push");
        removed
    }

    /// Apply a control message.
    pub fn handle_control(&mut self, control: SubscriptionControl<T>) {
        match control {
            SubscriptionControl::SubscribeForDataPush(subscriber) => {
                self.subscribe(subscriber);
            }
            SubscriptionControl::UnsubscribeForDataPush(id) => {
                self.unsubscribe(id);
            }
        }
    }

    /// Wrap `payload` inline and push it. Returns how many subscribers got it.
    pub fn send_data(&self, from: ActorId, payload: T) -> usize {
        self.send(from, Data::inline(payload))
    }

    /// Push `data` to every current subscriber.
    pub fn send(&self, from: ActorId, data: Data<T>) -> usize {
        self.subscribers
            .values()
            .filter(|subscriber| {
                let push = DataPush {
                    from,
                    data: data.clone(),
                };
                subscriber
                    .send(push)
                    .inspect_error(|e| {
                        warn!(subscriber = %subscriber.id(), error = %e, "Dropped push");
                    })
                    .is_ok()
            })
            .count()
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Ids of the current subscribers.
    pub fn subscriber_ids(&self) -> Vec<ActorId> {
        self.subscribers.keys().copied().collect()
    }

    /// Whether `id` is subscribed.
    pub fn contains(&self, id: ActorId) -> bool {
        self.subscribers.contains_key(&id)
    }
}

type LinkControl = Arc<dyn Fn(bool) -> Result<()> + Send + Sync>;

/// A registration with one upstream sender, erased over its payload type.
#[derive(Clone)]
pub struct UpstreamLink {
    sender: ActorId,
    control: LinkControl,
}

impl fmt::Debug for UpstreamLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamLink").field("sender", &self.sender).finish()
    }
}

impl UpstreamLink {
    /// Link `downstream` to the sender behind `upstream`.
    pub fn new<T>(
        upstream: Recipient<SubscriptionControl<T>>,
        downstream: Recipient<DataPush<T>>,
    ) -> Self
    where
        T: Send + 'static,
    {
        let sender = upstream.id();
        Self {
            sender,
            control: Arc::new(move |subscribe| {
                let control = if subscribe {
                    SubscriptionControl::SubscribeForDataPush(downstream.clone())
                } else {
                    SubscriptionControl::UnsubscribeForDataPush(downstream.id())
                };
                upstream.send(control)
            }),
        }
    }

    /// The upstream sender.
    pub const fn sender(&self) -> ActorId {
        self.sender
    }

    fn subscribe(&self) -> Result<()> {
        (self.control)(true)
    }

    fn unsubscribe(&self) -> Result<()> {
        (self.control)(false)
    }
}

/// Inbound side: the senders this actor subscribed to.
#[derive(Clone, Default)]
pub struct DataReceiver {
    links: HashMap<ActorId, UpstreamLink>,
}

impl DataReceiver {
    /// Create an empty receiver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe through `link` and remember the registration.
    ///
    /// Returns `false` if the sender was already registered.
    ///
    /// # Errors
    ///
    /// Returns `Error::ActorUnavailable` if the sender has stopped.
    pub fn register(&mut self, link: UpstreamLink) -> Result<bool> {
        if self.links.contains_key(&link.sender) {
            return Ok(false);
        }
        link.subscribe()?;
        self.links.insert(link.sender, link);
        Ok(true)
    }

    /// Unsubscribe from one sender. Returns `false` if it was not registered.
    pub fn release(&mut self, sender: ActorId) -> bool {
        self.links.remove(&sender).is_some_and(|link| {
            link.unsubscribe().swallow_logged("releasing upstream link");
            true
        })
    }

    /// Release every inbound registration. Returns how many were released.
    pub fn unsubscribe_all(&mut self) -> usize {
        let links = std::mem::take(&mut self.links);
        for link in links.values() {
            link.unsubscribe().swallow_logged("releasing upstream link");
        }
        links.len()
    }

    /// Whether `sender` is registered.
    pub fn is_registered(&self, sender: ActorId) -> bool {
        self.links.contains_key(&sender)
    }

    /// Ids of the registered senders.
    pub fn sender_ids(&self) -> Vec<ActorId> {
        self.links.keys().copied().collect()
    }

    /// Number of registered senders.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
