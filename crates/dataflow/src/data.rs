//! `Data<T>`: a value that is either carried inline or held by a store.
//!
//! Consumers never care which: `get()` returns a promise either way.

use std::fmt;
use std::sync::Arc;

use flowmesh_core::Error;

use crate::promise::Promise;
use crate::store::{DataKey, StoreClient};

type Fetch<T> = Arc<dyn Fn(DataKey) -> Promise<T> + Send + Sync>;

/// Reference to a value held by a deferred store.
pub struct StoredRef<T> {
    key: DataKey,
    fetch: Fetch<T>,
}

impl<T> StoredRef<T> {
    /// The store key.
    pub const fn key(&self) -> DataKey {
        self.key
    }

    /// Resolve the value through the store.
    pub fn fetch(&self) -> Promise<T> {
        (self.fetch)(self.key)
    }
}

impl<T> Clone for StoredRef<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            fetch: Arc::clone(&self.fetch),
        }
    }
}

/// A value that is inline or must be fetched from a store.
pub enum Data<T> {
    Inline(T),
    Stored(StoredRef<T>),
}

impl<T: Clone> Clone for Data<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Inline(value) => Self::Inline(value.clone()),
            Self::Stored(stored) => Self::Stored(stored.clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Data<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(value) => f.debug_tuple("Inline").field(value).finish(),
            Self::Stored(stored) => f.debug_tuple("Stored").field(&stored.key).finish(),
        }
    }
}

impl<T> Data<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Inline data.
    pub const fn inline(value: T) -> Self {
        Self::Inline(value)
    }

    /// Data held by the store behind `client` under `key`.
    pub fn stored(key: DataKey, client: StoreClient<T>) -> Self {
        Self::Stored(StoredRef {
            key,
            fetch: Arc::new(move |key| client.fetch(key)),
        })
    }

    /// Data fetched through an arbitrary function.
    pub fn deferred<F>(key: DataKey, fetch: F) -> Self
    where
        F: Fn(DataKey) -> Promise<T> + Send + Sync + 'static,
    {
        Self::Stored(StoredRef {
            key,
            fetch: Arc::new(fetch),
        })
    }

    /// Whether the value is carried inline.
    pub const fn is_inline(&self) -> bool {
        matches!(self, Self::Inline(_))
    }

    /// The store key, if the value is stored.
    pub const fn key(&self) -> Option<DataKey> {
        match self {
            Self::Inline(_) => None,
            Self::Stored(stored) => Some(stored.key),
        }
    }

    /// Resolve the value.
    pub fn get(&self) -> Promise<T, Error> {
        match self {
            Self::Inline(value) => Promise::resolved(value.clone()),
            Self::Stored(stored) => stored.fetch(),
        }
    }

    /// Transform the value, lazily for stored data.
    pub fn map<U, F>(self, f: F) -> Data<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        match self {
            Self::Inline(value) => Data::Inline(f(value)),
            Self::Stored(StoredRef { key, fetch }) => {
                let f = Arc::new(f);
                Data::deferred(key, move |key| {
                    let f = Arc::clone(&f);
                    fetch(key).map(move |value| f(value))
                })
            }
        }
    }
}
