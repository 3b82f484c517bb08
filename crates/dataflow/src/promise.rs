//! Promise layer: single-assignment futures with chained continuations.
//!
//! A `Promise` is lazy. Building one, mapping it or attaching continuations
//! runs nothing; the chain executes only once it is compelled (spawned onto
//! the runtime), piped into an actor, or awaited. Promises are `#[must_use]`
//! so a chain that is built and forgotten shows up as a warning.
//!
//! # Example
//!
//! ```ignore
//! let promise = Promise::<u32>::new(|resolve, _reject| {
//!     let _ = resolve.resolve(21);
//! })
//! .map(|v| v * 2);
//!
//! assert_eq!(promise.await, Ok(42));
//! ```

use std::fmt;
use std::future::{Future, IntoFuture};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use ractor::rpc::CallResult;
use ractor::{ActorRef, Message, RpcReplyPort};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use flowmesh_core::{Done, Error, Fault};

type Slot<T, E> = Arc<Mutex<Option<oneshot::Sender<Result<T, E>>>>>;

fn settle<T, E>(slot: &Slot<T, E>, outcome: Result<T, E>) -> flowmesh_core::Result<()> {
    let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    match sender {
        Some(tx) => {
            // A dropped receiver means nobody awaits the chain any more; the
            // promise is still settled.
            let _ = tx.send(outcome);
            Ok(())
        }
        None => Err(Error::AlreadySettled),
    }
}

/// Settles a promise successfully.
pub struct Resolver<T, E> {
    slot: Slot<T, E>,
}

impl<T, E> Resolver<T, E> {
    /// Resolve with `value`.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadySettled` if the promise was already resolved or
    /// rejected.
    pub fn resolve(&self, value: T) -> flowmesh_core::Result<()> {
        settle(&self.slot, Ok(value))
    }
}

/// Settles a promise with a failure.
pub struct Rejecter<T, E> {
    slot: Slot<T, E>,
}

impl<T, E> Rejecter<T, E> {
    /// Reject with `error`.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadySettled` if the promise was already resolved or
    /// rejected.
    pub fn reject(&self, error: E) -> flowmesh_core::Result<()> {
        settle(&self.slot, Err(error))
    }
}

/// A lazily evaluated, single-assignment asynchronous result.
#[must_use = "promises do nothing unless compelled, piped or awaited"]
pub struct Promise<T, E = Error> {
    inner: BoxFuture<'static, Result<T, E>>,
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").finish_non_exhaustive()
    }
}

impl<T, E> Promise<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Build a promise from an initializer given a resolver and a rejecter.
    ///
    /// The initializer runs when the promise is first polled. If both handles
    /// are dropped without settling, the promise fails with `Error::Abandoned`.
    pub fn new<F>(init: F) -> Self
    where
        F: FnOnce(Resolver<T, E>, Rejecter<T, E>) + Send + 'static,
        E: From<Error>,
    {
        Self::from_future(async move {
            let (tx, rx) = oneshot::channel();
            let slot: Slot<T, E> = Arc::new(Mutex::new(Some(tx)));
            init(
                Resolver {
                    slot: Arc::clone(&slot),
                },
                Rejecter { slot },
            );
            rx.await.unwrap_or_else(|_| Err(E::from(Error::Abandoned)))
        })
    }

    /// Wrap an existing future.
    pub fn from_future(fut: impl Future<Output = Result<T, E>> + Send + 'static) -> Self {
        Self { inner: fut.boxed() }
    }

    /// An already resolved promise.
    pub fn resolved(value: T) -> Self {
        Self::from_future(future::ready(Ok(value)))
    }

    /// An already rejected promise.
    pub fn rejected(error: E) -> Self {
        Self::from_future(future::ready(Err(error)))
    }

    /// Transform the resolved value.
    pub fn map<U, F>(self, f: F) -> Promise<U, E>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Promise::from_future(self.inner.map(|outcome| outcome.map(f)))
    }

    /// Transform the rejection.
    pub fn map_err<E2, F>(self, f: F) -> Promise<T, E2>
    where
        E2: Send + 'static,
        F: FnOnce(E) -> E2 + Send + 'static,
    {
        Promise::from_future(self.inner.map(|outcome| outcome.map_err(f)))
    }

    /// Transform the resolved value with a fallible function.
    pub fn try_map<U, F>(self, f: F) -> Promise<U, E>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        Promise::from_future(self.inner.map(|outcome| outcome.and_then(f)))
    }

    /// Chain another promise after this one resolves.
    pub fn then<U, F>(self, f: F) -> Promise<U, E>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Promise<U, E> + Send + 'static,
    {
        Promise::from_future(async move {
            let value = self.inner.await?;
            f(value).inner.await
        })
    }

    /// Observe a rejection without consuming it.
    pub fn on_error<F>(self, f: F) -> Self
    where
        F: FnOnce(&E) + Send + 'static,
    {
        Self::from_future(self.inner.map(|outcome| {
            if let Err(ref e) = outcome {
                f(e);
            }
            outcome
        }))
    }

    /// Replace a rejection with another promise.
    pub fn recover<F>(self, f: F) -> Self
    where
        F: FnOnce(E) -> Self + Send + 'static,
    {
        Self::from_future(async move {
            match self.inner.await {
                Ok(value) => Ok(value),
                Err(e) => f(e).inner.await,
            }
        })
    }

    /// Terminal activation: drive the chain to completion on the runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn compel(self) -> JoinHandle<Result<T, E>> {
        tokio::spawn(self.inner)
    }

    /// Compel the chain and deliver its settlement to `actor` as a message.
    ///
    /// This is how continuations re-enter an actor: the work runs off the
    /// actor, and the result is processed by the actor's own mailbox.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn pipe_to<M, F>(self, actor: &ActorRef<M>, wrap: F) -> JoinHandle<()>
    where
        M: Message,
        F: FnOnce(Result<T, E>) -> M + Send + 'static,
    {
        let actor = actor.clone();
        tokio::spawn(async move {
            let outcome = self.inner.await;
            if actor.send_message(wrap(outcome)).is_err() {
                debug!(actor = %actor.get_id(), "Pipe target stopped before the promise settled");
            }
        })
    }
}

impl<T, E> Promise<T, E>
where
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    /// Collapse any failure into a single `FAILEDEXECUTION` fault.
    pub fn into_fault(self) -> Promise<T, Fault> {
        self.map_err(|e| Fault::failed_execution(e.to_string()))
    }
}

impl<T, E> IntoFuture for Promise<T, E> {
    type Output = Result<T, E>;
    type IntoFuture = BoxFuture<'static, Result<T, E>>;

    fn into_future(self) -> Self::IntoFuture {
        self.inner
    }
}

/// Send a request to `actor` and resolve with its reply.
///
/// `timeout` is the caller's choice; actors themselves never time out.
pub fn request<M, T, F>(actor: &ActorRef<M>, build: F, timeout: Option<Duration>) -> Promise<T>
where
    M: Message,
    T: Send + 'static,
    F: FnOnce(RpcReplyPort<T>) -> M + Send + 'static,
{
    let actor = actor.clone();
    Promise::from_future(async move {
        match actor.call(build, timeout).await {
            Ok(CallResult::Success(value)) => Ok(value),
            Ok(CallResult::Timeout) => Err(Error::Timeout(timeout.unwrap_or_default())),
            Ok(CallResult::SenderError) | Err(_) => Err(Error::actor_unavailable(actor.get_id())),
        }
    })
}

/// The trivial resolved `Done` promise, used to start chains.
pub fn done<E: Send + 'static>() -> Promise<Done, E> {
    Promise::resolved(Done)
}

/// Resolve with every result, in input order, or reject on the first failure.
pub fn all<T, E, I>(promises: I) -> Promise<Vec<T>, E>
where
    T: Send + 'static,
    E: Send + 'static,
    I: IntoIterator<Item = Promise<T, E>>,
{
    let inner: Vec<_> = promises.into_iter().map(|p| p.inner).collect();
    Promise::from_future(future::try_join_all(inner))
}

/// Run `Done`-producing promises strictly one after another.
///
/// Each promise starts only after the previous one resolved; the first
/// rejection stops the sequence.
pub fn sequentially<E, I>(promises: I) -> Promise<Done, E>
where
    E: Send + 'static,
    I: IntoIterator<Item = Promise<Done, E>>,
    I::IntoIter: Send + 'static,
{
    let promises = promises.into_iter();
    Promise::from_future(async move {
        for promise in promises {
            promise.inner.await?;
        }
        Ok(Done)
    })
}
