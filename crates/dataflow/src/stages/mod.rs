//! Pipeline stages: a receiver wired to a sender through stage logic.
//!
//! Every stage runs the same loop: unwrap the pushed input (through the
//! store when it is stored), hand it to the logic, wrap each output and
//! forward it to the current subscribers. Unwrapping stored inputs happens
//! off the actor and re-enters through `StageMessage::Unwrapped`; the
//! inbound queue keeps processing in arrival order regardless of which
//! fetch settles first.

pub mod filter;
pub mod reducer;
pub mod zipper;

pub use filter::Filter;
pub use reducer::Reducer;
pub use zipper::{Association, ByKey, Sequential, Zipper};

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use either::Either;
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, RpcReplyPort};
use tracing::{debug, info, warn};

use flowmesh_core::{Error, Result};

use crate::fabric::{DataPush, DataReceiver, DataSender, SubscriptionControl, UpstreamLink};
use crate::recipient::Recipient;

/// The transform a stage applies to each unwrapped input.
pub trait StageLogic<I, O>: Send + 'static {
    /// Name used in logs and wiring reports.
    fn name(&self) -> &str;

    /// Consume one input, returning zero or more outputs.
    fn process(&mut self, input: I) -> Vec<O>;
}

/// Wiring snapshot of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWiring {
    pub logic: String,
    pub subscribers: Vec<ActorId>,
    pub upstreams: Vec<ActorId>,
}

/// Messages for a stage actor.
pub enum StageMessage<I, O> {
    /// Data pushed by an upstream sender.
    Push(DataPush<I>),

    /// Subscription management for this stage's outputs.
    Control(SubscriptionControl<O>),

    /// Subscribe to an upstream sender and remember the registration.
    Connect(UpstreamLink),

    /// Release the registration with one upstream sender.
    Disconnect(ActorId),

    /// A stored input finished unwrapping (internal re-entry).
    Unwrapped { seq: u64, outcome: Result<I> },

    /// Replace the logic, keeping subscribers and upstream registrations.
    SwapLogic(Box<dyn StageLogic<I, O>>),

    /// Report the current wiring.
    GetWiring { reply: RpcReplyPort<StageWiring> },
}

impl<I: 'static, O: 'static> fmt::Debug for StageMessage<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push(push) => f.debug_struct("Push").field("from", &push.from).finish(),
            Self::Control(control) => f.debug_tuple("Control").field(control).finish(),
            Self::Connect(link) => f.debug_tuple("Connect").field(link).finish(),
            Self::Disconnect(id) => f.debug_tuple("Disconnect").field(id).finish(),
            Self::Unwrapped { seq, outcome } => f
                .debug_struct("Unwrapped")
                .field("seq", seq)
                .field("ok", &outcome.is_ok())
                .finish(),
            Self::SwapLogic(logic) => f.debug_tuple("SwapLogic").field(&logic.name()).finish(),
            Self::GetWiring { .. } => f.write_str("GetWiring"),
        }
    }
}

impl<I, O> From<DataPush<I>> for StageMessage<I, O> {
    fn from(push: DataPush<I>) -> Self {
        Self::Push(push)
    }
}

impl<I, O> From<SubscriptionControl<O>> for StageMessage<I, O> {
    fn from(control: SubscriptionControl<O>) -> Self {
        Self::Control(control)
    }
}

/// Arrival-ordered inputs, some of which may still be unwrapping.
struct InboundQueue<I> {
    next_seq: u64,
    slots: BTreeMap<u64, Option<Result<I>>>,
}

impl<I> InboundQueue<I> {
    const fn new() -> Self {
        Self {
            next_seq: 0,
            slots: BTreeMap::new(),
        }
    }

    fn reserve(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.slots.insert(seq, None);
        seq
    }

    fn fill(&mut self, seq: u64, outcome: Result<I>) {
        if let Some(slot) = self.slots.get_mut(&seq) {
            *slot = Some(outcome);
        }
    }

    /// Pop the settled prefix of the queue.
    fn drain_ready(&mut self) -> Vec<Result<I>> {
        let mut ready = Vec::new();
        while let Some(entry) = self.slots.first_entry() {
            if entry.get().is_none() {
                break;
            }
            if let Some(outcome) = entry.remove() {
                ready.push(outcome);
            }
        }
        ready
    }

    fn waiting(&self) -> usize {
        self.slots.len()
    }
}

/// The stage actor definition.
pub struct StageActor<I, O> {
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O> StageActor<I, O> {
    pub const fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<I, O> Default for StageActor<I, O> {
    fn default() -> Self {
        Self::new()
    }
}

/// Actor state.
pub struct StageState<I, O> {
    logic: Box<dyn StageLogic<I, O>>,
    outbound: DataSender<O>,
    inbound: DataReceiver,
    queue: InboundQueue<I>,
}

impl<I, O> StageState<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    fn wiring(&self) -> StageWiring {
        StageWiring {
            logic: self.logic.name().to_string(),
            subscribers: self.outbound.subscriber_ids(),
            upstreams: self.inbound.sender_ids(),
        }
    }

    fn run_ready(&mut self, myself: ActorId) {
        for outcome in self.queue.drain_ready() {
            match outcome {
                Ok(input) => {
                    for output in self.logic.process(input) {
                        self.outbound.send_data(myself, output);
                    }
                }
                Err(e) => {
                    warn!(
                        stage = self.logic.name(),
                        error = %e,
                        "Dropping input that failed to unwrap"
                    );
                }
            }
        }
    }
}

impl<I, O> Actor for StageActor<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    type Msg = StageMessage<I, O>;
    type State = StageState<I, O>;
    type Arguments = Box<dyn StageLogic<I, O>>;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        logic: Self::Arguments,
    ) -> std::result::Result<Self::State, ActorProcessingErr> {
        info!(actor = %myself.get_id(), stage = logic.name(), "Stage starting");
        Ok(StageState {
            logic,
            outbound: DataSender::new(),
            inbound: DataReceiver::new(),
            queue: InboundQueue::new(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        match message {
            StageMessage::Push(DataPush { from, data }) => {
                let seq = state.queue.reserve();
                if data.is_inline() {
                    state.queue.fill(seq, data.get().await);
                } else {
                    debug!(stage = state.logic.name(), from = %from, seq, "Unwrapping input");
                    data.get()
                        .pipe_to(&myself, move |outcome| StageMessage::Unwrapped { seq, outcome });
                }
                state.run_ready(myself.get_id());
            }

            StageMessage::Unwrapped { seq, outcome } => {
                state.queue.fill(seq, outcome);
                state.run_ready(myself.get_id());
            }

            StageMessage::Control(control) => {
                state.outbound.handle_control(control);
            }

            StageMessage::Connect(link) => {
                let upstream = link.sender();
                match state.inbound.register(link) {
                    Ok(added) => debug!(upstream = %upstream, added, "Connected upstream"),
                    Err(e) => warn!(upstream = %upstream, error = %e, "Upstream unreachable"),
                }
            }

            StageMessage::Disconnect(sender) => {
                state.inbound.release(sender);
            }

            StageMessage::SwapLogic(logic) => {
                info!(
                    actor = %myself.get_id(),
                    from = state.logic.name(),
                    to = logic.name(),
                    subscribers = state.outbound.len(),
                    upstreams = state.inbound.len(),
                    "Swapping stage logic"
                );
                // Registries live beside the logic, so they carry over as-is.
                state.logic = logic;
            }

            StageMessage::GetWiring { reply } => {
                let _ = reply.send(state.wiring());
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        let released = state.inbound.unsubscribe_all();
        info!(
            actor = %myself.get_id(),
            stage = state.logic.name(),
            released,
            unprocessed = state.queue.waiting(),
            "Stage stopping"
        );
        Ok(())
    }
}

/// Spawn a stage running `logic`.
///
/// # Errors
///
/// Returns `Error::ActorUnavailable` if the actor fails to start.
pub async fn spawn_stage<I, O>(
    name: Option<String>,
    logic: impl StageLogic<I, O>,
) -> Result<(ActorRef<StageMessage<I, O>>, ractor::concurrency::JoinHandle<()>)>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    let label = name.clone().unwrap_or_else(|| logic.name().to_string());
    let logic: Box<dyn StageLogic<I, O>> = Box::new(logic);
    Actor::spawn(name, StageActor::new(), logic)
        .await
        .map_err(|e| Error::actor_unavailable(format!("{label}: {e}")))
}

/// Control handle for a stage's outputs, for wiring it as an upstream.
pub fn outputs_of<I, O>(stage: &ActorRef<StageMessage<I, O>>) -> Recipient<SubscriptionControl<O>>
where
    I: Send + 'static,
    O: Send + 'static,
{
    Recipient::from_actor(stage)
}

/// Make `downstream` subscribe to `upstream`.
///
/// The registration is owned by `downstream` and released when it stops.
///
/// # Errors
///
/// Returns `Error::ActorUnavailable` if `downstream` has stopped.
pub fn connect<I, O>(
    upstream: Recipient<SubscriptionControl<I>>,
    downstream: &ActorRef<StageMessage<I, O>>,
) -> Result<()>
where
    I: Send + 'static,
    O: Send + 'static,
{
    let link = UpstreamLink::new(upstream, Recipient::from_actor(downstream));
    send_link(downstream, link)
}

/// Wire `upstream` into the left side of a zipping stage.
///
/// # Errors
///
/// Returns `Error::ActorUnavailable` if `downstream` has stopped.
pub fn connect_left<L, R, O>(
    upstream: Recipient<SubscriptionControl<L>>,
    downstream: &ActorRef<StageMessage<Either<L, R>, O>>,
) -> Result<()>
where
    L: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    let inbound = Recipient::mapped(downstream, |push: DataPush<L>| {
        StageMessage::Push(push.map(Either::Left))
    });
    send_link(downstream, UpstreamLink::new(upstream, inbound))
}

/// Wire `upstream` into the right side of a zipping stage.
///
/// # Errors
///
/// Returns `Error::ActorUnavailable` if `downstream` has stopped.
pub fn connect_right<L, R, O>(
    upstream: Recipient<SubscriptionControl<R>>,
    downstream: &ActorRef<StageMessage<Either<L, R>, O>>,
) -> Result<()>
where
    L: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    let inbound = Recipient::mapped(downstream, |push: DataPush<R>| {
        StageMessage::Push(push.map(Either::Right))
    });
    send_link(downstream, UpstreamLink::new(upstream, inbound))
}

fn send_link<I, O>(stage: &ActorRef<StageMessage<I, O>>, link: UpstreamLink) -> Result<()>
where
    I: Send + 'static,
    O: Send + 'static,
{
    stage
        .send_message(StageMessage::Connect(link))
        .map_err(|_| Error::actor_unavailable(stage.get_id()))
}
