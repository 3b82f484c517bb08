//! # flowmesh-dataflow
//!
//! The data-moving half of flowmesh:
//!
//! - [`promise`]: lazy single-assignment promises and their combinators
//! - [`store`]: the deferred store, its tickets and its actor
//! - [`fabric`]: push publish/subscribe between actors
//! - [`stages`]: Filter, Reducer and Zipper running inside stage actors
//! - [`acquirer`]: the producer at the head of a pipeline

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod acquirer;
pub mod data;
pub mod elite;
pub mod fabric;
pub mod promise;
pub mod recipient;
pub mod stages;
pub mod store;

pub use acquirer::{AcquirerActor, AcquirerMessage, spawn_acquirer};
pub use data::{Data, StoredRef};
pub use elite::EliteSet;
pub use fabric::{DataPush, DataReceiver, DataSender, SubscriptionControl, UpstreamLink};
pub use promise::{Promise, Rejecter, Resolver, all, done, request, sequentially};
pub use recipient::Recipient;
pub use stages::{
    StageActor, StageLogic, StageMessage, StageWiring, connect, connect_left, connect_right,
    outputs_of, spawn_stage,
};
pub use store::{
    DataKey, DeferredStore, Loader, Lookup, Partitioned, StoreActorDef, StoreArguments,
    StoreClient, StoreMessage, StoreStats, Ticket, TicketState, spawn_store,
};
