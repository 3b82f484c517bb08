//! # flowmesh-engine
//!
//! The coordinating half of flowmesh:
//!
//! - [`capability`]: the `Capability` trait, behaviours and negotiation
//! - [`components`]: Queryable, Trainable, Evaluatable, Updatable and the
//!   hyperparameter components
//! - [`engine`]: the engine actor routing requests to its components
//! - [`controller`]: the controller actor negotiating with engines
//! - [`client`]: promise-returning access to an engine

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod capability;
pub mod client;
pub mod components;
pub mod controller;
pub mod engine;
pub mod messages;

pub use capability::{
    Behavior, Capability, ControllerCapability, EngineContext, Reply, negotiate,
};
pub use client::EngineClient;
pub use components::{
    DynamicHyperparameters, Evaluatable, Evaluator, OpenHyperparameters, QueryHandler, Queryable,
    TRAINING_STOPPED, Trainable, Trainer, Updatable, Updater,
};
pub use controller::{
    Assignment, ControllerActorDef, ControllerArguments, ControllerBehavior, ControllerMessage,
    spawn_controller,
};
pub use engine::{BEHAVIOR_PROPERTY, EngineActorDef, EngineArguments, spawn_engine};
pub use messages::{
    EngineEvent, EngineMessage, EngineRequest, HyperparameterMap, Inform, Response, UpdateMode,
};
