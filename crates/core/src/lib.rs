//! # flowmesh-core
//!
//! Shared vocabulary for flowmesh: errors, wire outcomes, tagged payloads and
//! configuration.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod config;
pub mod error;
pub mod outcome;
pub mod payload;
pub mod result;

pub use config::{EngineConfig, FlowConfig, StoreConfig};
pub use error::{Error, ErrorKind};
pub use outcome::{Done, Fault, Outcome};
pub use payload::{FromPayload, IntoPayload, Json, Payload, PayloadKind};
pub use result::{Result, ResultExt};
