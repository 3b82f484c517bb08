//! Updatable: applies batch or instance updates to engine state.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use flowmesh_core::{Done, Fault, FromPayload, Payload, Result};
use flowmesh_dataflow::Promise;

use crate::capability::{Capability, ControllerCapability, EngineContext, Reply};
use crate::messages::{EngineEvent, EngineRequest, Response, UpdateMode};

/// Typed update logic for one update mode.
pub trait Updater: Send + 'static {
    type Input: FromPayload;

    /// Which `Update` requests this updater accepts.
    const MODE: UpdateMode;

    /// Apply one update.
    fn update(&mut self, input: Self::Input) -> Promise<Done>;

    fn is_ready_for_update(&self) -> bool {
        true
    }
}

/// Component wrapping an [`Updater`].
pub struct Updatable<U> {
    updater: U,
    updating: Option<u64>,
    next_tag: u64,
}

impl<U: Updater> Updatable<U> {
    pub const fn new(updater: U) -> Self {
        Self {
            updater,
            updating: None,
            next_tag: 0,
        }
    }

    pub const fn is_updating(&self) -> bool {
        self.updating.is_some()
    }
}

impl<U: Updater> Capability for Updatable<U> {
    fn name(&self) -> &str {
        match U::MODE {
            UpdateMode::Batch => "updatable-batch",
            UpdateMode::Instance => "updatable-instance",
        }
    }

    fn requirements(&self) -> BTreeSet<ControllerCapability> {
        BTreeSet::from([ControllerCapability::Updating])
    }

    fn accepts(&self, request: &EngineRequest) -> bool {
        matches!(request, EngineRequest::Update { mode, .. } if *mode == U::MODE)
    }

    fn handle(&mut self, request: EngineRequest, _ctx: &mut EngineContext) -> Reply {
        let EngineRequest::Update { payload, .. } = request else {
            return Reply::fault(Fault::refused_request("not an update"));
        };
        if self.is_updating() || !self.updater.is_ready_for_update() {
            return Reply::fault(Fault::refused_request("not ready for update"));
        }
        let mode = U::MODE;
        let input = match U::Input::from_payload(payload) {
            Ok(input) => input,
            Err(e) => {
                warn!(error = %e, mode = %mode, "Rejecting malformed update");
                return Reply::fault(e);
            }
        };

        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);
        self.updating = Some(tag);
        debug!(tag, mode = %mode, "Applying update");
        Reply::Resume {
            tag,
            work: self.updater.update(input).map(|_| Payload::Unit),
        }
    }

    fn resume(&mut self, tag: u64, outcome: Result<Payload>, ctx: &mut EngineContext) -> Response {
        if self.updating == Some(tag) {
            self.updating = None;
        }
        match outcome {
            Ok(_) => {
                ctx.inform(EngineEvent::Updated { mode: U::MODE });
                Response::Done
            }
            Err(e) => Response::Error(e.into()),
        }
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["isUpdating", "isReadyForUpdate"]
    }

    fn property(&self, name: &str) -> Option<Payload> {
        match name {
            "isUpdating" => Some(Payload::Bool(self.is_updating())),
            "isReadyForUpdate" => Some(Payload::Bool(
                !self.is_updating() && self.updater.is_ready_for_update(),
            )),
            _ => None,
        }
    }
}
