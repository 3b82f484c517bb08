//! Queryable: answers `Query` requests through a typed handler.

use std::collections::BTreeSet;

use tracing::warn;

use flowmesh_core::{Fault, FromPayload, IntoPayload, Payload};
use flowmesh_dataflow::Promise;

use crate::capability::{Capability, ControllerCapability, EngineContext, Reply};
use crate::messages::{EngineRequest, Response};

/// Typed query logic.
pub trait QueryHandler: Send + 'static {
    type Input: FromPayload;
    type Output: IntoPayload + Send + 'static;

    /// Answer one query. The engine keeps serving other requests until the
    /// promise settles; a rejection is returned to the caller as the reply.
    fn handle_query(&mut self, input: Self::Input) -> Promise<Self::Output>;

    fn can_be_queried(&self) -> bool {
        true
    }
}

/// Component wrapping a [`QueryHandler`].
pub struct Queryable<Q> {
    handler: Q,
}

impl<Q: QueryHandler> Queryable<Q> {
    pub const fn new(handler: Q) -> Self {
        Self { handler }
    }
}

impl<Q: QueryHandler> Capability for Queryable<Q> {
    fn name(&self) -> &str {
        "queryable"
    }

    fn requirements(&self) -> BTreeSet<ControllerCapability> {
        BTreeSet::from([ControllerCapability::Querying])
    }

    fn accepts(&self, request: &EngineRequest) -> bool {
        matches!(request, EngineRequest::Query { .. })
    }

    fn handle(&mut self, request: EngineRequest, _ctx: &mut EngineContext) -> Reply {
        let EngineRequest::Query { payload } = request else {
            return Reply::fault(Fault::refused_request("not a query"));
        };
        let input = match Q::Input::from_payload(payload) {
            Ok(input) => input,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed query");
                return Reply::fault(e);
            }
        };
        Reply::Later(
            self.handler
                .handle_query(input)
                .try_map(IntoPayload::into_payload)
                .map(Response::Data)
                .recover(|e| Promise::resolved(Response::Error(e.into()))),
        )
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["canBeQueried"]
    }

    fn property(&self, name: &str) -> Option<Payload> {
        match name {
            "canBeQueried" => Some(Payload::Bool(self.handler.can_be_queried())),
            _ => None,
        }
    }
}
