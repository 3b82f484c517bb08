//! Evaluatable: runs evaluations and replies with their outcome.

use std::collections::BTreeSet;

use tracing::warn;

use flowmesh_core::{Fault, FromPayload, IntoPayload, Outcome, Payload};
use flowmesh_dataflow::Promise;

use crate::capability::{Capability, ControllerCapability, EngineContext, Reply};
use crate::messages::{EngineRequest, Response};

/// Typed evaluation logic.
pub trait Evaluator: Send + 'static {
    type Input: FromPayload;
    type Output: IntoPayload + Send + 'static;

    /// Evaluate one input. May take arbitrarily long; the engine keeps
    /// serving other requests meanwhile.
    fn evaluate(&mut self, input: Self::Input) -> Promise<Outcome<Self::Output>>;
}

/// Component wrapping an [`Evaluator`].
pub struct Evaluatable<E> {
    evaluator: E,
}

impl<E: Evaluator> Evaluatable<E> {
    pub const fn new(evaluator: E) -> Self {
        Self { evaluator }
    }
}

fn to_response<O: IntoPayload>(outcome: Outcome<O>) -> Response {
    match outcome {
        Outcome::Done => Response::Done,
        Outcome::Error(fault) => Response::Error(fault),
        Outcome::Data(output) => match output.into_payload() {
            Ok(payload) => Response::Data(payload),
            Err(e) => Response::Error(e.into()),
        },
    }
}

impl<E: Evaluator> Capability for Evaluatable<E> {
    fn name(&self) -> &str {
        "evaluatable"
    }

    fn requirements(&self) -> BTreeSet<ControllerCapability> {
        BTreeSet::from([ControllerCapability::Evaluation])
    }

    fn accepts(&self, request: &EngineRequest) -> bool {
        matches!(request, EngineRequest::Evaluate { .. })
    }

    fn handle(&mut self, request: EngineRequest, _ctx: &mut EngineContext) -> Reply {
        let EngineRequest::Evaluate { payload } = request else {
            return Reply::fault(Fault::refused_request("not an evaluation"));
        };
        match E::Input::from_payload(payload) {
            Ok(input) => Reply::Later(
                self.evaluator
                    .evaluate(input)
                    .map(to_response)
                    .recover(|e| Promise::resolved(Response::Error(e.into()))),
            ),
            Err(e) => {
                warn!(error = %e, "Rejecting malformed evaluation");
                Reply::fault(e)
            }
        }
    }
}
