//! Capability components: the building blocks of an engine's behaviour.
//!
//! An engine is a list of components behind one dispatch table. Each
//! component declares which requests it accepts, the controller
//! capabilities it needs, and the properties it exposes. The engine routes
//! every request to the first accepting component.
//!
//! # Long-running work
//!
//! A component never blocks the engine. Work that takes time is returned as
//! `Reply::Resume`: the engine runs it off-actor and, once it settles, calls
//! `Capability::resume` from its own mailbox to produce the final response.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use flowmesh_core::{Error, Fault, Payload, Result};
use flowmesh_dataflow::Promise;

use crate::messages::{EngineEvent, EngineRequest, Response};

/// Tags a controller must support to drive a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerCapability {
    Querying,
    TrainingControl,
    Evaluation,
    Updating,
    HyperparameterTuning,
}

impl fmt::Display for ControllerCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Querying => "querying",
            Self::TrainingControl => "training_control",
            Self::Evaluation => "evaluation",
            Self::Updating => "updating",
            Self::HyperparameterTuning => "hyperparameter_tuning",
        };
        f.write_str(name)
    }
}

/// Check that `supported` covers `required`.
///
/// # Errors
///
/// Returns `Error::RefusedRequest` naming the missing capabilities.
pub fn negotiate(
    required: &BTreeSet<ControllerCapability>,
    supported: &BTreeSet<ControllerCapability>,
) -> Result<()> {
    let missing: Vec<String> = required
        .difference(supported)
        .map(ToString::to_string)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::refused_request(format!(
            "missing controller capabilities: {}",
            missing.join(", ")
        )))
    }
}

/// How a component answers a request.
#[must_use]
pub enum Reply {
    /// Reply immediately.
    Now(Response),
    /// Reply when the promise settles; no component state is touched.
    Later(Promise<Response>),
    /// Run `work` off-actor, then call `resume(tag, ..)` to build the reply.
    Resume { tag: u64, work: Promise<Payload> },
}

impl Reply {
    /// An immediate error reply.
    pub fn fault(fault: impl Into<Fault>) -> Self {
        Self::Now(Response::Error(fault.into()))
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self::Now(response)
    }
}

/// Side effects a component requests while handling a message.
#[derive(Debug, Default)]
pub struct EngineContext {
    informs: Vec<EngineEvent>,
    cancels: Vec<u64>,
}

impl EngineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcast `event` to the subscribed controllers.
    pub fn inform(&mut self, event: EngineEvent) {
        self.informs.push(event);
    }

    /// Abort the in-flight work started under `tag`.
    ///
    /// The engine resumes the component with `Error::Cancelled` so the
    /// pending request still gets a reply.
    pub fn cancel(&mut self, tag: u64) {
        self.cancels.push(tag);
    }

    pub(crate) fn into_parts(self) -> (Vec<EngineEvent>, Vec<u64>) {
        (self.informs, self.cancels)
    }
}

/// A component contributing request handlers and properties to an engine.
pub trait Capability: Send + 'static {
    /// Component name for logs.
    fn name(&self) -> &str;

    /// Controller capabilities needed to drive this component.
    fn requirements(&self) -> BTreeSet<ControllerCapability> {
        BTreeSet::new()
    }

    /// One-time initialisation, run before the engine accepts messages.
    ///
    /// # Errors
    ///
    /// A failure aborts the engine start (or the behaviour change).
    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether this component handles `request`.
    fn accepts(&self, request: &EngineRequest) -> bool;

    /// Handle an accepted request.
    fn handle(&mut self, request: EngineRequest, ctx: &mut EngineContext) -> Reply;

    /// Build the reply for work returned through `Reply::Resume`.
    fn resume(&mut self, tag: u64, outcome: Result<Payload>, ctx: &mut EngineContext) -> Response {
        let _ = (tag, ctx);
        match outcome {
            Ok(payload) => Response::Data(payload),
            Err(e) => Response::Error(e.into()),
        }
    }

    /// Names of the properties this component answers.
    fn property_names(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Current value of a property, evaluated now.
    fn property(&self, name: &str) -> Option<Payload> {
        let _ = name;
        None
    }
}

/// A named set of components forming one engine behaviour.
pub struct Behavior {
    name: String,
    components: Vec<Box<dyn Capability>>,
}

impl Behavior {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
        }
    }

    /// Add a component. Earlier components win when several accept a request.
    #[must_use]
    pub fn with(mut self, component: impl Capability) -> Self {
        self.components.push(Box::new(component));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Union of the components' requirements.
    pub fn requirements(&self) -> BTreeSet<ControllerCapability> {
        self.components
            .iter()
            .flat_map(|component| component.requirements())
            .collect()
    }

    pub(crate) fn into_parts(self) -> (String, Vec<Box<dyn Capability>>) {
        (self.name, self.components)
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.components.iter().map(|c| c.name()).collect();
        f.debug_struct("Behavior")
            .field("name", &self.name)
            .field("components", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use flowmesh_core::ErrorKind;
    use proptest::prelude::*;

    fn caps(list: &[ControllerCapability]) -> BTreeSet<ControllerCapability> {
        list.iter().copied().collect()
    }

    #[test]
    fn should_accept_when_supported_covers_required() {
        let required = caps(&[ControllerCapability::TrainingControl]);
        let supported = caps(&[
            ControllerCapability::TrainingControl,
            ControllerCapability::Querying,
        ]);
        assert!(negotiate(&required, &supported).is_ok());
    }

    #[test]
    fn should_name_missing_capabilities() {
        let required = caps(&[ControllerCapability::Updating, ControllerCapability::Evaluation]);
        let supported = caps(&[ControllerCapability::Evaluation]);
        let err = negotiate(&required, &supported).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RefusedRequest);
        assert!(err.to_string().contains("updating"));
    }

    fn any_capability() -> impl Strategy<Value = ControllerCapability> {
        prop_oneof![
            Just(ControllerCapability::Querying),
            Just(ControllerCapability::TrainingControl),
            Just(ControllerCapability::Evaluation),
            Just(ControllerCapability::Updating),
            Just(ControllerCapability::HyperparameterTuning),
        ]
    }

    proptest! {
        #[test]
        fn negotiation_succeeds_exactly_for_supersets(
            required in prop::collection::btree_set(any_capability(), 0..5),
            supported in prop::collection::btree_set(any_capability(), 0..5),
        ) {
            prop_assert_eq!(
                negotiate(&required, &supported).is_ok(),
                required.is_subset(&supported)
            );
        }
    }
}
