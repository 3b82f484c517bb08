//! Hyperparameter components: read-only (`Open`) and read-write (`Dynamic`).
//!
//! Keys travel as strings and values as payloads. A `Set` is validated as a
//! whole before anything is applied: one bad entry rejects the assignment.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::str::FromStr;

use tracing::{info, warn};

use flowmesh_core::{Error, Fault, FromPayload, IntoPayload, Result};

use crate::capability::{Capability, ControllerCapability, EngineContext, Reply};
use crate::messages::{EngineEvent, EngineRequest, HyperparameterMap, Response};

/// Bounds for a hyperparameter key.
pub trait HyperparameterKey: Ord + Clone + Display + FromStr + Send + 'static {}

impl<K> HyperparameterKey for K where K: Ord + Clone + Display + FromStr + Send + 'static {}

/// Bounds for a hyperparameter value.
pub trait HyperparameterValue: Clone + FromPayload + IntoPayload + Send + 'static {}

impl<H> HyperparameterValue for H where H: Clone + FromPayload + IntoPayload + Send + 'static {}

type Validator<K, H> = Box<dyn Fn(&K, &H) -> Result<()> + Send>;

fn snapshot<K, H>(values: &BTreeMap<K, H>, keys: Option<Vec<String>>) -> Response
where
    K: HyperparameterKey,
    H: HyperparameterValue,
{
    let selected: Vec<(&K, &H)> = match keys {
        None => values.iter().collect(),
        Some(keys) => keys
            .iter()
            .filter_map(|raw| raw.parse::<K>().ok())
            .filter_map(|key| values.get_key_value(&key))
            .collect(),
    };
    let encoded: Result<HyperparameterMap> = selected
        .into_iter()
        .map(|(key, value)| Ok((key.to_string(), value.clone().into_payload()?)))
        .collect();
    match encoded {
        Ok(map) => Response::Hyperparameters(map),
        Err(e) => Response::Error(e.into()),
    }
}

/// Read-only hyperparameters.
pub struct OpenHyperparameters<K, H> {
    values: BTreeMap<K, H>,
}

impl<K: HyperparameterKey, H: HyperparameterValue> OpenHyperparameters<K, H> {
    pub fn new(values: impl IntoIterator<Item = (K, H)>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }
}

impl<K: HyperparameterKey, H: HyperparameterValue> Capability for OpenHyperparameters<K, H> {
    fn name(&self) -> &str {
        "hyperparameters-open"
    }

    fn accepts(&self, request: &EngineRequest) -> bool {
        matches!(request, EngineRequest::GetHyperparameters { .. })
    }

    fn handle(&mut self, request: EngineRequest, _ctx: &mut EngineContext) -> Reply {
        match request {
            EngineRequest::GetHyperparameters { keys } => Reply::Now(snapshot(&self.values, keys)),
            _ => Reply::fault(Fault::refused_request("hyperparameters are read-only")),
        }
    }
}

/// Read-write hyperparameters with whole-assignment validation.
pub struct DynamicHyperparameters<K, H> {
    values: BTreeMap<K, H>,
    validator: Validator<K, H>,
}

impl<K: HyperparameterKey, H: HyperparameterValue> DynamicHyperparameters<K, H>
where
    K::Err: Display,
{
    pub fn new(values: impl IntoIterator<Item = (K, H)>) -> Self {
        Self {
            values: values.into_iter().collect(),
            validator: Box::new(|_, _| Ok(())),
        }
    }

    /// Reject individual assignments, e.g. out-of-range values.
    #[must_use]
    pub fn with_validator(
        mut self,
        validator: impl Fn(&K, &H) -> Result<()> + Send + 'static,
    ) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn get(&self, key: &K) -> Option<&H> {
        self.values.get(key)
    }

    fn validate(&self, assignment: HyperparameterMap) -> Result<Vec<(K, H)>> {
        assignment
            .into_iter()
            .map(|(raw, payload)| {
                let key = raw.parse::<K>().map_err(|e| {
                    Error::unexpected_content("hyperparameter key", format!("{raw}: {e}"))
                })?;
                if !self.values.contains_key(&key) {
                    return Err(Error::unexpected_content("known hyperparameter", raw));
                }
                let value = H::from_payload(payload)?;
                (self.validator)(&key, &value).map_err(|e| {
                    Error::unexpected_content(format!("valid value for {key}"), e.to_string())
                })?;
                Ok((key, value))
            })
            .collect()
    }
}

impl<K: HyperparameterKey, H: HyperparameterValue> Capability for DynamicHyperparameters<K, H>
where
    K::Err: Display,
{
    fn name(&self) -> &str {
        "hyperparameters-dynamic"
    }

    fn requirements(&self) -> BTreeSet<ControllerCapability> {
        BTreeSet::from([ControllerCapability::HyperparameterTuning])
    }

    fn accepts(&self, request: &EngineRequest) -> bool {
        matches!(
            request,
            EngineRequest::GetHyperparameters { .. } | EngineRequest::SetHyperparameters { .. }
        )
    }

    fn handle(&mut self, request: EngineRequest, ctx: &mut EngineContext) -> Reply {
        match request {
            EngineRequest::GetHyperparameters { keys } => Reply::Now(snapshot(&self.values, keys)),
            EngineRequest::SetHyperparameters { values } => match self.validate(values) {
                Ok(assignment) => {
                    let keys: Vec<String> = assignment.iter().map(|(k, _)| k.to_string()).collect();
                    self.values.extend(assignment);
                    info!(keys = ?keys, "Hyperparameters changed");
                    ctx.inform(EngineEvent::HyperparametersChanged { keys });
                    Reply::Now(Response::Done)
                }
                Err(e) => {
                    warn!(error = %e, "Rejecting hyperparameter assignment");
                    Reply::fault(e)
                }
            },
            other => Reply::fault(Fault::refused_request(format!(
                "hyperparameters do not handle {}",
                other.label()
            ))),
        }
    }
}
