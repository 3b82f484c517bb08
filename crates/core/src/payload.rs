//! Tagged payloads exchanged with engines.
//!
//! Requests carry a `Payload`; components decode it into their declared input
//! type through `FromPayload`, which matches the variant tag and returns
//! `Error::UnexpectedContent` on a mismatch instead of performing an
//! unchecked cast.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::outcome::Done;
use crate::result::Result;

/// A dynamically typed value with an explicit variant tag.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    #[default]
    Unit,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Vector(Vec<f64>),
    Matrix(Vec<Vec<f64>>),
    List(Vec<Payload>),
    Map(BTreeMap<String, Payload>),
    Json(serde_json::Value),
}

/// The variant tag of a [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Unit,
    Bool,
    Integer,
    Float,
    Text,
    Vector,
    Matrix,
    List,
    Map,
    Json,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unit => "unit",
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Vector => "vector",
            Self::Matrix => "matrix",
            Self::List => "list",
            Self::Map => "map",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

impl Payload {
    /// The variant tag of this payload.
    pub const fn kind(&self) -> PayloadKind {
        match self {
            Self::Unit => PayloadKind::Unit,
            Self::Bool(_) => PayloadKind::Bool,
            Self::Integer(_) => PayloadKind::Integer,
            Self::Float(_) => PayloadKind::Float,
            Self::Text(_) => PayloadKind::Text,
            Self::Vector(_) => PayloadKind::Vector,
            Self::Matrix(_) => PayloadKind::Matrix,
            Self::List(_) => PayloadKind::List,
            Self::Map(_) => PayloadKind::Map,
            Self::Json(_) => PayloadKind::Json,
        }
    }

    /// Decode into a typed value.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnexpectedContent` when the variant does not match.
    pub fn decode<T: FromPayload>(self) -> Result<T> {
        T::from_payload(self)
    }

    fn mismatch(self, expected: PayloadKind) -> Error {
        Error::unexpected_content(expected.to_string(), self.kind().to_string())
    }
}

/// Typed decoding out of a [`Payload`].
pub trait FromPayload: Sized {
    /// Decode, checking the variant tag.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnexpectedContent` when the payload has another shape.
    fn from_payload(payload: Payload) -> Result<Self>;
}

/// Typed encoding into a [`Payload`].
pub trait IntoPayload {
    /// Encode this value.
    ///
    /// # Errors
    ///
    /// Only serde-backed encodings can fail.
    fn into_payload(self) -> Result<Payload>;
}

macro_rules! payload_variant {
    ($ty:ty, $variant:ident) => {
        impl FromPayload for $ty {
            fn from_payload(payload: Payload) -> Result<Self> {
                match payload {
                    Payload::$variant(value) => Ok(value),
                    other => Err(other.mismatch(PayloadKind::$variant)),
                }
            }
        }

        impl IntoPayload for $ty {
            fn into_payload(self) -> Result<Payload> {
                Ok(Payload::$variant(self))
            }
        }

        impl From<$ty> for Payload {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        }
    };
}

payload_variant!(bool, Bool);
payload_variant!(i64, Integer);
payload_variant!(f64, Float);
payload_variant!(String, Text);
payload_variant!(Vec<f64>, Vector);
payload_variant!(Vec<Vec<f64>>, Matrix);
payload_variant!(Vec<Payload>, List);
payload_variant!(BTreeMap<String, Payload>, Map);

impl FromPayload for Payload {
    fn from_payload(payload: Payload) -> Result<Self> {
        Ok(payload)
    }
}

impl IntoPayload for Payload {
    fn into_payload(self) -> Result<Payload> {
        Ok(self)
    }
}

impl FromPayload for () {
    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Unit => Ok(()),
            other => Err(other.mismatch(PayloadKind::Unit)),
        }
    }
}

impl IntoPayload for () {
    fn into_payload(self) -> Result<Payload> {
        Ok(Payload::Unit)
    }
}

impl IntoPayload for Done {
    fn into_payload(self) -> Result<Payload> {
        Ok(Payload::Unit)
    }
}

/// Any serde type, carried in the `Json` variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: DeserializeOwned> FromPayload for Json<T> {
    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Json(value) => serde_json::from_value(value).map(Json).map_err(|e| {
                Error::unexpected_content(std::any::type_name::<T>(), e.to_string())
            }),
            other => Err(other.mismatch(PayloadKind::Json)),
        }
    }
}

impl<T: Serialize> IntoPayload for Json<T> {
    fn into_payload(self) -> Result<Payload> {
        Ok(Payload::Json(serde_json::to_value(self.0)?))
    }
}
