//! Resolved entries.

use serde_json::Value;

use super::raw::Opaque;
use crate::model::{Model, RecordIdentifier};

/// The externally observable value at an array position.
///
/// Equality on `Model` and `Opaque` is identity, so `assert_eq!` between two
/// resolved entries checks that both reads produced the same instance.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedEntry {
    /// A pass-through JSON value.
    Scalar(Value),

    /// A live model instance.
    Model(Model),

    /// A pass-through wrapper object.
    Opaque(Opaque),

    /// Placeholder for a reference whose record is not loaded, produced under
    /// [`MissingReferencePolicy::Marker`](crate::config::MissingReferencePolicy::Marker).
    Unresolved(RecordIdentifier),
}

impl ResolvedEntry {
    pub fn as_model(&self) -> Option<&Model> {
        match self {
            ResolvedEntry::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn into_model(self) -> Option<Model> {
        match self {
            ResolvedEntry::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            ResolvedEntry::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&Opaque> {
        match self {
            ResolvedEntry::Opaque(opaque) => Some(opaque),
            _ => None,
        }
    }

    /// Whether this value is `record` itself.
    pub fn is_model(&self, record: &Model) -> bool {
        self.as_model().is_some_and(|model| model.ptr_eq(record))
    }
}

impl From<Value> for ResolvedEntry {
    fn from(value: Value) -> Self {
        ResolvedEntry::Scalar(value)
    }
}

impl From<Model> for ResolvedEntry {
    fn from(model: Model) -> Self {
        ResolvedEntry::Model(model)
    }
}
