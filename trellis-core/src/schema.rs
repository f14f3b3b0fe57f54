//! Schema Hooks
//!
//! The schema decides what each element of an array-valued attribute is
//! (scalar, embedded payload, or reference to a top-level record) and is told
//! whenever an owned array changes, so it can write the new contents back
//! into its own representation.

use serde_json::Value;

use crate::entry::RawEntry;

/// Classification and write-back for array-valued attributes.
pub trait Schema: Send + Sync {
    /// Classify one element of attribute `key` on a model named `model_name`.
    fn compute_entry(&self, key: &str, value: Value, model_name: &str) -> RawEntry;

    /// Classify every element of an array-valued attribute.
    fn compute_array(&self, key: &str, values: Vec<Value>, model_name: &str) -> Vec<RawEntry> {
        values
            .into_iter()
            .map(|value| self.compute_entry(key, value, model_name))
            .collect()
    }

    /// Called once per committed mutation of an array owned by a model.
    ///
    /// `entries` is the array after the change, with every embedded payload
    /// replaced by its live model instance. References and scalars are
    /// passed as stored.
    fn set_attribute(&self, _model_name: &str, _key: &str, _entries: &[RawEntry]) {}
}

/// JSON objects become embedded descriptors, everything else is a scalar.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSchema;

impl Schema for DefaultSchema {
    fn compute_entry(&self, _key: &str, value: Value, _model_name: &str) -> RawEntry {
        match value {
            Value::Object(attributes) => RawEntry::embedded(attributes),
            other => RawEntry::Scalar(other),
        }
    }
}
