//! Store Configuration
//!
//! Settings that shape how managed arrays created by a store behave. The
//! configuration is plain data: it can be built in code or deserialized from
//! JSON, and every field has a default.
//!
//! ```rust,ignore
//! let config = StoreConfig::from_json(r#"{ "missing_reference": "marker" }"#)?;
//! let store = Store::builder().config(config).build();
//! ```

use serde::{Deserialize, Serialize};

/// What a reference to a record that is not loaded resolves to.
///
/// Placeholders are never cached: once the record is pushed into the store,
/// the next read of that position resolves to the live model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingReferencePolicy {
    /// Resolve to `ResolvedEntry::Scalar(Value::Null)`.
    #[default]
    Null,

    /// Resolve to `ResolvedEntry::Unresolved(identifier)`, keeping the token
    /// visible to readers.
    Marker,
}

/// Configuration shared by a store and the arrays it creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Placeholder policy for unresolvable references.
    pub missing_reference: MissingReferencePolicy,

    /// Whether arrays subscribe to unload events for the records they hold.
    /// Disabling this leaves unloaded records in place until the array is
    /// mutated by its owner.
    pub track_unloads: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            missing_reference: MissingReferencePolicy::default(),
            track_unloads: true,
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_track_unloads_and_use_null() {
        let config = StoreConfig::default();
        assert!(config.track_unloads);
        assert_eq!(config.missing_reference, MissingReferencePolicy::Null);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = StoreConfig::from_json(r#"{ "missing_reference": "marker" }"#).unwrap();
        assert_eq!(config.missing_reference, MissingReferencePolicy::Marker);
        assert!(config.track_unloads);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(StoreConfig::from_json(r#"{ "missing_reference": "proxy" }"#).is_err());
    }
}
