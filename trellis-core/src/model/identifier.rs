//! Record identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalize a model name the way the store keys records.
///
/// Model names arrive in whatever case the document used
/// (`com.example.bookstore.Book`); the store always keys and reports them
/// lower-cased.
pub fn normalize_model_name(model_name: &str) -> String {
    model_name.to_lowercase()
}

/// Identity of a top-level record: its normalized model name plus its id.
///
/// This is also the reference token held by
/// [`RawEntry::Reference`](crate::entry::RawEntry::Reference). Deserializing
/// normalizes the model name just like [`RecordIdentifier::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "IdentifierFields")]
pub struct RecordIdentifier {
    model_name: String,
    id: String,
}

impl RecordIdentifier {
    /// Create an identifier, normalizing the model name.
    pub fn new(model_name: impl AsRef<str>, id: impl Into<String>) -> Self {
        Self {
            model_name: normalize_model_name(model_name.as_ref()),
            id: id.into(),
        }
    }

    /// The normalized model name.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// The record id.
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Deserialize)]
struct IdentifierFields {
    model_name: String,
    id: String,
}

impl From<IdentifierFields> for RecordIdentifier {
    fn from(fields: IdentifierFields) -> Self {
        RecordIdentifier::new(fields.model_name, fields.id)
    }
}

impl fmt::Display for RecordIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model_name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_are_normalized() {
        let a = RecordIdentifier::new("com.example.bookstore.Book", "isbn:1");
        let b = RecordIdentifier::new("com.example.bookstore.book", "isbn:1");

        assert_eq!(a, b);
        assert_eq!(a.model_name(), "com.example.bookstore.book");
    }

    #[test]
    fn ids_are_case_sensitive() {
        let a = RecordIdentifier::new("chapter", "A");
        let b = RecordIdentifier::new("chapter", "a");
        assert_ne!(a, b);
    }

    #[test]
    fn deserialized_identifiers_match_store_keys() {
        let parsed: RecordIdentifier =
            serde_json::from_str(r#"{ "model_name": "com.example.bookstore.Book", "id": "1" }"#)
                .unwrap();
        assert_eq!(parsed, RecordIdentifier::new("com.example.bookstore.book", "1"));

        let round_trip: RecordIdentifier =
            serde_json::from_value(serde_json::to_value(&parsed).unwrap()).unwrap();
        assert_eq!(round_trip, parsed);
    }

    #[test]
    fn display_joins_name_and_id() {
        let id = RecordIdentifier::new("Chapter", "1");
        assert_eq!(id.to_string(), "chapter:1");
    }
}
