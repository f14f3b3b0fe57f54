//! Record Documents
//!
//! The payload format the store accepts: one or many primary resources plus
//! an optional list of included resources.
//!
//! ```json
//! {
//!   "data": { "id": "isbn:9780439708180", "type": "com.example.bookstore.Book",
//!             "attributes": { "name": "...", "chapters": [ { "name": "..." }, 2 ] } },
//!   "included": [ { "id": "...", "type": "com.example.bookstore.Chapter", "attributes": {} } ]
//! }
//! ```
//!
//! Attribute values are kept as opaque JSON. Whether an array element is a
//! reference, an embedded record or a scalar is decided later by the
//! [`Schema`](crate::schema::Schema).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::identifier::RecordIdentifier;

/// A single resource object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject {
    pub id: String,

    #[serde(rename = "type")]
    pub model_name: String,

    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ResourceObject {
    /// The identifier this resource will be stored under.
    pub fn identifier(&self) -> RecordIdentifier {
        RecordIdentifier::new(&self.model_name, self.id.clone())
    }
}

/// Primary data: a single resource or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    One(ResourceObject),
    Many(Vec<ResourceObject>),
}

impl PrimaryData {
    pub fn into_vec(self) -> Vec<ResourceObject> {
        match self {
            PrimaryData::One(resource) => vec![resource],
            PrimaryData::Many(resources) => resources,
        }
    }
}

/// A top-level document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub data: PrimaryData,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<ResourceObject>,
}

impl Document {
    /// Parse a document from JSON text.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Build a document from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_single_resource_with_included() {
        let doc = Document::from_value(json!({
            "data": {
                "id": "isbn:9780439708180",
                "type": "com.example.bookstore.Book",
                "attributes": { "name": "Sorcerer's Stone", "chapters": [] }
            },
            "included": [
                {
                    "id": "ch:1",
                    "type": "com.example.bookstore.Chapter",
                    "attributes": { "name": "The Boy Who Lived" }
                }
            ]
        }))
        .unwrap();

        let data = doc.data.into_vec();
        assert_eq!(data.len(), 1);
        assert_eq!(
            data[0].identifier(),
            RecordIdentifier::new("com.example.bookstore.book", "isbn:9780439708180")
        );
        assert_eq!(doc.included.len(), 1);
        assert_eq!(doc.included[0].attributes["name"], json!("The Boy Who Lived"));
    }

    #[test]
    fn parses_resource_lists() {
        let doc = Document::from_json(
            r#"{ "data": [ { "id": "1", "type": "book" }, { "id": "2", "type": "book" } ] }"#,
        )
        .unwrap();

        let data = doc.data.into_vec();
        assert_eq!(data.len(), 2);
        assert!(data[0].attributes.is_empty());
        assert!(doc.included.is_empty());
    }

    #[test]
    fn rejects_resources_without_ids() {
        assert!(Document::from_json(r#"{ "data": { "type": "book" } }"#).is_err());
    }
}
