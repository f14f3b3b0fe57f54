//! Raw Entries
//!
//! A [`RawEntry`] is the value stored at one position of a managed array's
//! backing sequence, exactly as the schema classified it. The kind is a
//! closed set, so the resolver matches on it exhaustively instead of probing
//! values at runtime.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde_json::{json, Map, Value};

use crate::model::{Model, RecordIdentifier};

/// Identity of an embedded descriptor.
///
/// Materialization is memoized on this id, so every clone of a descriptor
/// materializes to the same model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorId(u64);

impl DescriptorId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Payload of an embedded record, materialized into its own model instance
/// rather than stored in the record table.
#[derive(Clone)]
pub struct EmbeddedDescriptor {
    inner: Arc<DescriptorData>,
}

struct DescriptorData {
    id: DescriptorId,
    model_name: Option<String>,
    attributes: Map<String, Value>,
}

impl EmbeddedDescriptor {
    /// Create a descriptor with a fresh identity.
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(DescriptorData {
                id: DescriptorId::next(),
                model_name: None,
                attributes,
            }),
        }
    }

    /// Create a descriptor that materializes as `model_name`.
    pub fn with_model_name(model_name: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(DescriptorData {
                id: DescriptorId::next(),
                model_name: Some(model_name.into()),
                attributes,
            }),
        }
    }

    pub fn id(&self) -> DescriptorId {
        self.inner.id
    }

    pub fn model_name(&self) -> Option<&str> {
        self.inner.model_name.as_deref()
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.inner.attributes
    }

    /// A handle that does not keep the descriptor alive.
    pub fn downgrade(&self) -> WeakDescriptor {
        WeakDescriptor {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning handle to an [`EmbeddedDescriptor`].
///
/// A descriptor is alive while some array position (or any other clone)
/// still holds it.
#[derive(Clone)]
pub struct WeakDescriptor {
    id: DescriptorId,
    inner: Weak<DescriptorData>,
}

impl WeakDescriptor {
    pub fn id(&self) -> DescriptorId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn upgrade(&self) -> Option<EmbeddedDescriptor> {
        self.inner.upgrade().map(|inner| EmbeddedDescriptor { inner })
    }
}

impl fmt::Debug for WeakDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDescriptor")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl PartialEq for EmbeddedDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl fmt::Debug for EmbeddedDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedDescriptor")
            .field("id", &self.inner.id)
            .field("model_name", &self.inner.model_name)
            .field("attributes", &self.inner.attributes)
            .finish()
    }
}

/// An externally supplied wrapper object.
///
/// Arrays hand opaque values back untouched and never look inside them;
/// only the code that created one can downcast it.
#[derive(Clone)]
pub struct Opaque(Arc<dyn Any + Send + Sync>);

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether two handles wrap the same object.
    pub fn ptr_eq(&self, other: &Opaque) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Opaque(..)")
    }
}

/// One element of a managed array's backing sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEntry {
    /// Any JSON value, passed through as-is. This includes plain objects the
    /// schema chose not to treat as embedded records.
    Scalar(Value),

    /// A nested record payload.
    Embedded(EmbeddedDescriptor),

    /// A reference to a top-level record in the store.
    Reference(RecordIdentifier),

    /// A model instance that is already live.
    Model(Model),

    /// A wrapper object supplied by the caller.
    Opaque(Opaque),
}

impl RawEntry {
    /// Build an embedded entry from a JSON object's fields.
    pub fn embedded(attributes: Map<String, Value>) -> Self {
        RawEntry::Embedded(EmbeddedDescriptor::new(attributes))
    }

    /// Build a reference entry.
    pub fn reference(model_name: impl AsRef<str>, id: impl Into<String>) -> Self {
        RawEntry::Reference(RecordIdentifier::new(model_name, id))
    }

    /// Whether this entry points at a store-managed record.
    pub fn is_reference(&self) -> bool {
        self.record_identity().is_some()
    }

    /// The store identity this entry points at, if any.
    ///
    /// Known without resolving: reference tokens carry it, and identified
    /// models expose it directly.
    pub fn record_identity(&self) -> Option<&RecordIdentifier> {
        match self {
            RawEntry::Reference(identifier) => Some(identifier),
            RawEntry::Model(model) => model.identifier(),
            RawEntry::Scalar(_) | RawEntry::Embedded(_) | RawEntry::Opaque(_) => None,
        }
    }

    /// Render the entry as the JSON an owning model stores for it.
    ///
    /// Scalars are copied. Embedded payloads and embedded models become
    /// their attribute objects; record references and identified models
    /// become `{"type", "id"}` pairs. Opaque wrappers have no JSON form and
    /// render as `null`.
    pub fn to_value(&self) -> Value {
        match self {
            RawEntry::Scalar(value) => value.clone(),
            RawEntry::Embedded(descriptor) => Value::Object(descriptor.attributes().clone()),
            RawEntry::Reference(identifier) => reference_value(identifier),
            RawEntry::Model(model) => match model.identifier() {
                Some(identifier) => reference_value(identifier),
                None => Value::Object(model.attributes()),
            },
            RawEntry::Opaque(_) => Value::Null,
        }
    }
}

fn reference_value(identifier: &RecordIdentifier) -> Value {
    json!({ "type": identifier.model_name(), "id": identifier.id() })
}

impl From<Value> for RawEntry {
    /// Wraps the value as a scalar without classifying it. Use
    /// `ManagedArray::push_value` to run the schema's classification.
    fn from(value: Value) -> Self {
        RawEntry::Scalar(value)
    }
}

impl From<Model> for RawEntry {
    fn from(model: Model) -> Self {
        RawEntry::Model(model)
    }
}

impl From<RecordIdentifier> for RawEntry {
    fn from(identifier: RecordIdentifier) -> Self {
        RawEntry::Reference(identifier)
    }
}

impl From<EmbeddedDescriptor> for RawEntry {
    fn from(descriptor: EmbeddedDescriptor) -> Self {
        RawEntry::Embedded(descriptor)
    }
}

impl From<Opaque> for RawEntry {
    fn from(opaque: Opaque) -> Self {
        RawEntry::Opaque(opaque)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptor_clones_share_identity() {
        let descriptor = EmbeddedDescriptor::new(Map::new());
        let clone = descriptor.clone();
        let other = EmbeddedDescriptor::new(Map::new());

        assert_eq!(descriptor.id(), clone.id());
        assert_ne!(descriptor.id(), other.id());
    }

    #[test]
    fn references_expose_identity_without_resolution() {
        let entry = RawEntry::reference("Chapter", "1");
        assert!(entry.is_reference());
        assert_eq!(
            entry.record_identity(),
            Some(&RecordIdentifier::new("chapter", "1"))
        );
    }

    #[test]
    fn identified_models_count_as_references() {
        let record = Model::record(RecordIdentifier::new("chapter", "1"), Map::new());
        let embedded = Model::embedded("chapter", Map::new());

        assert!(RawEntry::from(record).is_reference());
        assert!(!RawEntry::from(embedded).is_reference());
    }

    #[test]
    fn scalars_and_descriptors_are_not_references() {
        assert!(!RawEntry::from(json!(2)).is_reference());
        assert!(!RawEntry::from(json!({ "type": "chapter", "id": "1" })).is_reference());
        assert!(!RawEntry::embedded(Map::new()).is_reference());
    }

    #[test]
    fn weak_descriptors_track_liveness() {
        let descriptor = EmbeddedDescriptor::new(Map::new());
        let weak = descriptor.downgrade();
        let clone = descriptor.clone();

        assert_eq!(weak.id(), descriptor.id());
        drop(descriptor);
        assert!(weak.is_alive());
        assert_eq!(weak.upgrade(), Some(clone.clone()));

        drop(clone);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn entries_render_as_stored_json() {
        let mut edited = Map::new();
        edited.insert("name".to_string(), json!("B"));
        let embedded_model = Model::embedded("chapter", edited);
        let record = Model::record(RecordIdentifier::new("Chapter", "7"), Map::new());

        let mut attributes = Map::new();
        attributes.insert("name".to_string(), json!("A"));

        assert_eq!(RawEntry::from(json!(2)).to_value(), json!(2));
        assert_eq!(RawEntry::embedded(attributes).to_value(), json!({ "name": "A" }));
        assert_eq!(
            RawEntry::reference("Chapter", "1").to_value(),
            json!({ "type": "chapter", "id": "1" })
        );
        assert_eq!(RawEntry::from(record).to_value(), json!({ "type": "chapter", "id": "7" }));
        assert_eq!(RawEntry::from(embedded_model).to_value(), json!({ "name": "B" }));
        assert_eq!(RawEntry::Opaque(Opaque::new(1u8)).to_value(), Value::Null);
    }

    #[test]
    fn opaque_values_downcast_to_their_type() {
        let opaque = Opaque::new(String::from("proxy"));
        assert_eq!(opaque.downcast_ref::<String>().map(String::as_str), Some("proxy"));
        assert!(opaque.downcast_ref::<u32>().is_none());
        assert_eq!(opaque, opaque.clone());
        assert_ne!(opaque, Opaque::new(String::from("proxy")));
    }
}
