//! Reference Resolver
//!
//! Maps a [`RawEntry`] to the value readers observe. The resolver is a pure
//! read: apart from whatever the materializer does to build an embedded
//! model, it has no side effects, and it never looks inside values it does
//! not manage (scalars, live models and opaque wrappers come back as-is).
//!
//! # Missing References
//!
//! A reference whose record is not loaded, or whose registry has been
//! dropped, is not an error. It resolves to the placeholder chosen by
//! [`MissingReferencePolicy`] and is reported as not cacheable, so the
//! position resolves properly once the record arrives.

use std::fmt;
use std::sync::{Arc, Weak};

use serde_json::Value;

use super::materializer::Materializer;
use crate::config::MissingReferencePolicy;
use crate::entry::{RawEntry, ResolvedEntry};
use crate::error::ArrayError;
use crate::model::RecordIdentifier;
use crate::store::RecordRegistry;

/// Outcome of resolving one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub entry: ResolvedEntry,

    /// Whether the value may be memoized for the position. False for
    /// placeholders.
    pub cacheable: bool,
}

impl Resolution {
    fn cached(entry: ResolvedEntry) -> Self {
        Self {
            entry,
            cacheable: true,
        }
    }

    fn placeholder(entry: ResolvedEntry) -> Self {
        Self {
            entry,
            cacheable: false,
        }
    }
}

/// Resolves raw entries against a registry and a materializer.
#[derive(Clone)]
pub struct Resolver {
    registry: Weak<dyn RecordRegistry>,
    materializer: Arc<dyn Materializer>,
    missing_reference: MissingReferencePolicy,
}

impl Resolver {
    pub fn new(
        registry: Weak<dyn RecordRegistry>,
        materializer: Arc<dyn Materializer>,
        missing_reference: MissingReferencePolicy,
    ) -> Self {
        Self {
            registry,
            materializer,
            missing_reference,
        }
    }

    /// The registry, if it is still alive.
    pub fn registry(&self) -> Option<Arc<dyn RecordRegistry>> {
        self.registry.upgrade()
    }

    pub fn missing_reference(&self) -> MissingReferencePolicy {
        self.missing_reference
    }

    /// Let the materializer drop models nothing can reach any more.
    pub fn release_unused(&self) {
        self.materializer.release_unused();
    }

    /// Resolve one entry.
    ///
    /// Errors only when the materializer rejects an embedded descriptor.
    pub fn resolve(&self, raw: &RawEntry) -> Result<Resolution, ArrayError> {
        match raw {
            RawEntry::Scalar(value) => Ok(Resolution::cached(ResolvedEntry::Scalar(value.clone()))),
            RawEntry::Model(model) => Ok(Resolution::cached(ResolvedEntry::Model(model.clone()))),
            RawEntry::Opaque(opaque) => {
                Ok(Resolution::cached(ResolvedEntry::Opaque(opaque.clone())))
            }
            RawEntry::Embedded(descriptor) => {
                let model = self.materializer.materialize(descriptor)?;
                Ok(Resolution::cached(ResolvedEntry::Model(model)))
            }
            RawEntry::Reference(identifier) => Ok(self.resolve_reference(identifier)),
        }
    }

    fn resolve_reference(&self, identifier: &RecordIdentifier) -> Resolution {
        let found = self
            .registry
            .upgrade()
            .and_then(|registry| registry.peek_record(identifier));

        match found {
            Some(model) => Resolution::cached(ResolvedEntry::Model(model)),
            None => {
                tracing::debug!(
                    record = %identifier,
                    policy = ?self.missing_reference,
                    "reference not loaded, using placeholder"
                );
                Resolution::placeholder(self.placeholder(identifier))
            }
        }
    }

    fn placeholder(&self, identifier: &RecordIdentifier) -> ResolvedEntry {
        match self.missing_reference {
            MissingReferencePolicy::Null => ResolvedEntry::Scalar(Value::Null),
            MissingReferencePolicy::Marker => ResolvedEntry::Unresolved(identifier.clone()),
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("registry_alive", &(self.registry.strong_count() > 0))
            .field("missing_reference", &self.missing_reference)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EmbeddedDescriptor, Opaque};
    use crate::error::MaterializeError;
    use crate::model::Model;
    use crate::resolve::EmbeddedModelCache;
    use crate::store::{ListenerId, UnloadListener};
    use parking_lot::RwLock;
    use serde_json::{json, Map};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeRegistry {
        records: RwLock<HashMap<RecordIdentifier, Model>>,
    }

    impl FakeRegistry {
        fn insert(&self, model: &Model) {
            if let Some(identifier) = model.identifier() {
                self.records.write().insert(identifier.clone(), model.clone());
            }
        }
    }

    impl RecordRegistry for FakeRegistry {
        fn peek_record(&self, identifier: &RecordIdentifier) -> Option<Model> {
            self.records.read().get(identifier).cloned()
        }

        fn subscribe_unload(
            &self,
            _: &RecordIdentifier,
            _: ListenerId,
            _: Weak<dyn UnloadListener>,
        ) {
        }

        fn unsubscribe_unload(&self, _: &RecordIdentifier, _: ListenerId) {}
    }

    /// Materializer that counts calls and never touches its input's internals.
    #[derive(Default)]
    struct CountingMaterializer {
        inner: EmbeddedModelCache,
        calls: AtomicUsize,
    }

    impl Materializer for CountingMaterializer {
        fn materialize(&self, descriptor: &EmbeddedDescriptor) -> Result<Model, MaterializeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.materialize(descriptor)
        }
    }

    struct RejectingMaterializer;

    impl Materializer for RejectingMaterializer {
        fn materialize(&self, _: &EmbeddedDescriptor) -> Result<Model, MaterializeError> {
            Err(MaterializeError::Rejected {
                reason: "unknown nested type".to_string(),
            })
        }
    }

    fn embedded() -> Arc<dyn Materializer> {
        Arc::new(EmbeddedModelCache::new())
    }

    fn resolver_for(
        registry: &Arc<FakeRegistry>,
        materializer: Arc<dyn Materializer>,
        policy: MissingReferencePolicy,
    ) -> Resolver {
        let weak: Weak<FakeRegistry> = Arc::downgrade(registry);
        Resolver::new(weak, materializer, policy)
    }

    #[test]
    fn pass_through_values_are_unchanged() {
        let registry = Arc::new(FakeRegistry::default());
        let materializer = Arc::new(CountingMaterializer::default());
        let resolver = resolver_for(&registry, materializer.clone(), MissingReferencePolicy::Null);

        let scalar = resolver.resolve(&RawEntry::from(json!(2))).unwrap();
        assert_eq!(scalar.entry, ResolvedEntry::Scalar(json!(2)));
        assert!(scalar.cacheable);

        // Plain objects stay plain objects, whatever fields they carry
        let pojo = json!({ "name": "Chapter 1", "_internalModel": { "id": 1 } });
        let resolved = resolver.resolve(&RawEntry::Scalar(pojo.clone())).unwrap();
        assert_eq!(resolved.entry, ResolvedEntry::Scalar(pojo));

        let opaque = Opaque::new(42_u32);
        let resolved = resolver.resolve(&RawEntry::Opaque(opaque.clone())).unwrap();
        assert_eq!(resolved.entry, ResolvedEntry::Opaque(opaque));

        assert_eq!(materializer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn live_models_resolve_to_themselves() {
        let registry = Arc::new(FakeRegistry::default());
        let resolver = resolver_for(&registry, embedded(), MissingReferencePolicy::Null);
        let model = Model::embedded("chapter", Map::new());

        let resolved = resolver.resolve(&RawEntry::Model(model.clone())).unwrap();
        assert!(resolved.entry.is_model(&model));
    }

    #[test]
    fn embedded_descriptors_materialize_idempotently() {
        let registry = Arc::new(FakeRegistry::default());
        let materializer = Arc::new(CountingMaterializer::default());
        let resolver = resolver_for(&registry, materializer.clone(), MissingReferencePolicy::Null);

        let mut attributes = Map::new();
        attributes.insert("name".to_string(), json!("The Boy Who Lived"));
        let entry = RawEntry::embedded(attributes);

        let first = resolver.resolve(&entry).unwrap().entry.into_model().unwrap();
        let second = resolver.resolve(&entry).unwrap().entry.into_model().unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(first.get("name"), Some(json!("The Boy Who Lived")));
        assert_eq!(materializer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn references_resolve_through_the_registry() {
        let registry = Arc::new(FakeRegistry::default());
        let resolver = resolver_for(&registry, embedded(), MissingReferencePolicy::Null);
        let identifier = RecordIdentifier::new("chapter", "1");
        let chapter = Model::record(identifier.clone(), Map::new());
        registry.insert(&chapter);

        let resolved = resolver.resolve(&RawEntry::Reference(identifier)).unwrap();
        assert!(resolved.entry.is_model(&chapter));
        assert!(resolved.cacheable);
    }

    #[test]
    fn missing_references_follow_policy() {
        let registry = Arc::new(FakeRegistry::default());
        let identifier = RecordIdentifier::new("chapter", "missing");

        let null = resolver_for(&registry, embedded(), MissingReferencePolicy::Null);
        let resolved = null.resolve(&RawEntry::Reference(identifier.clone())).unwrap();
        assert_eq!(resolved.entry, ResolvedEntry::Scalar(Value::Null));
        assert!(!resolved.cacheable);

        let marker = resolver_for(&registry, embedded(), MissingReferencePolicy::Marker);
        let resolved = marker.resolve(&RawEntry::Reference(identifier.clone())).unwrap();
        assert_eq!(resolved.entry, ResolvedEntry::Unresolved(identifier));
        assert!(!resolved.cacheable);
    }

    #[test]
    fn dropped_registry_yields_placeholders() {
        let registry = Arc::new(FakeRegistry::default());
        let resolver = resolver_for(&registry, embedded(), MissingReferencePolicy::Null);
        drop(registry);

        assert!(resolver.registry().is_none());
        let resolved = resolver.resolve(&RawEntry::reference("chapter", "1")).unwrap();
        assert_eq!(resolved.entry, ResolvedEntry::Scalar(Value::Null));
    }

    #[test]
    fn materializer_errors_propagate() {
        let registry = Arc::new(FakeRegistry::default());
        let resolver = resolver_for(&registry, Arc::new(RejectingMaterializer), Default::default());

        let err = resolver.resolve(&RawEntry::embedded(Map::new())).unwrap_err();
        assert!(matches!(err, ArrayError::Materialize(_)));
    }
}
