//! Model Materialization
//!
//! Turns embedded descriptors into model instances. The resolver relies on
//! one property only: materializing the same descriptor identity twice
//! yields the same instance.
//!
//! [`EmbeddedModelCache`] provides that by memoizing on [`DescriptorId`].
//! A memoized model is held strongly for as long as its descriptor is alive,
//! so state set on the model survives arrays dropping their cached
//! positions. Entries whose descriptor has been dropped are purged: every
//! time the table doubles past its last purged size, and whenever the store
//! calls [`Materializer::release_unused`].

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::entry::{DescriptorId, EmbeddedDescriptor, WeakDescriptor};
use crate::error::MaterializeError;
use crate::model::Model;

/// Builds or reuses the model instance for an embedded descriptor.
pub trait Materializer: Send + Sync {
    /// Must be idempotent per `descriptor.id()` while the descriptor is
    /// alive.
    fn materialize(&self, descriptor: &EmbeddedDescriptor) -> Result<Model, MaterializeError>;

    /// Forget models whose descriptor no longer exists. Called after
    /// records are unloaded and arrays destroyed.
    fn release_unused(&self) {}
}

/// Model name given to descriptors that do not carry one.
pub const EMBEDDED_MODEL_NAME: &str = "embedded";

/// Table size below which materialization never triggers a purge.
const PURGE_FLOOR: usize = 64;

struct Memo {
    descriptor: WeakDescriptor,
    model: Model,
}

/// Default materializer: one embedded model per descriptor identity.
pub struct EmbeddedModelCache {
    models: DashMap<DescriptorId, Memo>,
    purge_at: AtomicUsize,
}

impl EmbeddedModelCache {
    pub fn new() -> Self {
        Self {
            models: DashMap::new(),
            purge_at: AtomicUsize::new(PURGE_FLOOR),
        }
    }

    /// Number of table entries, including ones not yet purged.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Drop entries whose descriptor is no longer alive.
    pub fn purge(&self) {
        let before = self.models.len();
        self.models.retain(|_, memo| memo.descriptor.is_alive());
        let after = self.models.len();
        self.purge_at.store((after * 2).max(PURGE_FLOOR), Ordering::Relaxed);

        if before != after {
            tracing::trace!(released = before - after, remaining = after, "embedded models purged");
        }
    }
}

impl Default for EmbeddedModelCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EmbeddedModelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedModelCache")
            .field("len", &self.models.len())
            .field("purge_at", &self.purge_at.load(Ordering::Relaxed))
            .finish()
    }
}

impl Materializer for EmbeddedModelCache {
    fn materialize(&self, descriptor: &EmbeddedDescriptor) -> Result<Model, MaterializeError> {
        if let Some(memo) = self.models.get(&descriptor.id()) {
            return Ok(memo.model.clone());
        }

        // The entry guard must be gone before purging touches the shards
        let model = {
            let memo = self.models.entry(descriptor.id()).or_insert_with(|| Memo {
                descriptor: descriptor.downgrade(),
                model: Model::embedded(
                    descriptor.model_name().unwrap_or(EMBEDDED_MODEL_NAME),
                    descriptor.attributes().clone(),
                ),
            });
            memo.model.clone()
        };

        if self.models.len() >= self.purge_at.load(Ordering::Relaxed) {
            self.purge();
        }
        Ok(model)
    }

    fn release_unused(&self) {
        self.purge();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    fn descriptor(value: Value) -> EmbeddedDescriptor {
        match value {
            Value::Object(map) => EmbeddedDescriptor::new(map),
            _ => EmbeddedDescriptor::new(Map::new()),
        }
    }

    #[test]
    fn same_descriptor_yields_same_model() {
        let cache = EmbeddedModelCache::new();
        let chapter = descriptor(json!({ "name": "The Boy Who Lived" }));

        let first = cache.materialize(&chapter).unwrap();
        let second = cache.materialize(&chapter.clone()).unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(first.get("name"), Some(json!("The Boy Who Lived")));
        assert!(first.is_embedded());
    }

    #[test]
    fn distinct_descriptors_yield_distinct_models() {
        let cache = EmbeddedModelCache::new();
        let a = cache.materialize(&descriptor(json!({ "name": "A" }))).unwrap();
        let b = cache.materialize(&descriptor(json!({ "name": "A" }))).unwrap();
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn descriptor_model_name_is_used() {
        let cache = EmbeddedModelCache::new();
        let named =
            EmbeddedDescriptor::with_model_name("com.example.bookstore.Chapter", Map::new());

        let model = cache.materialize(&named).unwrap();
        assert_eq!(model.model_name(), "com.example.bookstore.chapter");

        let unnamed = cache.materialize(&descriptor(json!({}))).unwrap();
        assert_eq!(unnamed.model_name(), EMBEDDED_MODEL_NAME);
    }

    #[test]
    fn models_outlive_their_handles_while_the_descriptor_lives() {
        let cache = EmbeddedModelCache::new();
        let chapter = descriptor(json!({ "name": "A" }));

        let model = cache.materialize(&chapter).unwrap();
        model.set_attribute("name", json!("A-edited"));
        drop(model);
        cache.purge();

        let again = cache.materialize(&chapter).unwrap();
        assert_eq!(again.get("name"), Some(json!("A-edited")));
        assert_eq!(cache.len(), 1);

        drop(again);
        drop(chapter);
        cache.release_unused();
        assert!(cache.is_empty());
    }

    #[test]
    fn table_stays_bounded_as_descriptors_come_and_go() {
        let cache = EmbeddedModelCache::new();
        let kept = descriptor(json!({ "name": "kept" }));
        let kept_model = cache.materialize(&kept).unwrap();

        for i in 0..1_000 {
            let transient = descriptor(json!({ "name": i }));
            cache.materialize(&transient).unwrap();
        }

        assert!(cache.len() <= 2 * PURGE_FLOOR, "table grew to {}", cache.len());
        assert!(cache.materialize(&kept).unwrap().ptr_eq(&kept_model));
    }
}
