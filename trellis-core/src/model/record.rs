//! Model Instances
//!
//! A [`Model`] is a live, shared handle over one record. Top-level records
//! carry a [`RecordIdentifier`] and are owned by the store's record table;
//! embedded models are produced by a materializer and carry none.
//!
//! # Identity
//!
//! Cloning a `Model` clones the handle, not the record. Two handles are the
//! same instance when [`Model::ptr_eq`] holds, and `==` on models is defined
//! as that identity check. Managed arrays rely on this: resolving the same
//! position twice must hand back the same instance.
//!
//! # Tracked Arrays
//!
//! Array-valued attributes are exposed through managed arrays that the store
//! builds on first access and caches here, keyed by attribute name. The
//! model is their owner: overwriting the attribute or unloading the model
//! destroys them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use super::identifier::{normalize_model_name, RecordIdentifier};
use crate::array::ManagedArray;

/// A live model instance.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

struct ModelInner {
    /// Store identity; `None` for embedded models.
    identifier: Option<RecordIdentifier>,

    /// Normalized model name.
    model_name: String,

    /// Raw attribute payload as supplied by the document.
    attributes: RwLock<Map<String, Value>>,

    /// Set once the store unloads the record.
    unloaded: AtomicBool,

    /// Managed arrays built for array-valued attributes.
    arrays: Mutex<IndexMap<String, ManagedArray>>,
}

impl Model {
    fn from_parts(
        identifier: Option<RecordIdentifier>,
        model_name: String,
        attributes: Map<String, Value>,
    ) -> Self {
        Self {
            inner: Arc::new(ModelInner {
                identifier,
                model_name,
                attributes: RwLock::new(attributes),
                unloaded: AtomicBool::new(false),
                arrays: Mutex::new(IndexMap::new()),
            }),
        }
    }

    /// Create a top-level record model.
    pub fn record(identifier: RecordIdentifier, attributes: Map<String, Value>) -> Self {
        let model_name = identifier.model_name().to_string();
        Self::from_parts(Some(identifier), model_name, attributes)
    }

    /// Create an embedded model with no store identity.
    pub fn embedded(model_name: impl AsRef<str>, attributes: Map<String, Value>) -> Self {
        Self::from_parts(None, normalize_model_name(model_name.as_ref()), attributes)
    }

    /// The record identity, if this is a top-level record.
    pub fn identifier(&self) -> Option<&RecordIdentifier> {
        self.inner.identifier.as_ref()
    }

    /// The normalized model name.
    pub fn model_name(&self) -> &str {
        &self.inner.model_name
    }

    /// Whether this model was materialized from an embedded descriptor.
    pub fn is_embedded(&self) -> bool {
        self.inner.identifier.is_none()
    }

    /// Whether the store has unloaded this record.
    pub fn is_unloaded(&self) -> bool {
        self.inner.unloaded.load(Ordering::SeqCst)
    }

    /// Read a raw attribute value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.attributes.read().get(key).cloned()
    }

    /// Snapshot of all raw attributes.
    pub fn attributes(&self) -> Map<String, Value> {
        self.inner.attributes.read().clone()
    }

    /// Overwrite a raw attribute.
    ///
    /// A managed array previously built for `key` is destroyed; if the new
    /// value is an array, the next [`Store::attribute_array`] call builds a
    /// fresh one.
    ///
    /// [`Store::attribute_array`]: crate::store::Store::attribute_array
    pub fn set_attribute(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.inner.attributes.write().insert(key.clone(), value);

        let previous = self.inner.arrays.lock().shift_remove(&key);
        if let Some(array) = previous {
            tracing::debug!(
                model = %self.model_name(),
                %key,
                "attribute overwritten, destroying tracked array"
            );
            array.destroy();
        }
    }

    /// Whether two handles refer to the same instance.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Create a weak handle that does not keep the model alive.
    pub fn downgrade(&self) -> WeakModel {
        WeakModel {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Replace the attribute payload with a freshly pushed one, destroying
    /// tracked arrays whose attribute changed.
    pub(crate) fn replace_attributes(&self, attributes: Map<String, Value>) {
        let stale: Vec<ManagedArray> = {
            let current = self.inner.attributes.read();
            let mut arrays = self.inner.arrays.lock();
            let keys: Vec<String> = arrays
                .keys()
                .filter(|key| current.get(*key) != attributes.get(*key))
                .cloned()
                .collect();
            keys.iter()
                .filter_map(|key| arrays.shift_remove(key))
                .collect()
        };
        *self.inner.attributes.write() = attributes;

        for array in stale {
            array.destroy();
        }
    }

    /// Store the current contents of the array backing `key` without
    /// tearing that array down.
    pub(crate) fn sync_array_attribute(&self, key: &str, value: Value) {
        self.inner.attributes.write().insert(key.to_string(), value);
    }

    pub(crate) fn tracked_array(&self, key: &str) -> Option<ManagedArray> {
        self.inner.arrays.lock().get(key).cloned()
    }

    /// Cache a managed array for `key`, unless one was cached concurrently;
    /// returns whichever array ends up cached.
    pub(crate) fn track_array(&self, key: &str, array: ManagedArray) -> ManagedArray {
        self.inner
            .arrays
            .lock()
            .entry(key.to_string())
            .or_insert(array)
            .clone()
    }

    /// Mark unloaded and destroy every tracked array.
    pub(crate) fn teardown(&self) {
        self.inner.unloaded.store(true, Ordering::SeqCst);

        let arrays: Vec<ManagedArray> = self
            .inner
            .arrays
            .lock()
            .drain(..)
            .map(|(_, array)| array)
            .collect();
        for array in arrays {
            array.destroy();
        }
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Model {}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("identifier", &self.inner.identifier)
            .field("model_name", &self.inner.model_name)
            .field("unloaded", &self.is_unloaded())
            .finish()
    }
}

/// Weak counterpart of [`Model`].
#[derive(Clone)]
pub struct WeakModel {
    inner: Weak<ModelInner>,
}

impl WeakModel {
    /// A handle that never upgrades.
    pub fn new() -> Self {
        Self { inner: Weak::new() }
    }

    /// Upgrade to a strong handle if the model is still alive.
    pub fn upgrade(&self) -> Option<Model> {
        self.inner.upgrade().map(|inner| Model { inner })
    }
}

impl Default for WeakModel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WeakModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakModel")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
