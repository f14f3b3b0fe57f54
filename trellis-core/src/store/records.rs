//! Record Store
//!
//! A minimal in-memory record store: the owner of top-level records, the
//! registry managed arrays resolve references against, and the factory that
//! hands out managed arrays wired to both.
//!
//! # Unloading
//!
//! [`Store::unload_record`] runs in three steps, with no store lock held
//! during the last two:
//!
//! 1. remove the record from the table,
//! 2. tear the record down (its own tracked arrays are destroyed),
//! 3. deliver the unload event to every array that holds the record.

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::registry::{ListenerId, RecordRegistry, UnloadListener, UnloadRegistry};
use crate::array::{ArrayContext, ManagedArray};
use crate::config::StoreConfig;
use crate::entry::RawEntry;
use crate::error::StoreError;
use crate::model::{Document, Model, RecordIdentifier, ResourceObject};
use crate::resolve::{EmbeddedModelCache, Materializer, Resolver};
use crate::schema::{DefaultSchema, Schema};

type Result<T> = std::result::Result<T, StoreError>;

/// Shared store state.
struct StoreInner {
    config: StoreConfig,
    schema: Arc<dyn Schema>,
    materializer: Arc<dyn Materializer>,
    records: RwLock<IndexMap<RecordIdentifier, Model>>,
    unloads: UnloadRegistry,
}

impl RecordRegistry for StoreInner {
    fn peek_record(&self, identifier: &RecordIdentifier) -> Option<Model> {
        self.records.read().get(identifier).cloned()
    }

    fn subscribe_unload(
        &self,
        identifier: &RecordIdentifier,
        listener_id: ListenerId,
        listener: Weak<dyn UnloadListener>,
    ) {
        self.unloads.subscribe(identifier, listener_id, listener);
    }

    fn unsubscribe_unload(&self, identifier: &RecordIdentifier, listener_id: ListenerId) {
        self.unloads.unsubscribe(identifier, listener_id);
    }
}

/// Handle to a record store. Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// A store with the default configuration, schema and materializer.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn schema(&self) -> &Arc<dyn Schema> {
        &self.inner.schema
    }

    /// Insert a record, or refresh the attributes of the one already loaded
    /// under `identifier`. Returns the live model.
    pub fn push_record(
        &self,
        identifier: RecordIdentifier,
        attributes: Map<String, Value>,
    ) -> Model {
        let existing = self.inner.records.read().get(&identifier).cloned();
        if let Some(model) = existing {
            model.replace_attributes(attributes);
            return model;
        }

        let model = {
            let mut records = self.inner.records.write();
            records
                .entry(identifier.clone())
                .or_insert_with(|| Model::record(identifier.clone(), attributes))
                .clone()
        };
        tracing::debug!(record = %identifier, "record pushed");
        model
    }

    fn push_resource(&self, resource: ResourceObject) -> Model {
        let identifier = resource.identifier();
        self.push_record(identifier, resource.attributes)
    }

    /// Load a document: included resources first, then primary data.
    /// Returns the primary models in document order.
    pub fn push_document(&self, document: Document) -> Vec<Model> {
        for resource in document.included {
            self.push_resource(resource);
        }

        document
            .data
            .into_vec()
            .into_iter()
            .map(|resource| self.push_resource(resource))
            .collect()
    }

    /// Parse and load a JSON document.
    pub fn push_json(&self, json: &str) -> Result<Vec<Model>> {
        let document = Document::from_json(json)?;
        Ok(self.push_document(document))
    }

    /// The live model for `identifier`, if loaded.
    pub fn peek_record(&self, identifier: &RecordIdentifier) -> Option<Model> {
        self.inner.peek_record(identifier)
    }

    pub fn record_count(&self) -> usize {
        self.inner.records.read().len()
    }

    /// Remove a record and notify every array holding it.
    pub fn unload_record(&self, identifier: &RecordIdentifier) -> Result<()> {
        let removed = self.inner.records.write().shift_remove(identifier);
        let Some(record) = removed else {
            return Err(StoreError::RecordNotFound(identifier.clone()));
        };

        record.teardown();
        tracing::debug!(record = %identifier, "record unloaded");
        self.inner.unloads.notify_unloaded(identifier, &record);
        self.inner.materializer.release_unused();
        Ok(())
    }

    /// Number of unload registrations held for `identifier`.
    pub fn unload_subscriptions(&self, identifier: &RecordIdentifier) -> usize {
        self.inner.unloads.subscription_count(identifier)
    }

    /// Collaborators for arrays created by this store.
    pub fn array_context(&self) -> ArrayContext {
        let registry: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let resolver = Resolver::new(
            registry,
            Arc::clone(&self.inner.materializer),
            self.inner.config.missing_reference,
        );
        ArrayContext::new(
            resolver,
            Arc::clone(&self.inner.schema),
            self.inner.config.track_unloads,
        )
    }

    /// An array over `raw` that belongs to no model.
    pub fn managed_array(&self, raw: Vec<RawEntry>) -> ManagedArray {
        ManagedArray::new(raw, self.array_context())
    }

    /// The managed array for an array-valued attribute of `model`.
    ///
    /// Built on first access by classifying every element through the schema
    /// and cached on the model, so later calls return the same instance
    /// until the attribute is overwritten. `Ok(None)` if the attribute is
    /// missing or not an array.
    pub fn attribute_array(&self, model: &Model, key: &str) -> Result<Option<ManagedArray>> {
        if let Some(array) = model.tracked_array(key) {
            return Ok(Some(array));
        }
        if model.is_unloaded() {
            if let Some(identifier) = model.identifier() {
                return Err(StoreError::Unloaded(identifier.clone()));
            }
        }

        let Some(Value::Array(values)) = model.get(key) else {
            return Ok(None);
        };

        let raw = self.inner.schema.compute_array(key, values, model.model_name());
        let array = ManagedArray::with_owner(raw, self.array_context(), model, key);
        let tracked = model.track_array(key, array.clone());
        if !tracked.same_instance(&array) {
            array.destroy();
        }

        tracing::debug!(model = %model.model_name(), %key, "attribute array built");
        Ok(Some(tracked))
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.config)
            .field("records", &self.record_count())
            .finish()
    }
}

/// Builder for a [`Store`].
#[derive(Default)]
pub struct StoreBuilder {
    config: StoreConfig,
    schema: Option<Arc<dyn Schema>>,
    materializer: Option<Arc<dyn Materializer>>,
}

impl StoreBuilder {
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn schema(mut self, schema: Arc<dyn Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn materializer(mut self, materializer: Arc<dyn Materializer>) -> Self {
        self.materializer = Some(materializer);
        self
    }

    pub fn build(self) -> Store {
        let schema: Arc<dyn Schema> = match self.schema {
            Some(schema) => schema,
            None => Arc::new(DefaultSchema),
        };
        let materializer: Arc<dyn Materializer> = match self.materializer {
            Some(materializer) => materializer,
            None => Arc::new(EmbeddedModelCache::new()),
        };

        Store {
            inner: Arc::new(StoreInner {
                config: self.config,
                schema,
                materializer,
                records: RwLock::new(IndexMap::new()),
                unloads: UnloadRegistry::new(),
            }),
        }
    }
}
