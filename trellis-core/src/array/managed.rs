//! Managed Array
//!
//! The ordered container behind array-valued attributes. It owns:
//!
//! - the backing sequence of [`RawEntry`] values (source of truth for order
//!   and identity),
//! - a [`ResolutionCache`] with one slot per position,
//! - the observer list, and
//! - the set of records it has asked the registry to report unloads for.
//!
//! # Reads
//!
//! [`ManagedArray::object_at`] returns the cached value for a position or
//! resolves the raw entry, caches the result, and returns it. No lock is held
//! while the resolver runs. If the array changed in the meantime (tracked by
//! a generation counter) the result is returned but not cached.
//!
//! # Writes
//!
//! Every structural change, whether it comes from `replace`, a convenience
//! method, or an unload eviction, goes through one commit path:
//!
//! 1. refuse if the array is resolving or delivering `will_change`,
//! 2. validate the change against the current length (nothing happens on
//!    failure),
//! 3. `will_change` observers,
//! 4. splice the backing sequence and the cache, invalidate from the change
//!    onwards, bump the generation,
//! 5. subscribe to unloads for identities that entered,
//! 6. `did_change` observers,
//! 7. for owned arrays, store the new contents in the owner's attribute and
//!    hand them to the schema, embedded payloads swapped for their live
//!    models.
//!
//! A `will_change` observer that destroys the array abandons the change:
//! `commit` returns [`ArrayError::Destroyed`], and since destroying detaches
//! every observer no `did_change` follows.
//!
//! # Reentrancy
//!
//! Resolving a position may run arbitrary materializer or registry code.
//! That code must not mutate the array being resolved; if it tries, the
//! mutation fails with [`ArrayError::ReentrantMutation`] instead of
//! corrupting positions. Reads during resolution are fine.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexSet;
use parking_lot::RwLock;
use serde_json::Value;
use smallvec::SmallVec;

use super::cache::ResolutionCache;
use super::observer::{ArrayChange, ArrayObserver, ObserverId, ObserverList};
use super::protocol::{map_by, ArrayLike};
use super::scope::{MutationScope, ScopeKind};
use crate::entry::{RawEntry, ResolvedEntry};
use crate::error::{ArrayError, Result};
use crate::model::{Model, RecordIdentifier, WeakModel};
use crate::resolve::{Resolution, Resolver};
use crate::schema::Schema;
use crate::store::{ListenerId, UnloadListener};

/// Unique identifier for a managed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayId(u64);

impl ArrayId {
    /// Generate a new unique array ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ArrayId {
    fn default() -> Self {
        Self::new()
    }
}

/// Collaborators injected into an array at construction.
#[derive(Clone)]
pub struct ArrayContext {
    resolver: Resolver,
    schema: Arc<dyn Schema>,
    track_unloads: bool,
}

impl ArrayContext {
    pub fn new(resolver: Resolver, schema: Arc<dyn Schema>, track_unloads: bool) -> Self {
        Self {
            resolver,
            schema,
            track_unloads,
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn schema(&self) -> &Arc<dyn Schema> {
        &self.schema
    }
}

impl fmt::Debug for ArrayContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayContext")
            .field("resolver", &self.resolver)
            .field("track_unloads", &self.track_unloads)
            .finish()
    }
}

/// The model attribute an array backs.
#[derive(Debug, Clone)]
struct ArrayOwner {
    model: WeakModel,
    key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Lifecycle {
    Live,
    Destroyed,
}

/// Mutable state, guarded by one lock.
pub(super) struct ArrayState {
    pub(super) lifecycle: Lifecycle,
    pub(super) raw: Vec<RawEntry>,
    pub(super) cache: ResolutionCache,
    /// Set at construction when every entry is a record reference; cleared
    /// as soon as anything else is inserted.
    pub(super) all_reference: bool,
    pub(super) subscriptions: IndexSet<RecordIdentifier>,
    pub(super) generation: u64,
}

impl ArrayState {
    fn ensure_live(&self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Live => Ok(()),
            Lifecycle::Destroyed => Err(ArrayError::Destroyed),
        }
    }

    fn apply(&mut self, mutation: Mutation) -> Vec<RecordIdentifier> {
        match mutation {
            Mutation::Splice {
                start,
                remove,
                insert,
            } => {
                let added = insert.len();
                let entered: Vec<RecordIdentifier> = insert
                    .iter()
                    .filter_map(RawEntry::record_identity)
                    .cloned()
                    .collect();
                if entered.len() != added {
                    self.all_reference = false;
                }

                self.raw.splice(start..start + remove, insert);
                self.cache.splice(start, remove, added);
                let len = self.raw.len();
                self.cache.invalidate_range(start, len - start);
                entered
            }
            Mutation::Evict { indices } => {
                for &index in indices.iter().rev() {
                    self.raw.remove(index);
                    self.cache.evict(index);
                }
                Vec::new()
            }
        }
    }
}

/// A structural change, validated before it is applied.
pub(super) enum Mutation {
    /// Replace `remove` entries at `start` with `insert`.
    Splice {
        start: usize,
        remove: usize,
        insert: Vec<RawEntry>,
    },

    /// Remove the given positions (ascending, unique) as one change.
    Evict { indices: SmallVec<[usize; 4]> },
}

impl Mutation {
    fn change_for(&self, len: usize) -> Result<ArrayChange> {
        match self {
            Mutation::Splice {
                start,
                remove,
                insert,
            } => {
                if *start > len || *remove > len - *start {
                    return Err(ArrayError::OutOfBounds {
                        start: *start,
                        remove: *remove,
                        len,
                    });
                }
                Ok(ArrayChange::new(*start, *remove, insert.len()))
            }
            Mutation::Evict { indices } => {
                if let Some(&bad) = indices.iter().find(|&&index| index >= len) {
                    return Err(ArrayError::OutOfBounds {
                        start: bad,
                        remove: 1,
                        len,
                    });
                }
                let first = indices.first().copied().unwrap_or(0);
                Ok(ArrayChange::new(first, indices.len(), 0))
            }
        }
    }
}

pub(super) struct ArrayInner {
    id: ArrayId,
    listener_id: ListenerId,
    this: Weak<ArrayInner>,
    pub(super) state: RwLock<ArrayState>,
    observers: ObserverList<ManagedArray>,
    context: ArrayContext,
    owner: Option<ArrayOwner>,
}

impl ArrayInner {
    pub(super) fn handle(&self) -> Option<ManagedArray> {
        self.this.upgrade().map(|inner| ManagedArray { inner })
    }

    /// Ask the registry to report unloads for identities not yet subscribed.
    fn subscribe<I>(&self, identities: I)
    where
        I: IntoIterator<Item = RecordIdentifier>,
    {
        if !self.context.track_unloads {
            return;
        }

        let fresh: SmallVec<[RecordIdentifier; 4]> = {
            let mut state = self.state.write();
            if state.lifecycle == Lifecycle::Destroyed {
                return;
            }
            identities
                .into_iter()
                .filter(|identifier| state.subscriptions.insert(identifier.clone()))
                .collect()
        };

        if fresh.is_empty() {
            return;
        }
        let Some(registry) = self.context.resolver.registry() else {
            return;
        };

        let listener: Weak<dyn UnloadListener> = self.this.clone();
        for identifier in fresh {
            registry.subscribe_unload(&identifier, self.listener_id, listener.clone());
        }
    }

    fn unsubscribe_all(&self, subscriptions: IndexSet<RecordIdentifier>) {
        if subscriptions.is_empty() {
            return;
        }
        if let Some(registry) = self.context.resolver.registry() {
            for identifier in &subscriptions {
                registry.unsubscribe_unload(identifier, self.listener_id);
            }
        }
    }

    fn classify(&self, value: Value) -> RawEntry {
        let owner = self
            .owner
            .as_ref()
            .and_then(|owner| owner.model.upgrade().map(|model| (model, owner.key.as_str())));

        match owner {
            Some((model, key)) => {
                self.context
                    .schema
                    .compute_entry(key, value, model.model_name())
            }
            None => self.context.schema.compute_entry("", value, ""),
        }
    }

    /// Swap an embedded payload for its live model, leaving other entries
    /// as stored.
    fn live_entry(&self, entry: RawEntry) -> RawEntry {
        if !matches!(entry, RawEntry::Embedded(_)) {
            return entry;
        }
        match self.context.resolver.resolve(&entry) {
            Ok(Resolution {
                entry: ResolvedEntry::Model(model),
                ..
            }) => RawEntry::Model(model),
            Ok(_) => entry,
            Err(error) => {
                tracing::warn!(array = ?self.id, %error, "embedded entry kept raw for write-back");
                entry
            }
        }
    }
}

impl Drop for ArrayInner {
    fn drop(&mut self) {
        let subscriptions = std::mem::take(&mut self.state.get_mut().subscriptions);
        self.unsubscribe_all(subscriptions);
    }
}

/// A lazily resolving, observable array of record entries.
///
/// Cloning yields another handle to the same array.
#[derive(Clone)]
pub struct ManagedArray {
    inner: Arc<ArrayInner>,
}

impl ManagedArray {
    /// Wrap `raw` in an array that belongs to no model.
    pub fn new(raw: Vec<RawEntry>, context: ArrayContext) -> Self {
        Self::build(raw, context, None)
    }

    /// Wrap `raw` in an array backing `owner`'s attribute `key`.
    ///
    /// Every committed mutation is written into the owner's attribute and
    /// reported to the schema's `set_attribute` hook for that model and key.
    pub fn with_owner(
        raw: Vec<RawEntry>,
        context: ArrayContext,
        owner: &Model,
        key: &str,
    ) -> Self {
        Self::build(
            raw,
            context,
            Some(ArrayOwner {
                model: owner.downgrade(),
                key: key.to_string(),
            }),
        )
    }

    fn build(raw: Vec<RawEntry>, context: ArrayContext, owner: Option<ArrayOwner>) -> Self {
        let identities: Vec<RecordIdentifier> = raw
            .iter()
            .filter_map(RawEntry::record_identity)
            .cloned()
            .collect();
        let all_reference = !raw.is_empty() && identities.len() == raw.len();

        let inner = Arc::new_cyclic(|this| ArrayInner {
            id: ArrayId::new(),
            listener_id: ListenerId::new(),
            this: this.clone(),
            state: RwLock::new(ArrayState {
                lifecycle: Lifecycle::Live,
                cache: ResolutionCache::with_len(raw.len()),
                raw,
                all_reference,
                subscriptions: IndexSet::new(),
                generation: 0,
            }),
            observers: ObserverList::new(),
            context,
            owner,
        });
        inner.subscribe(identities);

        tracing::trace!(array = ?inner.id, all_reference, "managed array created");
        Self { inner }
    }

    pub fn id(&self) -> ArrayId {
        self.inner.id
    }

    /// Whether both handles refer to the same array.
    pub fn same_instance(&self, other: &ManagedArray) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of entries.
    pub fn len(&self) -> Result<usize> {
        let state = self.inner.state.read();
        state.ensure_live()?;
        Ok(state.raw.len())
    }

    /// The resolved value at `index`, or `Ok(None)` past the end.
    ///
    /// Resolves and caches the position on first access. A reference to a
    /// record that is not loaded yields the configured placeholder rather
    /// than an error.
    pub fn object_at(&self, index: usize) -> Result<Option<ResolvedEntry>> {
        let (raw, generation) = {
            let state = self.inner.state.read();
            state.ensure_live()?;
            let Some(raw) = state.raw.get(index) else {
                return Ok(None);
            };
            if let Some(hit) = state.cache.get(index) {
                return Ok(Some(hit.clone()));
            }
            (raw.clone(), state.generation)
        };

        let resolution = {
            let _scope = MutationScope::enter(self.inner.id, ScopeKind::Resolving);
            self.inner.context.resolver.resolve(&raw)?
        };

        if resolution.cacheable {
            let mut state = self.inner.state.write();
            if state.lifecycle == Lifecycle::Live && state.generation == generation {
                state.cache.fill(index, resolution.entry.clone());
                tracing::trace!(array = ?self.inner.id, index, "position resolved");
            }
        }

        // Embedded materialization may hand back a top-level record
        if let ResolvedEntry::Model(model) = &resolution.entry {
            if let Some(identifier) = model.identifier() {
                self.inner.subscribe([identifier.clone()]);
            }
        }

        Ok(Some(resolution.entry))
    }

    /// Replace `remove` entries at `start` with `entries`.
    ///
    /// This is the primitive every other mutation reduces to. Fails without
    /// touching the array if the range is out of bounds.
    pub fn replace(&self, start: usize, remove: usize, entries: Vec<RawEntry>) -> Result<()> {
        self.commit(Mutation::Splice {
            start,
            remove,
            insert: entries,
        })
        .map(|_| ())
    }

    /// Like [`replace`](Self::replace), classifying each value through the
    /// schema first.
    pub fn replace_values(&self, start: usize, remove: usize, values: Vec<Value>) -> Result<()> {
        let entries = values
            .into_iter()
            .map(|value| self.inner.classify(value))
            .collect();
        self.replace(start, remove, entries)
    }

    /// Append a value classified through the schema.
    pub fn push_value(&self, value: Value) -> Result<()> {
        let len = self.len()?;
        self.replace_values(len, 0, vec![value])
    }

    /// Resolved `key` of every entry, `None` where the entry has no such key.
    pub fn map_by(&self, key: &str) -> Result<Vec<Option<Value>>> {
        map_by(self, key)
    }

    /// Snapshot of the backing sequence.
    pub fn raw_entries(&self) -> Result<Vec<RawEntry>> {
        let state = self.inner.state.read();
        state.ensure_live()?;
        Ok(state.raw.clone())
    }

    /// Whether the array was built from record references only and has not
    /// received anything else since.
    pub fn is_all_reference(&self) -> bool {
        self.inner.state.read().all_reference
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.read().lifecycle == Lifecycle::Destroyed
    }

    /// Number of positions currently holding a resolved value.
    pub fn resolved_count(&self) -> usize {
        self.inner.state.read().cache.resolved_count()
    }

    /// Records this array is subscribed to for unload events.
    pub fn subscribed_records(&self) -> Vec<RecordIdentifier> {
        self.inner.state.read().subscriptions.iter().cloned().collect()
    }

    /// The attribute key this array backs, if owned.
    pub fn owner_key(&self) -> Option<&str> {
        self.inner.owner.as_ref().map(|owner| owner.key.as_str())
    }

    pub fn add_array_observer(
        &self,
        observer: Arc<dyn ArrayObserver<ManagedArray>>,
    ) -> Result<ObserverId> {
        self.inner.state.read().ensure_live()?;
        Ok(self.inner.observers.add(observer))
    }

    pub fn remove_array_observer(&self, id: ObserverId) -> bool {
        self.inner.observers.remove(id)
    }

    /// Tear the array down: observers are detached, unload subscriptions
    /// withdrawn and the contents released. Idempotent.
    ///
    /// Allowed from a `will_change` observer, in which case the pending
    /// change is abandoned.
    pub fn destroy(&self) {
        let (subscriptions, held_embedded) = {
            let mut state = self.inner.state.write();
            if state.lifecycle == Lifecycle::Destroyed {
                return;
            }
            state.lifecycle = Lifecycle::Destroyed;
            let held_embedded = state
                .raw
                .iter()
                .any(|entry| matches!(entry, RawEntry::Embedded(_)));
            state.raw.clear();
            state.cache.clear();
            (std::mem::take(&mut state.subscriptions), held_embedded)
        };

        self.inner.observers.clear();
        self.inner.unsubscribe_all(subscriptions);
        if held_embedded {
            self.inner.context.resolver.release_unused();
        }
        tracing::debug!(array = ?self.inner.id, key = ?self.owner_key(), "managed array destroyed");
    }

    /// Apply one structural change through the single commit path.
    pub(super) fn commit(&self, mutation: Mutation) -> Result<ArrayChange> {
        if MutationScope::active_for(self.inner.id).is_some() {
            return Err(ArrayError::ReentrantMutation);
        }

        let change = {
            let state = self.inner.state.read();
            state.ensure_live()?;
            mutation.change_for(state.raw.len())?
        };
        if change.is_noop() {
            return Ok(change);
        }

        {
            let _scope = MutationScope::enter(self.inner.id, ScopeKind::PreChange);
            self.inner.observers.notify_will_change(self, change);
        }

        let (change, entered, snapshot) = {
            let mut state = self.inner.state.write();
            state.ensure_live()?;
            let change = mutation.change_for(state.raw.len())?;
            let entered = state.apply(mutation);
            state.generation += 1;
            let snapshot = self.inner.owner.as_ref().map(|_| state.raw.clone());
            (change, entered, snapshot)
        };

        self.inner.subscribe(entered);
        tracing::debug!(
            array = ?self.inner.id,
            index = change.index,
            removed = change.removed,
            added = change.added,
            "managed array changed"
        );

        self.inner.observers.notify_did_change(self, change);

        if let (Some(owner), Some(entries)) = (&self.inner.owner, snapshot) {
            self.write_back(owner, entries);
        }

        Ok(change)
    }

    fn write_back(&self, owner: &ArrayOwner, entries: Vec<RawEntry>) {
        let Some(model) = owner.model.upgrade() else {
            return;
        };

        let entries: Vec<RawEntry> = {
            let _scope = MutationScope::enter(self.inner.id, ScopeKind::Resolving);
            entries
                .into_iter()
                .map(|entry| self.inner.live_entry(entry))
                .collect()
        };

        let value = Value::Array(entries.iter().map(RawEntry::to_value).collect());
        model.sync_array_attribute(&owner.key, value);
        self.inner
            .context
            .schema
            .set_attribute(model.model_name(), &owner.key, &entries);
    }
}

impl ArrayLike for ManagedArray {
    type Item = ResolvedEntry;
    type Input = RawEntry;

    fn len(&self) -> Result<usize> {
        ManagedArray::len(self)
    }

    fn object_at(&self, index: usize) -> Result<Option<ResolvedEntry>> {
        ManagedArray::object_at(self, index)
    }

    fn replace(&self, start: usize, remove: usize, items: Vec<RawEntry>) -> Result<()> {
        ManagedArray::replace(self, start, remove, items)
    }

    fn add_array_observer(&self, observer: Arc<dyn ArrayObserver<Self>>) -> Result<ObserverId> {
        ManagedArray::add_array_observer(self, observer)
    }

    fn remove_array_observer(&self, id: ObserverId) -> bool {
        ManagedArray::remove_array_observer(self, id)
    }

    fn same_instance(&self, other: &Self) -> bool {
        ManagedArray::same_instance(self, other)
    }
}

impl fmt::Debug for ManagedArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("ManagedArray")
            .field("id", &self.inner.id)
            .field("len", &state.raw.len())
            .field("resolved", &state.cache.resolved_count())
            .field("all_reference", &state.all_reference)
            .field("lifecycle", &state.lifecycle)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
