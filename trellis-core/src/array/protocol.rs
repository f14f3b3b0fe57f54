//! Array Protocol
//!
//! The ordered-collection contract generic code programs against. Anything
//! implementing [`ArrayLike`] supplies five primitives (`len`, `object_at`,
//! `replace` and observer registration) and gets the usual conveniences for
//! free. Every convenience reduces to `replace`, so an implementation cannot
//! be mutated in a way that bypasses its own bookkeeping.
//!
//! [`ensure_array`] is the entry point for helpers that accept "anything
//! array-ish": arrays that already satisfy the contract come back as the very
//! same instance, plain vectors are wrapped into a [`NativeArray`].

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::managed::ManagedArray;
use super::observer::{ArrayChange, ArrayObserver, ObserverId, ObserverList};
use crate::entry::ResolvedEntry;
use crate::error::{ArrayError, Result};
use crate::model::Model;

/// Ordered, observable collection.
pub trait ArrayLike: Sized + 'static {
    /// What reads return.
    type Item: Clone;

    /// What mutations accept.
    type Input;

    fn len(&self) -> Result<usize>;

    /// The item at `index`, or `Ok(None)` past the end.
    fn object_at(&self, index: usize) -> Result<Option<Self::Item>>;

    /// Replace `remove` items at `start` with `items`, all or nothing.
    fn replace(&self, start: usize, remove: usize, items: Vec<Self::Input>) -> Result<()>;

    fn add_array_observer(&self, observer: Arc<dyn ArrayObserver<Self>>) -> Result<ObserverId>;

    fn remove_array_observer(&self, id: ObserverId) -> bool;

    /// Whether both handles refer to the same underlying array.
    fn same_instance(&self, other: &Self) -> bool;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn push_object(&self, item: impl Into<Self::Input>) -> Result<()> {
        let len = self.len()?;
        self.replace(len, 0, vec![item.into()])
    }

    fn push_objects(&self, items: Vec<Self::Input>) -> Result<()> {
        let len = self.len()?;
        self.replace(len, 0, items)
    }

    fn unshift_object(&self, item: impl Into<Self::Input>) -> Result<()> {
        self.replace(0, 0, vec![item.into()])
    }

    /// Insert before `index`. Fails with `OutOfBounds` past the end.
    fn insert_at(&self, index: usize, item: impl Into<Self::Input>) -> Result<()> {
        self.replace(index, 0, vec![item.into()])
    }

    /// Remove and return the item at `index`, `Ok(None)` if out of range.
    fn remove_at(&self, index: usize) -> Result<Option<Self::Item>> {
        let Some(item) = self.object_at(index)? else {
            return Ok(None);
        };
        self.replace(index, 1, Vec::new())?;
        Ok(Some(item))
    }

    fn pop_object(&self) -> Result<Option<Self::Item>> {
        match self.len()? {
            0 => Ok(None),
            len => self.remove_at(len - 1),
        }
    }

    fn shift_object(&self) -> Result<Option<Self::Item>> {
        self.remove_at(0)
    }

    fn clear(&self) -> Result<()> {
        let len = self.len()?;
        self.replace(0, len, Vec::new())
    }

    fn first_object(&self) -> Result<Option<Self::Item>> {
        self.object_at(0)
    }

    fn last_object(&self) -> Result<Option<Self::Item>> {
        match self.len()? {
            0 => Ok(None),
            len => self.object_at(len - 1),
        }
    }

    /// Read every position in order.
    fn to_vec(&self) -> Result<Vec<Self::Item>> {
        let len = self.len()?;
        let mut items = Vec::with_capacity(len);
        for index in 0..len {
            if let Some(item) = self.object_at(index)? {
                items.push(item);
            }
        }
        Ok(items)
    }
}

// ----------------------------------------------------------------------------
// Native arrays
// ----------------------------------------------------------------------------

/// A plain observable array for values that need no resolution.
pub struct NativeArray<T> {
    inner: Arc<NativeInner<T>>,
}

struct NativeInner<T> {
    items: RwLock<Vec<T>>,
    observers: ObserverList<NativeArray<T>>,
}

impl<T> NativeArray<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            inner: Arc::new(NativeInner {
                items: RwLock::new(items),
                observers: ObserverList::new(),
            }),
        }
    }
}

impl<T> Default for NativeArray<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for NativeArray<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ArrayLike for NativeArray<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;
    type Input = T;

    fn len(&self) -> Result<usize> {
        Ok(self.inner.items.read().len())
    }

    fn object_at(&self, index: usize) -> Result<Option<T>> {
        Ok(self.inner.items.read().get(index).cloned())
    }

    fn replace(&self, start: usize, remove: usize, items: Vec<T>) -> Result<()> {
        let len = self.inner.items.read().len();
        if start > len || remove > len - start {
            return Err(ArrayError::OutOfBounds { start, remove, len });
        }

        let change = ArrayChange::new(start, remove, items.len());
        if change.is_noop() {
            return Ok(());
        }

        self.inner.observers.notify_will_change(self, change);
        {
            let mut current = self.inner.items.write();
            let len = current.len();
            if start > len || remove > len - start {
                return Err(ArrayError::OutOfBounds { start, remove, len });
            }
            current.splice(start..start + remove, items);
        }
        self.inner.observers.notify_did_change(self, change);
        Ok(())
    }

    fn add_array_observer(&self, observer: Arc<dyn ArrayObserver<Self>>) -> Result<ObserverId> {
        Ok(self.inner.observers.add(observer))
    }

    fn remove_array_observer(&self, id: ObserverId) -> bool {
        self.inner.observers.remove(id)
    }

    fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: fmt::Debug> fmt::Debug for NativeArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.items.read().iter()).finish()
    }
}

// ----------------------------------------------------------------------------
// Conversion
// ----------------------------------------------------------------------------

/// Values that can be viewed through the array protocol.
pub trait IntoArrayLike {
    type Array: ArrayLike;

    fn into_array_like(self) -> Self::Array;
}

impl IntoArrayLike for ManagedArray {
    type Array = ManagedArray;

    fn into_array_like(self) -> ManagedArray {
        self
    }
}

impl<T> IntoArrayLike for NativeArray<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Array = NativeArray<T>;

    fn into_array_like(self) -> NativeArray<T> {
        self
    }
}

impl<T> IntoArrayLike for Vec<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Array = NativeArray<T>;

    fn into_array_like(self) -> NativeArray<T> {
        NativeArray::from_vec(self)
    }
}

/// View `value` through the array protocol.
///
/// Arrays that already satisfy it are returned unchanged (same instance, no
/// copy); vectors are wrapped.
pub fn ensure_array<V: IntoArrayLike>(value: V) -> V::Array {
    value.into_array_like()
}

// ----------------------------------------------------------------------------
// Generic helpers
// ----------------------------------------------------------------------------

/// Items that expose named properties to [`map_by`].
pub trait KeyedValue {
    fn value_for_key(&self, key: &str) -> Option<Value>;
}

impl KeyedValue for Value {
    fn value_for_key(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(map) => map.get(key).cloned(),
            _ => None,
        }
    }
}

impl KeyedValue for Model {
    fn value_for_key(&self, key: &str) -> Option<Value> {
        self.get(key)
    }
}

impl KeyedValue for ResolvedEntry {
    fn value_for_key(&self, key: &str) -> Option<Value> {
        match self {
            ResolvedEntry::Model(model) => model.value_for_key(key),
            ResolvedEntry::Scalar(value) => value.value_for_key(key),
            ResolvedEntry::Opaque(_) | ResolvedEntry::Unresolved(_) => None,
        }
    }
}

/// `key` of every item in order, `None` where an item has no such key.
pub fn map_by<A>(array: &A, key: &str) -> Result<Vec<Option<Value>>>
where
    A: ArrayLike,
    A::Item: KeyedValue,
{
    Ok(array
        .to_vec()?
        .iter()
        .map(|item| item.value_for_key(key))
        .collect())
}

/// Every item accepted by `predicate`, in order.
pub fn collect_where<A, F>(array: &A, mut predicate: F) -> Result<Vec<A::Item>>
where
    A: ArrayLike,
    F: FnMut(&A::Item) -> bool,
{
    Ok(array
        .to_vec()?
        .into_iter()
        .filter(|item| predicate(item))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ArrayObserverFns;
    use crate::entry::RawEntry;
    use crate::store::Store;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn conveniences_reduce_to_replace() {
        let array = NativeArray::from_vec(vec![2, 3]);
        let changes = Arc::new(Mutex::new(Vec::new()));
        let changes_clone = changes.clone();
        array
            .add_array_observer(Arc::new(ArrayObserverFns::did(move |_: &NativeArray<i32>, change| {
                changes_clone.lock().push(change);
            })))
            .unwrap();

        array.unshift_object(1).unwrap();
        array.push_object(4).unwrap();
        array.insert_at(2, 9).unwrap();
        assert_eq!(array.to_vec().unwrap(), vec![1, 2, 9, 3, 4]);

        assert_eq!(array.remove_at(2).unwrap(), Some(9));
        assert_eq!(array.pop_object().unwrap(), Some(4));
        assert_eq!(array.shift_object().unwrap(), Some(1));
        assert_eq!(array.to_vec().unwrap(), vec![2, 3]);

        assert_eq!(
            changes.lock().as_slice(),
            &[
                ArrayChange::new(0, 0, 1),
                ArrayChange::new(3, 0, 1),
                ArrayChange::new(2, 0, 1),
                ArrayChange::new(2, 1, 0),
                ArrayChange::new(3, 1, 0),
                ArrayChange::new(0, 1, 0),
            ]
        );
    }

    #[test]
    fn empty_arrays() {
        let array: NativeArray<i32> = NativeArray::new();

        assert!(array.is_empty().unwrap());
        assert_eq!(array.pop_object().unwrap(), None);
        assert_eq!(array.shift_object().unwrap(), None);
        assert_eq!(array.last_object().unwrap(), None);
        assert_eq!(array.remove_at(0).unwrap(), None);
        array.clear().unwrap();
    }

    #[test]
    fn insert_past_end_is_rejected() {
        let array = NativeArray::from_vec(vec![1]);
        assert!(matches!(array.insert_at(3, 2), Err(ArrayError::OutOfBounds { .. })));
        assert_eq!(array.to_vec().unwrap(), vec![1]);
    }

    #[test]
    fn ensure_array_keeps_instances() {
        let store = Store::new();
        let managed = store.managed_array(vec![RawEntry::from(json!(1))]);
        let native = NativeArray::from_vec(vec![json!(1)]);

        assert!(ensure_array(managed.clone()).same_instance(&managed));
        assert!(ensure_array(native.clone()).same_instance(&native));

        let wrapped = ensure_array(vec![1, 2, 3]);
        assert_eq!(wrapped.len().unwrap(), 3);
    }

    #[test]
    fn ensured_arrays_share_observers() {
        let store = Store::new();
        let managed = store.managed_array(Vec::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        // Observers registered through the ensured view fire for the source array
        ensure_array(managed.clone())
            .add_array_observer(Arc::new(ArrayObserverFns::did(move |_: &ManagedArray, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })))
            .unwrap();

        managed.push_object(json!(1)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn map_by_reads_models_and_objects() {
        let store = Store::new();
        let mut attributes = serde_json::Map::new();
        attributes.insert("name".to_string(), json!("A"));
        let array = store.managed_array(vec![
            RawEntry::embedded(attributes),
            RawEntry::from(json!({ "name": "B" })),
            RawEntry::from(json!(2)),
        ]);

        assert_eq!(
            map_by(&array, "name").unwrap(),
            vec![Some(json!("A")), Some(json!("B")), None]
        );
    }

    #[test]
    fn collect_where_filters_in_order() {
        let array = NativeArray::from_vec(vec![1, 2, 3, 4]);
        let even = collect_where(&array, |n| n % 2 == 0).unwrap();
        assert_eq!(even, vec![2, 4]);
    }
}
