//! Array Observers
//!
//! Observers are notified around every structural change to an array:
//!
//! 1. `will_change` runs before anything is modified. The array still shows
//!    its old contents, and mutating it from here is refused. Destroying it
//!    is not: the change is then abandoned and no `did_change` follows.
//!
//! 2. `did_change` runs once the backing sequence and cache are consistent
//!    again, so reads from the callback see the new contents.
//!
//! Both receive the array and an [`ArrayChange`] describing one coalesced
//! splice: `removed` entries at `index` were replaced by `added` entries.
//!
//! Observers are invoked in registration order. Registering the same
//! observer twice means it is called twice.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

/// Unique identifier for a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// One coalesced structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayChange {
    /// Position of the first affected entry.
    pub index: usize,

    /// Number of entries removed at `index`.
    pub removed: usize,

    /// Number of entries inserted at `index`.
    pub added: usize,
}

impl ArrayChange {
    pub fn new(index: usize, removed: usize, added: usize) -> Self {
        Self {
            index,
            removed,
            added,
        }
    }

    /// A change that neither removes nor adds anything.
    pub fn is_noop(&self) -> bool {
        self.removed == 0 && self.added == 0
    }
}

/// Receives change notifications for arrays of type `A`.
pub trait ArrayObserver<A>: Send + Sync {
    /// Called before the change is applied.
    fn will_change(&self, _array: &A, _change: ArrayChange) {}

    /// Called after the change is applied.
    fn did_change(&self, array: &A, change: ArrayChange);
}

/// Observer built from a pair of closures.
pub struct ArrayObserverFns<W, D> {
    will: W,
    did: D,
}

impl<W, D> ArrayObserverFns<W, D> {
    pub fn new(will: W, did: D) -> Self {
        Self { will, did }
    }
}

impl<D> ArrayObserverFns<fn(), D> {
    /// Observer with only a post-change callback.
    pub fn did<A>(did: D) -> ArrayObserverFns<impl Fn(&A, ArrayChange) + Send + Sync, D>
    where
        D: Fn(&A, ArrayChange) + Send + Sync,
    {
        ArrayObserverFns {
            will: |_: &A, _: ArrayChange| {},
            did,
        }
    }
}

impl<A, W, D> ArrayObserver<A> for ArrayObserverFns<W, D>
where
    W: Fn(&A, ArrayChange) + Send + Sync,
    D: Fn(&A, ArrayChange) + Send + Sync,
{
    fn will_change(&self, array: &A, change: ArrayChange) {
        (self.will)(array, change);
    }

    fn did_change(&self, array: &A, change: ArrayChange) {
        (self.did)(array, change);
    }
}

type ObserverEntry<A> = (ObserverId, Arc<dyn ArrayObserver<A>>);

/// Ordered observer registrations for one array.
///
/// Notification works on a snapshot of the list, taken without holding the
/// lock during callbacks, so observers may register or remove observers
/// (including themselves) while being notified.
pub struct ObserverList<A> {
    observers: RwLock<Vec<ObserverEntry<A>>>,
}

impl<A> ObserverList<A> {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Append an observer and return its registration id.
    pub fn add(&self, observer: Arc<dyn ArrayObserver<A>>) -> ObserverId {
        let id = ObserverId::new();
        self.observers.write().push((id, observer));
        id
    }

    /// Remove a registration. Returns whether it existed.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.observers.write().clear();
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    fn snapshot(&self) -> SmallVec<[Arc<dyn ArrayObserver<A>>; 4]> {
        self.observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    /// Deliver a pre-change notification to every observer.
    pub fn notify_will_change(&self, array: &A, change: ArrayChange) {
        for observer in self.snapshot() {
            observer.will_change(array, change);
        }
    }

    /// Deliver a post-change notification to every observer.
    pub fn notify_did_change(&self, array: &A, change: ArrayChange) {
        for observer in self.snapshot() {
            observer.did_change(array, change);
        }
    }
}

impl<A> Default for ObserverList<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for ObserverList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("len", &self.len())
            .finish()
    }
}
