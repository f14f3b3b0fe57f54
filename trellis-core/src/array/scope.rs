//! Mutation Scope
//!
//! Tracks which managed arrays are in the middle of work that must not be
//! interleaved with a mutation of the same array:
//!
//! - resolving a position (the materializer or registry may call back into
//!   arbitrary code), and
//! - delivering pre-change notifications (observers see the old state and
//!   the pending change has already been validated against it).
//!
//! # Implementation
//!
//! A thread-local stack of entries. Entering a scope pushes an entry and the
//! returned guard pops it on drop, so the stack stays balanced even if a
//! callback panics. Nested scopes for different arrays are fine; only a
//! mutation of an array that appears anywhere on the stack is refused.

use std::cell::RefCell;

use super::ArrayId;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<ScopeEntry>> = const { RefCell::new(Vec::new()) };
}

/// What the array is busy with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Resolving a position through the resolver.
    Resolving,

    /// Delivering `will_change` notifications.
    PreChange,
}

#[derive(Debug, Clone, Copy)]
struct ScopeEntry {
    array: ArrayId,
    kind: ScopeKind,
}

/// Guard that pops the scope entry when dropped.
#[derive(Debug)]
pub struct MutationScope {
    array: ArrayId,
    kind: ScopeKind,
}

impl MutationScope {
    /// Mark `array` as busy with `kind` until the guard drops.
    pub fn enter(array: ArrayId, kind: ScopeKind) -> Self {
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().push(ScopeEntry { array, kind });
        });

        Self { array, kind }
    }

    /// The innermost busy state of `array`, if any.
    pub fn active_for(array: ArrayId) -> Option<ScopeKind> {
        SCOPE_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .rev()
                .find(|entry| entry.array == array)
                .map(|entry| entry.kind)
        })
    }

    /// Number of scopes currently entered on this thread.
    pub fn depth() -> usize {
        SCOPE_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for MutationScope {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert!(
                    entry.array == self.array && entry.kind == self.kind,
                    "MutationScope mismatch: expected {:?}/{:?}, got {:?}/{:?}",
                    self.array,
                    self.kind,
                    entry.array,
                    entry.kind
                );
            }
        });
    }
}
