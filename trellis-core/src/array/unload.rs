//! Unload Pruning
//!
//! A managed array subscribes to the unload event of every record identity
//! that enters it. When one of those records is unloaded, every position
//! that refers to it is removed in a single eviction, reported to observers
//! as one change at the lowest matching index.
//!
//! A position matches the unloaded record R when:
//!
//! - its raw entry is a reference to R's identifier,
//! - its raw entry is R itself (or a model with R's identifier), or
//! - the array is not all-reference and the position's cached value is R.
//!
//! The last rule catches embedded descriptors whose materializer handed back
//! a top-level record.

use smallvec::SmallVec;

use super::managed::{ArrayInner, ArrayState, Lifecycle, Mutation};
use crate::entry::{RawEntry, ResolvedEntry};
use crate::model::{Model, RecordIdentifier};
use crate::store::UnloadListener;

impl ArrayState {
    /// Ascending positions that refer to `record`.
    pub(super) fn positions_referencing(
        &self,
        identifier: &RecordIdentifier,
        record: &Model,
    ) -> SmallVec<[usize; 4]> {
        let check_cache = !self.all_reference;

        self.raw
            .iter()
            .enumerate()
            .filter(|(index, raw)| {
                let by_raw = match raw {
                    RawEntry::Reference(reference) => reference == identifier,
                    RawEntry::Model(model) => {
                        model.ptr_eq(record) || model.identifier() == Some(identifier)
                    }
                    _ => false,
                };

                by_raw
                    || (check_cache
                        && matches!(
                            self.cache.get(*index),
                            Some(ResolvedEntry::Model(model)) if model.ptr_eq(record)
                        ))
            })
            .map(|(index, _)| index)
            .collect()
    }
}

impl UnloadListener for ArrayInner {
    fn record_unloaded(&self, identifier: &RecordIdentifier, record: &Model) {
        let Some(array) = self.handle() else {
            return;
        };

        let indices = {
            let mut state = self.state.write();
            state.subscriptions.shift_remove(identifier);
            if state.lifecycle == Lifecycle::Destroyed {
                return;
            }
            state.positions_referencing(identifier, record)
        };

        if indices.is_empty() {
            tracing::trace!(
                array = ?array.id(),
                record = %identifier,
                "unload matched no positions"
            );
            return;
        }

        let count = indices.len();
        match array.commit(Mutation::Evict { indices }) {
            Ok(change) => {
                tracing::debug!(
                    array = ?array.id(),
                    record = %identifier,
                    index = change.index,
                    count,
                    "pruned unloaded record"
                );
            }
            Err(err) => {
                tracing::warn!(
                    array = ?array.id(),
                    record = %identifier,
                    error = %err,
                    "failed to prune unloaded record"
                );
            }
        }
    }
}
