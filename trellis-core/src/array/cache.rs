//! Resolution Cache
//!
//! Position-indexed memo table for a managed array. Slot `i` holds the
//! resolved value of the raw entry currently at position `i`, or nothing if
//! the position has not been read since it last changed.
//!
//! # Correctness, Not Capacity
//!
//! This is not a size-bounded cache. It always has exactly one slot per
//! array position, and a slot is dropped only when the value it holds may no
//! longer describe its position:
//!
//! - `splice` + `invalidate_range`: a structural change at `start` shifts
//!   every later position, so the array invalidates `start..len`.
//! - `evict`: an unload removes a position and slides the later slots down
//!   together with their raw entries, so they stay valid.
//!
//! A slot is either clean (holds a value) or dirty (needs resolving on the
//! next read).

use crate::entry::ResolvedEntry;

/// Per-position resolved values.
#[derive(Debug, Clone, Default)]
pub struct ResolutionCache {
    slots: Vec<Option<ResolvedEntry>>,
}

impl ResolutionCache {
    /// Create an empty cache sized for `len` positions.
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    /// Number of positions covered.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The cached value for `index`, if resolved.
    pub fn get(&self, index: usize) -> Option<&ResolvedEntry> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Store the resolved value for `index`. Out-of-range indices are ignored.
    pub fn fill(&mut self, index: usize, value: ResolvedEntry) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(value);
        }
    }

    /// Forget the value for `index`.
    pub fn invalidate(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = None;
        }
    }

    /// Forget the values for `start..start + len`, clamped to the cache.
    pub fn invalidate_range(&mut self, start: usize, len: usize) {
        let end = start.saturating_add(len).min(self.slots.len());
        if start < end {
            self.slots[start..end].fill(None);
        }
    }

    /// Resize around a structural change: `removed` slots at `start` are
    /// replaced by `added` empty ones.
    ///
    /// Slots after the change keep their values; callers that cannot vouch
    /// for them must invalidate them.
    pub fn splice(&mut self, start: usize, removed: usize, added: usize) {
        let start = start.min(self.slots.len());
        let end = start.saturating_add(removed).min(self.slots.len());
        self.slots
            .splice(start..end, std::iter::repeat(None).take(added));
    }

    /// Remove the slot at `index`, shifting later slots down by one.
    pub fn evict(&mut self, index: usize) -> Option<ResolvedEntry> {
        if index < self.slots.len() {
            self.slots.remove(index)
        } else {
            None
        }
    }

    /// Number of positions holding a resolved value.
    pub fn resolved_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Iterate over resolved positions.
    pub fn resolved(&self) -> impl Iterator<Item = (usize, &ResolvedEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (index, value)))
    }

    /// Drop every slot.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
