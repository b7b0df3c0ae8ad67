//! Fixed-capacity insertion-ordered ring buffer with overwrite-oldest
//! semantics.
//!
//! One [`RingBuffer`] backs each history tier. The buffer is purely
//! mechanical: it knows nothing about timestamps or aggregation. Storage is a
//! `heapless::Vec` arena reserved up front, so no allocation happens after
//! construction and the same type serves all three entry sizes.
//!
//! Logical index 0 is always the oldest live entry and `count - 1` the
//! newest. Once `count == N`, inserting overwrites the slot at the write
//! cursor and advances it. Trimming the oldest entries is bookkeeping only
//! (`count` shrinks); the arena is never moved.

use heapless::Vec;

use crate::error::HistoryError;

/// Fixed-capacity ring buffer over `N` slots of `T`.
///
/// Invariants, upheld after every operation: `head < N` and `count <= N`.
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    /// Physical arena. Grows to `N` once and is then overwritten in place.
    slots: Vec<T, N>,
    /// Next physical slot to write.
    head: usize,
    /// Number of live logical entries.
    count: usize,
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> RingBuffer<T, N> {
    pub const fn new() -> Self {
        const { assert!(N > 0, "ring buffer capacity must be non-zero") };
        Self {
            slots: Vec::new(),
            head: 0,
            count: 0,
        }
    }

    /// Insert `item`, overwriting the oldest entry when the buffer is full.
    pub fn insert(&mut self, item: T) {
        if self.slots.len() < N {
            // Arena not yet fully populated: `head` equals the append slot.
            let _ = self.slots.push(item);
        } else {
            self.slots[self.head] = item;
        }
        self.head = (self.head + 1) % N;
        if self.count < N {
            self.count += 1;
        }
    }

    /// Fetch the entry at `index` in logical (oldest-first) order.
    pub fn get(&self, index: usize) -> Result<&T, HistoryError> {
        if index >= self.count {
            return Err(HistoryError::OutOfRange {
                index,
                len: self.count,
            });
        }
        let phys = (self.head + N - self.count + index) % N;
        self.slots.get(phys).ok_or(HistoryError::OutOfRange {
            index,
            len: self.count,
        })
    }

    /// The newest live entry, if any.
    pub fn latest(&self) -> Option<&T> {
        self.get(self.count.checked_sub(1)?).ok()
    }

    /// The oldest live entry, if any.
    pub fn oldest(&self) -> Option<&T> {
        self.get(0).ok()
    }

    /// Iterate the live entries oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.count).filter_map(|i| self.get(i).ok())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Current write-cursor position (diagnostics only).
    pub fn head_position(&self) -> usize {
        self.head
    }

    /// Drop every entry and rewind the cursor.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
        self.count = 0;
    }

    /// Discard the `n` logically oldest entries without touching the arena.
    pub fn trim_oldest(&mut self, n: usize) {
        self.count = self.count.saturating_sub(n);
    }

    /// Structural invariant check: cursor in bounds and count covered by
    /// physically written slots. Only a restore from persistence can break
    /// these.
    pub fn is_structurally_valid(&self) -> bool {
        self.head < N && self.count <= N && self.count <= self.slots.len()
    }
}

impl<T: Clone, const N: usize> RingBuffer<T, N> {
    /// Rebuild a buffer from persisted raw parts without validation.
    ///
    /// The caller is expected to run an integrity pass afterwards; a
    /// corrupted `head`/`count` pair is detected there, not here.
    pub(crate) fn from_raw_parts(slots: &[T], head: usize, count: usize) -> Self {
        let mut arena: Vec<T, N> = Vec::new();
        let _ = arena.extend_from_slice(&slots[..slots.len().min(N)]);
        Self {
            slots: arena,
            head,
            count,
        }
    }

    /// Physical arena contents plus cursor bookkeeping, for persistence.
    pub(crate) fn raw_parts(&self) -> (&[T], usize, usize) {
        (&self.slots, self.head, self.count)
    }
}
