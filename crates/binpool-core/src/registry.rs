//! Live-allocation bookkeeping.
//!
//! Maps every pointer currently held by a caller to the size the pool
//! charged for it, and separately remembers which pointers came straight
//! from the bulk provider (refill spans and large allocations). The second
//! set decides what gets released at teardown.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct AllocationRegistry {
    live: HashMap<usize, usize>,
    direct: HashSet<usize>,
    live_bytes: usize,
}

impl AllocationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the record for `ptr`.
    pub fn record(&mut self, ptr: usize, size: usize) {
        if let Some(previous) = self.live.insert(ptr, size) {
            self.live_bytes -= previous;
        }
        self.live_bytes += size;
    }

    /// Recorded size, or 0 when `ptr` is not a live allocation.
    #[must_use]
    pub fn size_of(&self, ptr: usize) -> usize {
        self.live.get(&ptr).copied().unwrap_or(0)
    }

    /// Removes the record, returning the size it carried.
    pub fn forget(&mut self, ptr: usize) -> Option<usize> {
        let size = self.live.remove(&ptr)?;
        self.live_bytes -= size;
        Some(size)
    }

    pub fn mark_direct(&mut self, ptr: usize) {
        self.direct.insert(ptr);
    }

    pub fn unmark_direct(&mut self, ptr: usize) -> bool {
        self.direct.remove(&ptr)
    }

    #[must_use]
    pub fn is_direct(&self, ptr: usize) -> bool {
        self.direct.contains(&ptr)
    }

    /// Takes every direct-bulk pointer out of the set.
    pub fn drain_direct(&mut self) -> Vec<usize> {
        self.direct.drain().collect()
    }

    /// Drops all records and direct-bulk entries.
    pub fn clear(&mut self) {
        self.live.clear();
        self.direct.clear();
        self.live_bytes = 0;
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    #[must_use]
    pub fn direct_count(&self) -> usize {
        self.direct.len()
    }

    /// Live `(ptr, size)` pairs, unordered.
    pub fn live(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.live.iter().map(|(&ptr, &size)| (ptr, size))
    }
}
