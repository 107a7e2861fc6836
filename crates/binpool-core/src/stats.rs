//! Point-in-time pool statistics.

use serde::Serialize;

/// Snapshot returned by [`Pool::stats`](crate::Pool::stats).
///
/// Gauges describe the state at the time of the call; counters are totals
/// since construction and survive `dealloc_all`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Pointers handed out and not yet freed.
    pub live_allocations: usize,
    /// Bytes charged to live allocations (canonical sizes for small ones).
    pub live_bytes: usize,
    /// Blocks waiting on the free lists.
    pub free_blocks: usize,
    /// Bytes left in the current arena chunk.
    pub arena_remaining: usize,
    /// Refill spans plus live large allocations.
    pub direct_pointers: usize,

    pub free_list_hits: u64,
    pub chunk_carves: u64,
    pub seeded_blocks: u64,
    pub bulk_refills: u64,
    pub direct_allocations: u64,
    pub donated_blocks: u64,
    pub abandoned_bytes: u64,
    pub unknown_pointer_errors: u64,
    pub out_of_memory_errors: u64,
    pub resets: u64,
}

impl PoolStats {
    /// Share of small allocations served straight from a free list, in permille.
    #[must_use]
    pub fn free_list_hit_rate_permille(&self) -> u16 {
        let total = self.free_list_hits + self.chunk_carves + self.bulk_refills;
        if total == 0 {
            return 0;
        }
        ((self.free_list_hits.saturating_mul(1000)) / total) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_handles_empty_pool() {
        assert_eq!(PoolStats::default().free_list_hit_rate_permille(), 0);
    }

    #[test]
    fn hit_rate_counts_all_small_paths() {
        let stats = PoolStats {
            free_list_hits: 3,
            chunk_carves: 0,
            bulk_refills: 1,
            ..PoolStats::default()
        };
        assert_eq!(stats.free_list_hit_rate_permille(), 750);
    }

    #[test]
    fn serializes_as_flat_object() {
        let stats = PoolStats {
            live_allocations: 2,
            ..PoolStats::default()
        };
        let value = serde_json::to_value(stats).unwrap();
        assert_eq!(value["live_allocations"], 2);
        assert_eq!(value["resets"], 0);
    }
}
