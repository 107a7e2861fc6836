//! Pool façade.
//!
//! Routes requests between the free-list/arena tier (sizes up to
//! `groups * bytes_inc`) and the bulk provider (everything larger), and
//! keeps the registry that lets `dealloc` work from a bare pointer.
//!
//! All state sits behind one lock, held for the whole of `alloc`, `dealloc`,
//! `dealloc_all` and the pointer size query. Refills call the bulk provider
//! while that lock is held, so a slow provider stalls every thread using the
//! pool. The default lock spins; pick [`BlockingPool`] when contention or
//! provider latency makes spinning too expensive.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use parking_lot::lock_api::{self, RawMutex};

use crate::chunk::{ChunkArena, Refill, RefillSource, Remainder};
use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::free_list::FreeListTable;
use crate::log::{Event, LifecycleLog, PoolLogLevel, PoolLogRecord};
use crate::provider::{BulkProvider, SystemProvider};
use crate::registry::AllocationRegistry;
use crate::size_class::SizeClasses;
use crate::spin::RawSpinLock;
use crate::stats::PoolStats;

/// Pool with the default spin lock.
pub type SpinPool<P = SystemProvider> = Pool<P, RawSpinLock>;

/// Pool whose lock parks contending threads instead of spinning.
pub type BlockingPool<P = SystemProvider> = Pool<P, parking_lot::RawMutex>;

#[derive(Debug, Default, Clone, Copy)]
struct PoolCounters {
    free_list_hits: u64,
    direct_allocations: u64,
    unknown_pointer_errors: u64,
    out_of_memory_errors: u64,
    resets: u64,
}

/// Everything guarded by the pool lock.
struct PoolState {
    classes: SizeClasses,
    free_lists: FreeListTable,
    arena: ChunkArena,
    registry: AllocationRegistry,
    log: LifecycleLog,
    counters: PoolCounters,
}

// SAFETY: the raw pointers inside the free lists and the arena refer to
// provider memory owned by the pool; they are only dereferenced while the
// pool lock is held, whichever thread holds it.
unsafe impl Send for PoolState {}

/// Size-class pool allocator.
///
/// ```
/// use binpool_core::{Pool, PoolConfig};
///
/// let pool = Pool::new(PoolConfig::default()).unwrap();
/// let ptr = pool.alloc(10).unwrap();
/// assert_eq!(pool.real_alloc_size_of(ptr.as_ptr()), 16);
/// pool.dealloc(ptr).unwrap();
/// assert_eq!(pool.real_alloc_size_of(ptr.as_ptr()), 0);
/// ```
pub struct Pool<P: BulkProvider = SystemProvider, R: RawMutex = RawSpinLock> {
    config: PoolConfig,
    classes: SizeClasses,
    provider: P,
    state: lock_api::Mutex<R, PoolState>,
}

impl Pool {
    /// Spin-locked pool over the C heap.
    pub fn new(config: PoolConfig) -> Result<Self> {
        Self::with_lock(config, SystemProvider)
    }
}

impl<P: BulkProvider> Pool<P, RawSpinLock> {
    /// Spin-locked pool over a custom provider.
    pub fn with_provider(config: PoolConfig, provider: P) -> Result<Self> {
        Self::with_lock(config, provider)
    }
}

impl<P: BulkProvider, R: RawMutex> Pool<P, R> {
    /// Pool with an explicit lock type, e.g. `BlockingPool::with_lock(..)`.
    pub fn with_lock(config: PoolConfig, provider: P) -> Result<Self> {
        config.validate()?;
        let classes = SizeClasses::new(config.groups, config.bytes_inc);
        let state = PoolState {
            classes,
            free_lists: FreeListTable::new(classes),
            arena: ChunkArena::new(
                classes,
                config.refill_extra_blocks,
                config.refill_span_blocks,
            ),
            registry: AllocationRegistry::new(),
            log: LifecycleLog::new(config.log_capacity, config.log_level),
            counters: PoolCounters::default(),
        };
        Ok(Self {
            config,
            classes,
            provider,
            state: lock_api::Mutex::new(state),
        })
    }

    /// Allocates at least `size` bytes.
    ///
    /// Small requests get a block of their class's canonical size; larger
    /// ones come straight from the provider at exactly `size` bytes.
    pub fn alloc(&self, size: usize) -> Result<NonNull<u8>> {
        let mut state = self.state.lock();
        if size == 0 {
            state.log.record(
                Event {
                    level: PoolLogLevel::Warn,
                    symbol: "alloc",
                    event: "zero_size",
                    ptr: None,
                    size: Some(0),
                    class: None,
                    outcome: "denied",
                },
                String::new,
            );
            return Err(PoolError::ZeroSize);
        }
        match self.classes.classify(size) {
            Some(class) => state.alloc_small(size, class, &self.provider),
            None => state.alloc_direct(size, &self.provider),
        }
    }

    /// Returns a block to the pool.
    ///
    /// Fails with [`PoolError::UnknownPointer`] for pointers the pool did
    /// not issue or already took back; nothing is modified in that case.
    pub fn dealloc(&self, ptr: NonNull<u8>) -> Result<()> {
        self.state.lock().dealloc(ptr, &self.provider)
    }

    /// Releases every provider span and large allocation and empties all
    /// bookkeeping. Every pointer issued so far becomes invalid.
    pub fn dealloc_all(&self) {
        self.state.lock().reset(&self.provider);
    }

    /// Bytes a request of `size` actually receives.
    #[must_use]
    pub fn real_alloc_size(&self, size: usize) -> usize {
        self.classes.real_size(size)
    }

    /// Bytes charged to `ptr`, or 0 when the pool does not own it.
    #[must_use]
    pub fn real_alloc_size_of(&self, ptr: *const u8) -> usize {
        self.state.lock().registry.size_of(ptr as usize)
    }

    /// Whether `ptr` is a live allocation of this pool.
    #[must_use]
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.real_alloc_size_of(ptr) != 0
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.state.lock().stats()
    }

    #[must_use]
    pub fn lifecycle_logs(&self) -> Vec<PoolLogRecord> {
        self.state.lock().log.snapshot()
    }

    pub fn drain_lifecycle_logs(&self) -> Vec<PoolLogRecord> {
        self.state.lock().log.drain()
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: BulkProvider, R: RawMutex> Drop for Pool<P, R> {
    fn drop(&mut self) {
        self.state.get_mut().reset(&self.provider);
    }
}

impl<P: BulkProvider + std::fmt::Debug, R: RawMutex> std::fmt::Debug for Pool<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl PoolState {
    fn alloc_small<P: BulkProvider>(
        &mut self,
        size: usize,
        class: usize,
        provider: &P,
    ) -> Result<NonNull<u8>> {
        let canonical = self.classes.canonical_size(class);
        let (block, path) = match self.free_lists.pop(size) {
            Some(block) => {
                self.counters.free_list_hits += 1;
                (block, "free_list_hit")
            }
            None => {
                let refill = self
                    .arena
                    .refill(size, &mut self.free_lists, &mut self.registry, provider)
                    .inspect_err(|err| self.note_oom("refill_oom", size, Some(class), err))?;
                self.note_refill(&refill);
                let path = match refill.source {
                    RefillSource::Carved { .. } => "chunk_carve",
                    RefillSource::Bulk { .. } => "bulk_refill",
                };
                (refill.block, path)
            }
        };
        let addr = block.as_ptr() as usize;
        self.registry.record(addr, canonical);
        self.log.record(
            Event {
                level: PoolLogLevel::Trace,
                symbol: "alloc",
                event: path,
                ptr: Some(addr),
                size: Some(size),
                class: Some(class),
                outcome: "success",
            },
            || format!("canonical={canonical}"),
        );
        Ok(block)
    }

    fn alloc_direct<P: BulkProvider>(&mut self, size: usize, provider: &P) -> Result<NonNull<u8>> {
        let block = provider
            .allocate(size)
            .inspect_err(|err| self.note_oom("direct_oom", size, None, err))?;
        let addr = block.as_ptr() as usize;
        self.registry.mark_direct(addr);
        self.registry.record(addr, size);
        self.counters.direct_allocations += 1;
        self.log.record(
            Event {
                level: PoolLogLevel::Trace,
                symbol: "alloc",
                event: "direct",
                ptr: Some(addr),
                size: Some(size),
                class: None,
                outcome: "success",
            },
            String::new,
        );
        Ok(block)
    }

    fn dealloc<P: BulkProvider>(&mut self, ptr: NonNull<u8>, provider: &P) -> Result<()> {
        let addr = ptr.as_ptr() as usize;
        let Some(size) = self.registry.forget(addr) else {
            self.counters.unknown_pointer_errors += 1;
            self.log.record(
                Event {
                    level: PoolLogLevel::Warn,
                    symbol: "dealloc",
                    event: "unknown_pointer",
                    ptr: Some(addr),
                    size: None,
                    class: None,
                    outcome: "denied",
                },
                || "pointer_not_present_in_registry".to_string(),
            );
            return Err(PoolError::UnknownPointer { addr });
        };

        if let Some(class) = self.classes.classify(size) {
            // SAFETY: the registry record proves the pool issued this block with
            // `size` canonical bytes, and the caller hands it back.
            unsafe { self.free_lists.push(ptr, size) };
            self.log.record(
                Event {
                    level: PoolLogLevel::Trace,
                    symbol: "dealloc",
                    event: "dealloc",
                    ptr: Some(addr),
                    size: Some(size),
                    class: Some(class),
                    outcome: "success",
                },
                || format!("path=free_list class_len={}", self.free_lists.len(class)),
            );
        } else {
            self.registry.unmark_direct(addr);
            // SAFETY: large records are only created for pointers returned by
            // `provider.allocate`, and the record was live until just now.
            unsafe { provider.release(ptr) };
            self.log.record(
                Event {
                    level: PoolLogLevel::Trace,
                    symbol: "dealloc",
                    event: "dealloc",
                    ptr: Some(addr),
                    size: Some(size),
                    class: None,
                    outcome: "success",
                },
                || "path=direct".to_string(),
            );
        }
        Ok(())
    }

    fn reset<P: BulkProvider>(&mut self, provider: &P) {
        let dropped_live = self.registry.live_count();
        let direct = self.registry.drain_direct();
        self.free_lists.reset();
        self.arena.reset();
        self.registry.clear();
        let released = direct.len();
        for addr in direct {
            if let Some(ptr) = NonNull::new(addr as *mut u8) {
                // SAFETY: direct-bulk entries are exactly the live provider spans
                // and large allocations; each is released once and forgotten.
                unsafe { provider.release(ptr) };
            }
        }
        self.counters.resets += 1;
        self.log.record(
            Event {
                level: PoolLogLevel::Info,
                symbol: "dealloc_all",
                event: "dealloc_all",
                ptr: None,
                size: None,
                class: None,
                outcome: "reset",
            },
            || format!("released={released} dropped_live={dropped_live}"),
        );
    }

    fn note_refill(&mut self, refill: &Refill) {
        match refill.source {
            RefillSource::Carved { seeded } => {
                if seeded > 0 {
                    self.log.record(
                        Event {
                            level: PoolLogLevel::Debug,
                            symbol: "alloc",
                            event: "refill_seeded",
                            ptr: Some(refill.block.as_ptr() as usize),
                            size: Some(refill.block_bytes),
                            class: Some(refill.class),
                            outcome: "seeded",
                        },
                        || format!("seeded={seeded} remaining={}", self.arena.remaining()),
                    );
                }
            }
            RefillSource::Bulk {
                span,
                span_bytes,
                remainder,
            } => {
                match remainder {
                    Remainder::Empty => {}
                    Remainder::Donated { bytes, abandoned } => self.log.record(
                        Event {
                            level: PoolLogLevel::Debug,
                            symbol: "alloc",
                            event: "remainder_donated",
                            ptr: None,
                            size: Some(bytes),
                            class: self.classes.classify(bytes),
                            outcome: "donated",
                        },
                        || format!("abandoned={abandoned}"),
                    ),
                    Remainder::Abandoned { bytes } => self.log.record(
                        Event {
                            level: PoolLogLevel::Debug,
                            symbol: "alloc",
                            event: "remainder_abandoned",
                            ptr: None,
                            size: Some(bytes),
                            class: None,
                            outcome: "abandoned",
                        },
                        String::new,
                    ),
                }
                self.log.record(
                    Event {
                        level: PoolLogLevel::Info,
                        symbol: "alloc",
                        event: "bulk_refill",
                        ptr: Some(span.as_ptr() as usize),
                        size: Some(span_bytes),
                        class: Some(refill.class),
                        outcome: "refilled",
                    },
                    || format!("block_bytes={}", refill.block_bytes),
                );
            }
        }
    }

    fn note_oom(&mut self, event: &'static str, size: usize, class: Option<usize>, err: &PoolError) {
        self.counters.out_of_memory_errors += 1;
        self.log.record(
            Event {
                level: PoolLogLevel::Warn,
                symbol: "alloc",
                event,
                ptr: None,
                size: Some(size),
                class,
                outcome: "oom",
            },
            || err.to_string(),
        );
    }

    fn stats(&self) -> PoolStats {
        let arena = self.arena.counters();
        PoolStats {
            live_allocations: self.registry.live_count(),
            live_bytes: self.registry.live_bytes(),
            free_blocks: self.free_lists.total_blocks(),
            arena_remaining: self.arena.remaining(),
            direct_pointers: self.registry.direct_count(),
            free_list_hits: self.counters.free_list_hits,
            chunk_carves: arena.carves,
            seeded_blocks: arena.seeded_blocks,
            bulk_refills: arena.bulk_refills,
            direct_allocations: self.counters.direct_allocations,
            donated_blocks: arena.donated_blocks,
            abandoned_bytes: arena.abandoned_bytes,
            unknown_pointer_errors: self.counters.unknown_pointer_errors,
            out_of_memory_errors: self.counters.out_of_memory_errors,
            resets: self.counters.resets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TrackingProvider;
    use std::sync::Arc;

    fn tracked(config: PoolConfig) -> SpinPool<TrackingProvider> {
        Pool::with_provider(config, TrackingProvider::new(SystemProvider)).unwrap()
    }

    fn traced() -> PoolConfig {
        PoolConfig::default().with_logging(1024, PoolLogLevel::Trace)
    }

    #[test]
    fn test_new_pool_is_empty() {
        let pool = Pool::new(PoolConfig::default()).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.live_allocations, 0);
        assert_eq!(stats.free_blocks, 0);
        assert_eq!(stats.arena_remaining, 0);
        assert_eq!(pool.config().max_small_size(), 192);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = Pool::new(PoolConfig::new(0, 8)).unwrap_err();
        assert!(matches!(err, PoolError::Config(_)));
    }

    #[test]
    fn test_alloc_zero_is_an_error() {
        let pool = tracked(PoolConfig::default());
        assert_eq!(pool.alloc(0), Err(PoolError::ZeroSize));
        assert_eq!(pool.provider().snapshot().allocations, 0);
    }

    #[test]
    fn test_small_alloc_records_canonical_size() {
        let pool = tracked(PoolConfig::default());
        let ptr = pool.alloc(10).unwrap();
        assert_eq!(pool.real_alloc_size_of(ptr.as_ptr()), 16);
        assert!(pool.contains(ptr.as_ptr()));
        assert_eq!(pool.stats().live_bytes, 16);
    }

    #[test]
    fn test_large_alloc_is_exact_and_direct() {
        let pool = tracked(PoolConfig::default());
        let ptr = pool.alloc(193).unwrap();
        assert_eq!(pool.real_alloc_size_of(ptr.as_ptr()), 193);
        assert!(pool.provider().is_live(ptr.as_ptr()));
        assert_eq!(pool.stats().direct_allocations, 1);

        pool.dealloc(ptr).unwrap();
        assert!(!pool.provider().is_live(ptr.as_ptr()));
        assert_eq!(pool.stats().direct_pointers, 0);
    }

    #[test]
    fn test_dealloc_recycles_small_block() {
        let pool = tracked(PoolConfig::default());
        let ptr = pool.alloc(24).unwrap();
        pool.dealloc(ptr).unwrap();
        assert_eq!(pool.real_alloc_size_of(ptr.as_ptr()), 0);
        let again = pool.alloc(17).unwrap();
        assert_eq!(again, ptr);
        assert_eq!(pool.stats().free_list_hits, 1);
    }

    #[test]
    fn test_double_free_is_reported() {
        let pool = tracked(PoolConfig::default());
        let ptr = pool.alloc(32).unwrap();
        pool.dealloc(ptr).unwrap();
        let before = pool.stats().free_blocks;
        assert_eq!(
            pool.dealloc(ptr),
            Err(PoolError::UnknownPointer {
                addr: ptr.as_ptr() as usize
            })
        );
        assert_eq!(pool.stats().free_blocks, before);
        assert_eq!(pool.stats().unknown_pointer_errors, 1);
    }

    #[test]
    fn test_refill_oom_propagates() {
        let pool = Pool::with_provider(
            PoolConfig::default(),
            TrackingProvider::with_budget(SystemProvider, 0),
        )
        .unwrap();
        assert_eq!(pool.alloc(8), Err(PoolError::OutOfMemory { requested: 88 }));
        assert_eq!(pool.alloc(500), Err(PoolError::OutOfMemory { requested: 500 }));
        let stats = pool.stats();
        assert_eq!(stats.live_allocations, 0);
        assert_eq!(stats.out_of_memory_errors, 2);
        assert_eq!(stats.direct_pointers, 0);
    }

    #[test]
    fn test_dealloc_all_releases_every_span() {
        let pool = tracked(PoolConfig::default());
        for size in [8, 8, 100, 192, 1000, 4096] {
            pool.alloc(size).unwrap();
        }
        assert!(pool.provider().snapshot().live_spans > 0);
        pool.dealloc_all();
        assert_eq!(pool.provider().snapshot().live_spans, 0);
        let stats = pool.stats();
        assert_eq!(stats.live_allocations, 0);
        assert_eq!(stats.free_blocks, 0);
        assert_eq!(stats.arena_remaining, 0);
        assert_eq!(stats.resets, 1);
    }

    #[test]
    fn test_drop_releases_provider_memory() {
        let provider = Arc::new(TrackingProvider::new(SystemProvider));
        {
            let pool = Pool::with_provider(PoolConfig::default(), Arc::clone(&provider)).unwrap();
            pool.alloc(16).unwrap();
            pool.alloc(4096).unwrap();
        }
        assert_eq!(provider.snapshot().live_spans, 0);
    }

    #[test]
    fn test_blocking_pool_behaves_the_same() {
        let pool = BlockingPool::with_lock(PoolConfig::default(), SystemProvider).unwrap();
        let ptr = pool.alloc(10).unwrap();
        assert_eq!(pool.real_alloc_size_of(ptr.as_ptr()), 16);
        pool.dealloc(ptr).unwrap();
        assert_eq!(pool.real_alloc_size_of(ptr.as_ptr()), 0);
    }

    #[test]
    fn test_lifecycle_logs_include_trace_and_decision_ids() {
        let pool = tracked(traced());
        let ptr = pool.alloc(64).unwrap();
        pool.dealloc(ptr).unwrap();

        let logs = pool.drain_lifecycle_logs();
        assert!(!logs.is_empty());
        assert!(logs.iter().all(|entry| entry.decision_id > 0));
        assert!(
            logs.iter()
                .all(|entry| entry.trace_id.starts_with("binpool::"))
        );
        assert!(logs.iter().any(|entry| {
            entry.level == PoolLogLevel::Info && entry.event == "bulk_refill"
        }));
        assert!(logs.iter().any(|entry| {
            entry.level == PoolLogLevel::Trace && entry.symbol == "dealloc"
        }));
        assert!(pool.lifecycle_logs().is_empty());
    }

    #[test]
    fn test_lifecycle_logs_warn_on_unknown_pointer_and_oom() {
        let pool = Pool::with_provider(
            PoolConfig::default(),
            TrackingProvider::with_budget(SystemProvider, 0),
        )
        .unwrap();
        let mut local = 0u64;
        let foreign = NonNull::from(&mut local).cast::<u8>();
        assert!(pool.dealloc(foreign).is_err());
        assert!(pool.alloc(16).is_err());

        let logs = pool.drain_lifecycle_logs();
        assert!(logs.iter().any(|entry| {
            entry.level == PoolLogLevel::Warn && entry.event == "unknown_pointer"
        }));
        assert!(logs.iter().any(|entry| {
            entry.level == PoolLogLevel::Warn && entry.event == "refill_oom"
        }));
    }

    #[test]
    fn test_lifecycle_logs_debug_for_seed_and_donation() {
        let pool = tracked(traced());
        pool.alloc(8).unwrap();
        pool.alloc(8).unwrap();
        pool.alloc(96).unwrap();

        let logs = pool.drain_lifecycle_logs();
        let seeded = logs
            .iter()
            .find(|entry| entry.event == "refill_seeded")
            .expect("carve should seed the free list");
        assert_eq!(seeded.details, "seeded=5 remaining=32");
        let donated = logs
            .iter()
            .find(|entry| entry.event == "remainder_donated")
            .expect("32 leftover bytes should be donated");
        assert_eq!(donated.size, Some(32));
        assert_eq!(donated.class, Some(3));
    }

    #[test]
    fn test_accounting_invariant_under_deterministic_trace() {
        fn lcg(state: &mut u64) -> u64 {
            *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            *state
        }

        let pool = tracked(PoolConfig::default());
        let bound = pool.config().max_small_size();
        let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();
        let mut rng = 0xA5A5_5A5A_DEAD_BEEFu64;

        for _ in 0..1500 {
            let r = lcg(&mut rng);
            if r % 3 != 0 || live.is_empty() {
                let size = ((r >> 8) as usize % (bound * 2)).max(1);
                let ptr = pool.alloc(size).unwrap();
                live.push((ptr, pool.real_alloc_size(size)));
            } else {
                let idx = (r >> 16) as usize % live.len();
                let (ptr, _) = live.swap_remove(idx);
                pool.dealloc(ptr).unwrap();
            }

            let stats = pool.stats();
            assert_eq!(stats.live_allocations, live.len());
            let expected: usize = live.iter().map(|&(_, size)| size).sum();
            assert_eq!(stats.live_bytes, expected);
        }
    }
}
