//! Bump-pointer arena and the refill algorithm.
//!
//! After a free-list miss the pool asks the arena for one block of the
//! missing class. The arena either carves it from its current chunk (and
//! seeds a few more same-class blocks into the free list to amortise the
//! next misses), or, when the chunk is too small, donates what is left to
//! the free lists and trades with the bulk provider for a fresh span.
//!
//! Donation happens before the provider call, so a provider failure leaves
//! an empty arena and consistent free lists behind.

#![allow(unsafe_code)]

use std::mem;
use std::ptr::NonNull;

use crate::error::{PoolError, Result};
use crate::free_list::FreeListTable;
use crate::provider::BulkProvider;
use crate::registry::AllocationRegistry;
use crate::size_class::SizeClasses;

/// What happened to the old chunk when a refill went to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remainder {
    /// Nothing was left.
    Empty,
    /// `bytes` were pushed as one free block; `abandoned` trailing bytes lost.
    Donated { bytes: usize, abandoned: usize },
    /// Too small for any class; all `bytes` lost.
    Abandoned { bytes: usize },
}

/// Where the block returned by [`ChunkArena::refill`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillSource {
    /// Carved from the current chunk; `seeded` extra blocks went to the free list.
    Carved { seeded: usize },
    /// First block of a fresh provider span.
    Bulk {
        span: NonNull<u8>,
        span_bytes: usize,
        remainder: Remainder,
    },
}

/// Outcome of a successful refill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refill {
    pub block: NonNull<u8>,
    pub class: usize,
    pub block_bytes: usize,
    pub source: RefillSource,
}

/// Running totals kept by the arena.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArenaCounters {
    pub carves: u64,
    pub seeded_blocks: u64,
    pub bulk_refills: u64,
    pub donated_blocks: u64,
    pub abandoned_bytes: u64,
}

/// Current chunk `[base, base + remaining)` plus refill policy.
#[derive(Debug)]
pub struct ChunkArena {
    classes: SizeClasses,
    extra_blocks: usize,
    span_blocks: usize,
    base: Option<NonNull<u8>>,
    remaining: usize,
    counters: ArenaCounters,
}

impl ChunkArena {
    /// Empty arena. `extra_blocks` blocks are seeded per carve and spans
    /// hold `span_blocks` blocks (one returned, the rest kept as the chunk).
    #[must_use]
    pub fn new(classes: SizeClasses, extra_blocks: usize, span_blocks: usize) -> Self {
        assert!(span_blocks >= 1, "refill span must hold at least one block");
        Self {
            classes,
            extra_blocks,
            span_blocks,
            base: None,
            remaining: 0,
            counters: ArenaCounters::default(),
        }
    }

    /// Produces one block of the class serving `size`.
    ///
    /// Spans obtained from `provider` are recorded as direct-bulk pointers
    /// in `registry` so teardown can release them.
    ///
    /// # Panics
    ///
    /// If `size` is outside the small regime.
    pub fn refill<P: BulkProvider>(
        &mut self,
        size: usize,
        free_lists: &mut FreeListTable,
        registry: &mut AllocationRegistry,
        provider: &P,
    ) -> Result<Refill> {
        let Some(class) = self.classes.classify(size) else {
            panic!(
                "arena refill with out-of-range size {size} (max {})",
                self.classes.max_small_size()
            );
        };
        let block_bytes = self.classes.canonical_size(class);

        if self.remaining >= block_bytes {
            let block = self.carve(block_bytes);
            let mut seeded = 0;
            while self.remaining >= block_bytes && seeded < self.extra_blocks {
                let extra = self.carve(block_bytes);
                // SAFETY: `extra` was just carved from the chunk and never handed out.
                unsafe { free_lists.push(extra, block_bytes) };
                seeded += 1;
            }
            self.counters.carves += 1;
            self.counters.seeded_blocks += seeded as u64;
            return Ok(Refill {
                block,
                class,
                block_bytes,
                source: RefillSource::Carved { seeded },
            });
        }

        let remainder = self.donate_remainder(free_lists);

        let span_bytes = block_bytes
            .checked_mul(self.span_blocks)
            .ok_or(PoolError::OutOfMemory {
                requested: usize::MAX,
            })?;
        let span = provider.allocate(span_bytes)?;
        registry.mark_direct(span.as_ptr() as usize);

        // SAFETY: the span is `span_bytes >= block_bytes` long.
        self.base = Some(unsafe { span.add(block_bytes) });
        self.remaining = span_bytes - block_bytes;
        self.counters.bulk_refills += 1;

        Ok(Refill {
            block: span,
            class,
            block_bytes,
            source: RefillSource::Bulk {
                span,
                span_bytes,
                remainder,
            },
        })
    }

    /// Forgets the current chunk. The memory belongs to the direct-bulk set.
    pub fn reset(&mut self) {
        self.base = None;
        self.remaining = 0;
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    #[must_use]
    pub fn counters(&self) -> ArenaCounters {
        self.counters
    }

    fn carve(&mut self, bytes: usize) -> NonNull<u8> {
        debug_assert!(self.remaining >= bytes);
        let Some(block) = self.base else {
            panic!("arena carve of {bytes} bytes with no chunk");
        };
        // SAFETY: `remaining >= bytes`, so the new base stays within (or one past) the span.
        self.base = Some(unsafe { block.add(bytes) });
        self.remaining -= bytes;
        block
    }

    fn donate_remainder(&mut self, free_lists: &mut FreeListTable) -> Remainder {
        let remaining = mem::take(&mut self.remaining);
        let base = self.base.take();
        let Some(base) = base.filter(|_| remaining > 0) else {
            return Remainder::Empty;
        };
        match self.classes.round_down(remaining) {
            Some(bytes) => {
                // SAFETY: `[base, base + remaining)` is unused chunk memory and
                // `bytes <= remaining`; carving keeps `base` word-aligned.
                unsafe { free_lists.push(base, bytes) };
                let abandoned = remaining - bytes;
                self.counters.donated_blocks += 1;
                self.counters.abandoned_bytes += abandoned as u64;
                Remainder::Donated { bytes, abandoned }
            }
            None => {
                self.counters.abandoned_bytes += remaining as u64;
                Remainder::Abandoned { bytes: remaining }
            }
        }
    }
}
