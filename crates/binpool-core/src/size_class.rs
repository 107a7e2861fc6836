//! Size classes for small allocations.
//!
//! Class `i` covers requests in `(i * bytes_inc, (i + 1) * bytes_inc]` and
//! hands out blocks of exactly `(i + 1) * bytes_inc` bytes. Requests above
//! `groups * bytes_inc` bypass the classes entirely.

/// Linear size-class layout: `groups` classes in `bytes_inc` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClasses {
    groups: usize,
    bytes_inc: usize,
}

impl SizeClasses {
    /// Creates a layout. Callers validate the pair through
    /// [`PoolConfig::validate`](crate::PoolConfig::validate).
    #[must_use]
    pub const fn new(groups: usize, bytes_inc: usize) -> Self {
        Self { groups, bytes_inc }
    }

    #[must_use]
    pub const fn groups(&self) -> usize {
        self.groups
    }

    /// Smallest block, also the class step.
    #[must_use]
    pub const fn min_size(&self) -> usize {
        self.bytes_inc
    }

    /// Largest request served by a class.
    #[must_use]
    pub const fn max_small_size(&self) -> usize {
        self.groups * self.bytes_inc
    }

    #[must_use]
    pub const fn is_small(&self, size: usize) -> bool {
        size >= 1 && size <= self.max_small_size()
    }

    /// Maps a request to its class, or `None` outside `[1, max_small_size]`.
    #[must_use]
    pub const fn classify(&self, size: usize) -> Option<usize> {
        if self.is_small(size) {
            Some((size - 1) / self.bytes_inc)
        } else {
            None
        }
    }

    /// Block size handed out for `class`.
    #[must_use]
    pub const fn canonical_size(&self, class: usize) -> usize {
        (class + 1) * self.bytes_inc
    }

    /// Rounded-up size for a small request; identity for large ones.
    #[must_use]
    pub const fn real_size(&self, size: usize) -> usize {
        match self.classify(size) {
            Some(class) => self.canonical_size(class),
            None => size,
        }
    }

    /// Largest canonical size not exceeding `bytes`, capped at the largest
    /// class. `None` when `bytes` is below the smallest block.
    #[must_use]
    pub const fn round_down(&self, bytes: usize) -> Option<usize> {
        if bytes < self.bytes_inc {
            return None;
        }
        let steps = bytes / self.bytes_inc;
        let steps = if steps > self.groups { self.groups } else { steps };
        Some(steps * self.bytes_inc)
    }

    /// True for sizes a free list can hold: in range and step-aligned.
    #[must_use]
    pub const fn is_canonical(&self, size: usize) -> bool {
        self.is_small(size) && size % self.bytes_inc == 0
    }
}
