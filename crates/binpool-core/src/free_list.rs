//! Segregated free lists, one per size class.
//!
//! Lists are intrusive: a free block's first word is reinterpreted as a
//! [`FreeNode`] holding the link to the next free block of the same class.
//! A block only ever carries a `FreeNode` while it sits in a list. Push and
//! pop are O(1) and never allocate.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use crate::size_class::SizeClasses;

/// Header written into a block while it is free.
#[repr(C)]
struct FreeNode {
    next: Option<NonNull<FreeNode>>,
}

/// One LIFO list head per size class.
#[derive(Debug)]
pub struct FreeListTable {
    classes: SizeClasses,
    heads: Vec<Option<NonNull<FreeNode>>>,
    lens: Vec<usize>,
}

impl FreeListTable {
    /// Creates a table with every list empty.
    #[must_use]
    pub fn new(classes: SizeClasses) -> Self {
        Self {
            classes,
            heads: vec![None; classes.groups()],
            lens: vec![0; classes.groups()],
        }
    }

    /// Links `block` onto the list for `size`.
    ///
    /// # Panics
    ///
    /// If `size` is not the canonical size of some class.
    ///
    /// # Safety
    ///
    /// `block` must be valid for writes of `size` bytes, aligned for a
    /// pointer, owned by no live allocation and not already on a list. The
    /// table takes exclusive ownership until the block is popped or the
    /// table is reset.
    pub unsafe fn push(&mut self, block: NonNull<u8>, size: usize) {
        assert!(
            self.classes.is_canonical(size),
            "free list push with non-canonical size {size} (step {}, max {})",
            self.classes.min_size(),
            self.classes.max_small_size()
        );
        let class = (size - 1) / self.classes.min_size();
        let node = block.cast::<FreeNode>();
        // SAFETY: caller guarantees `block` is writable, pointer-aligned and unused.
        unsafe {
            node.as_ptr().write(FreeNode {
                next: self.heads[class],
            });
        }
        self.heads[class] = Some(node);
        self.lens[class] += 1;
    }

    /// Detaches the head of the list serving `size`.
    ///
    /// # Panics
    ///
    /// If `size` is outside `[1, max_small_size]`.
    pub fn pop(&mut self, size: usize) -> Option<NonNull<u8>> {
        let Some(class) = self.classes.classify(size) else {
            panic!(
                "free list pop with out-of-range size {size} (max {})",
                self.classes.max_small_size()
            );
        };
        let node = self.heads[class]?;
        // SAFETY: every listed node was initialised by `push` and is owned by this table.
        let next = unsafe { node.as_ptr().read().next };
        self.heads[class] = next;
        self.lens[class] -= 1;
        Some(node.cast::<u8>())
    }

    /// Empties every list. Underlying memory is left to its owner.
    pub fn reset(&mut self) {
        self.heads.fill(None);
        self.lens.fill(0);
    }

    /// Blocks currently listed for `class`.
    #[must_use]
    pub fn len(&self, class: usize) -> usize {
        self.lens.get(class).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_blocks(&self) -> usize {
        self.lens.iter().sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_blocks() == 0
    }
}
