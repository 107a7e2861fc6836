//! Error types for the pool engine.

use thiserror::Error;

/// Errors reported by [`Pool`](crate::Pool) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// `alloc(0)` has no defined meaning for this pool.
    #[error("allocation size must be at least one byte")]
    ZeroSize,
    /// The bulk provider could not satisfy a refill span or a large request.
    #[error("bulk provider out of memory (requested {requested} bytes)")]
    OutOfMemory { requested: usize },
    /// Dealloc of a pointer the pool never issued, or one already freed.
    #[error("pointer {addr:#x} is not a live allocation of this pool")]
    UnknownPointer { addr: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Rejected [`PoolConfig`](crate::PoolConfig) values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("groups must be in [1, {max}], got {got}")]
    GroupsOutOfRange { got: usize, max: usize },
    #[error("bytes_inc must be a multiple of {word} in [{word}, {max}], got {got}")]
    BytesIncOutOfRange { got: usize, word: usize, max: usize },
    #[error("refill_span_blocks must be at least 1")]
    ZeroRefillSpan,
    #[error("refill span of {blocks} blocks of {block_bytes} bytes overflows usize")]
    SpanOverflow { blocks: usize, block_bytes: usize },
}

pub type Result<T> = std::result::Result<T, PoolError>;
