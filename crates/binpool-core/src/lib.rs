//! # binpool-core
//!
//! Size-class pool sub-allocator.
//!
//! Small requests (up to `groups * bytes_inc` bytes, 192 by default) are
//! rounded up to a linear size class and served from per-class intrusive
//! free lists, refilled by carving a bump-pointer chunk obtained in bulk
//! from a [`BulkProvider`]. Larger requests go straight to the provider.
//! Every issued pointer is registered with the size charged for it, so
//! `dealloc` needs only the pointer.
//!
//! Unsafe code is confined to the modules that touch raw memory.

#![deny(unsafe_code)]

pub mod chunk;
pub mod config;
pub mod error;
pub mod free_list;
pub mod log;
pub mod pool;
pub mod provider;
pub mod registry;
pub mod size_class;
pub mod spin;
pub mod stats;

pub use config::PoolConfig;
pub use error::{ConfigError, PoolError, Result};
pub use log::{PoolLogLevel, PoolLogRecord, to_jsonl};
pub use pool::{BlockingPool, Pool, SpinPool};
pub use provider::{BulkProvider, ProviderSnapshot, SystemProvider, TrackingProvider};
pub use size_class::SizeClasses;
pub use spin::{RawSpinLock, SpinMutex};
pub use stats::PoolStats;
