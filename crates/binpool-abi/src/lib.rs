// C callers hand us raw pointers; the registry decides what is ours, so
// per-function safety docs would only repeat `pool_abi`'s module docs.
#![allow(clippy::missing_safety_doc)]
//! # binpool-abi
//!
//! `extern "C"` boundary over one process-wide [`Pool`].
//!
//! ```text
//! C caller -> binpool_* entry (this crate) -> global Pool -> BulkProvider (libc)
//! ```
//!
//! The global pool is built on first use from the `BINPOOL_*` environment
//! variables (see [`PoolConfig::from_env`]). An invalid environment falls
//! back to the default geometry instead of failing every call.

use std::sync::OnceLock;

use binpool_core::{Pool, PoolConfig};

pub mod pool_abi;

static GLOBAL_POOL: OnceLock<Option<Pool>> = OnceLock::new();

/// The process-wide pool, or `None` if no configuration could build one.
pub fn global_pool() -> Option<&'static Pool> {
    GLOBAL_POOL
        .get_or_init(|| {
            let config = PoolConfig::from_env().unwrap_or_default();
            Pool::new(config)
                .or_else(|_| Pool::new(PoolConfig::default()))
                .ok()
        })
        .as_ref()
}
