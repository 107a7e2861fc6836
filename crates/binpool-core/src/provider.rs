//! Bulk memory providers.
//!
//! The pool never talks to the system allocator directly; it trades with a
//! [`BulkProvider`] for refill spans and for large allocations.
//! [`SystemProvider`] forwards to `libc::malloc`/`libc::free`, whose
//! `free` needs no size, matching the pool's pointer-only release path.

#![allow(unsafe_code)]

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{PoolError, Result};

/// Coarse-grained memory source behind a pool.
///
/// Implementations must be thread-safe and return memory aligned for any
/// fundamental type.
pub trait BulkProvider: Send + Sync {
    /// Returns a span of at least `bytes` bytes.
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>>;

    /// Returns a span to the provider.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this provider and must not have
    /// been released already.
    unsafe fn release(&self, ptr: NonNull<u8>);
}

impl<P: BulkProvider + ?Sized> BulkProvider for Arc<P> {
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>> {
        (**self).allocate(bytes)
    }

    unsafe fn release(&self, ptr: NonNull<u8>) {
        // SAFETY: forwarded contract.
        unsafe { (**self).release(ptr) }
    }
}

/// The C heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProvider;

impl BulkProvider for SystemProvider {
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>> {
        // SAFETY: malloc accepts any size; a null result is handled below.
        let raw = unsafe { libc::malloc(bytes) };
        NonNull::new(raw.cast::<u8>()).ok_or(PoolError::OutOfMemory { requested: bytes })
    }

    unsafe fn release(&self, ptr: NonNull<u8>) {
        // SAFETY: caller guarantees `ptr` came from `allocate`, i.e. libc::malloc.
        unsafe { libc::free(ptr.as_ptr().cast()) };
    }
}

#[derive(Debug, Default)]
struct Ledger {
    live: HashMap<usize, usize>,
    live_bytes: usize,
    allocations: u64,
    releases: u64,
    failures: u64,
}

/// Point-in-time view of a [`TrackingProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSnapshot {
    /// Spans handed out and not yet released.
    pub live_spans: usize,
    pub live_bytes: usize,
    pub allocations: u64,
    pub releases: u64,
    /// Requests refused because of the byte budget.
    pub failures: u64,
}

/// Wraps a provider with live-span accounting and an optional byte budget.
///
/// Requests that would push live bytes past the budget fail with
/// [`PoolError::OutOfMemory`] without reaching the inner provider.
#[derive(Debug)]
pub struct TrackingProvider<P = SystemProvider> {
    inner: P,
    budget: Option<usize>,
    ledger: Mutex<Ledger>,
}

impl<P: BulkProvider> TrackingProvider<P> {
    #[must_use]
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            budget: None,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    #[must_use]
    pub fn with_budget(inner: P, budget: usize) -> Self {
        Self {
            budget: Some(budget),
            ..Self::new(inner)
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ProviderSnapshot {
        let ledger = self.ledger.lock();
        ProviderSnapshot {
            live_spans: ledger.live.len(),
            live_bytes: ledger.live_bytes,
            allocations: ledger.allocations,
            releases: ledger.releases,
            failures: ledger.failures,
        }
    }

    /// Whether `ptr` is a span this provider handed out and still owns.
    #[must_use]
    pub fn is_live(&self, ptr: *const u8) -> bool {
        self.ledger.lock().live.contains_key(&(ptr as usize))
    }
}

impl Default for TrackingProvider<SystemProvider> {
    fn default() -> Self {
        Self::new(SystemProvider)
    }
}

impl<P: BulkProvider> BulkProvider for TrackingProvider<P> {
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>> {
        let mut ledger = self.ledger.lock();
        let over_budget = self
            .budget
            .is_some_and(|budget| ledger.live_bytes.saturating_add(bytes) > budget);
        if over_budget {
            ledger.failures += 1;
            return Err(PoolError::OutOfMemory { requested: bytes });
        }
        let ptr = match self.inner.allocate(bytes) {
            Ok(ptr) => ptr,
            Err(err) => {
                ledger.failures += 1;
                return Err(err);
            }
        };
        ledger.live.insert(ptr.as_ptr() as usize, bytes);
        ledger.live_bytes += bytes;
        ledger.allocations += 1;
        Ok(ptr)
    }

    unsafe fn release(&self, ptr: NonNull<u8>) {
        {
            let mut ledger = self.ledger.lock();
            let bytes = ledger.live.remove(&(ptr.as_ptr() as usize)).unwrap_or_else(|| {
                panic!("release of span {:p} not owned by this provider", ptr.as_ptr())
            });
            ledger.live_bytes -= bytes;
            ledger.releases += 1;
        }
        // SAFETY: the ledger confirmed `ptr` is a live span of `inner`.
        unsafe { self.inner.release(ptr) };
    }
}
