//! ABI layer for the pool entry points.
//!
//! Failures follow C conventions: `binpool_alloc` returns null and sets
//! `errno`, `binpool_dealloc` returns an errno value. Null pointers are
//! accepted by `binpool_dealloc` as a no-op, like `free(NULL)`.

use std::ffi::{c_int, c_void};
use std::ptr::{self, NonNull};

use binpool_core::PoolError;
use libc::{EINVAL, ENOMEM};

use crate::global_pool;

#[cfg(any(target_os = "linux", target_os = "android"))]
#[inline]
unsafe fn set_abi_errno(val: c_int) {
    // SAFETY: __errno_location returns a valid TLS pointer for this thread.
    unsafe { *libc::__errno_location() = val };
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
#[inline]
unsafe fn set_abi_errno(val: c_int) {
    // SAFETY: __error returns a valid TLS pointer for this thread.
    unsafe { *libc::__error() = val };
}

fn errno_for(err: &PoolError) -> c_int {
    match err {
        PoolError::OutOfMemory { .. } => ENOMEM,
        PoolError::ZeroSize | PoolError::UnknownPointer { .. } | PoolError::Config(_) => EINVAL,
    }
}

/// Allocates `size` bytes from the process-wide pool.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binpool_alloc(size: usize) -> *mut c_void {
    let Some(pool) = global_pool() else {
        // SAFETY: writing this thread's errno.
        unsafe { set_abi_errno(ENOMEM) };
        return ptr::null_mut();
    };
    match pool.alloc(size) {
        Ok(block) => block.as_ptr().cast(),
        Err(err) => {
            // SAFETY: writing this thread's errno.
            unsafe { set_abi_errno(errno_for(&err)) };
            ptr::null_mut()
        }
    }
}

/// Returns `ptr` to the pool. Yields 0 on success, `EINVAL` for pointers
/// the pool does not own.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binpool_dealloc(ptr: *mut c_void) -> c_int {
    let Some(block) = NonNull::new(ptr.cast::<u8>()) else {
        return 0;
    };
    let Some(pool) = global_pool() else {
        return EINVAL;
    };
    match pool.dealloc(block) {
        Ok(()) => 0,
        Err(err) => errno_for(&err),
    }
}

/// Releases everything the process-wide pool holds. Every pointer it has
/// issued becomes invalid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binpool_dealloc_all() {
    if let Some(pool) = global_pool() {
        pool.dealloc_all();
    }
}

/// Bytes a request of `size` would receive; 0 for 0.
#[unsafe(no_mangle)]
pub extern "C" fn binpool_real_alloc_size(size: usize) -> usize {
    global_pool().map_or(0, |pool| pool.real_alloc_size(size))
}

/// Bytes charged to `ptr`, or 0 if it is not a live pool allocation.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binpool_block_size(ptr: *const c_void) -> usize {
    global_pool().map_or(0, |pool| pool.real_alloc_size_of(ptr.cast()))
}
