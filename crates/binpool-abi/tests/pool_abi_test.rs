use std::ffi::c_void;
use std::io;
use std::ptr;

use binpool_abi::global_pool;
use binpool_abi::pool_abi::{
    binpool_alloc, binpool_block_size, binpool_dealloc, binpool_dealloc_all,
    binpool_real_alloc_size,
};
use parking_lot::Mutex;

// Every test shares the process-wide pool, and `binpool_dealloc_all`
// invalidates other tests' pointers.
static SERIAL: Mutex<()> = Mutex::new(());

fn last_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

#[test]
fn alloc_and_dealloc_round_trip() {
    let _guard = SERIAL.lock();
    // SAFETY: plain allocation call.
    let p = unsafe { binpool_alloc(10) };
    assert!(!p.is_null());
    // SAFETY: `p` is a live 16-byte block.
    unsafe {
        assert_eq!(binpool_block_size(p), 16);
        ptr::write_bytes(p.cast::<u8>(), 0x5A, 16);
        assert_eq!(binpool_dealloc(p), 0);
        assert_eq!(binpool_block_size(p), 0);
    }
}

#[test]
fn zero_size_sets_einval() {
    let _guard = SERIAL.lock();
    // SAFETY: plain allocation call.
    let p = unsafe { binpool_alloc(0) };
    assert!(p.is_null());
    assert_eq!(last_errno(), libc::EINVAL);
}

#[test]
fn foreign_and_double_free_return_einval() {
    let _guard = SERIAL.lock();
    let mut local = 0u64;
    let foreign = (&mut local as *mut u64).cast::<c_void>();
    // SAFETY: the pool only inspects its registry for `foreign`.
    unsafe {
        assert_eq!(binpool_dealloc(foreign), libc::EINVAL);
        assert_eq!(binpool_dealloc(ptr::null_mut()), 0);

        let p = binpool_alloc(300);
        assert!(!p.is_null());
        assert_eq!(binpool_block_size(p), 300);
        assert_eq!(binpool_dealloc(p), 0);
        assert_eq!(binpool_dealloc(p), libc::EINVAL);
    }
}

#[test]
fn real_alloc_size_matches_classes() {
    assert_eq!(binpool_real_alloc_size(0), 0);
    assert_eq!(binpool_real_alloc_size(1), 8);
    assert_eq!(binpool_real_alloc_size(10), 16);
    let max = global_pool().unwrap().config().max_small_size();
    assert_eq!(binpool_real_alloc_size(max), max);
    assert_eq!(binpool_real_alloc_size(max + 1), max + 1);
}

#[test]
fn dealloc_all_invalidates_everything() {
    let _guard = SERIAL.lock();
    // SAFETY: allocation calls followed by queries on the returned pointers.
    unsafe {
        let small = binpool_alloc(24);
        let large = binpool_alloc(4096);
        assert!(!small.is_null() && !large.is_null());
        binpool_dealloc_all();
        assert_eq!(binpool_block_size(small), 0);
        assert_eq!(binpool_block_size(large), 0);
        assert_eq!(binpool_dealloc(small), libc::EINVAL);
    }
    assert_eq!(global_pool().unwrap().stats().live_allocations, 0);
}
