#![no_main]
use std::collections::HashMap;
use std::ptr::NonNull;

use binpool_core::{Pool, PoolConfig, PoolError, SystemProvider, TrackingProvider};
use libfuzzer_sys::fuzz_target;

// Each 4-byte chunk is one op: [opcode, size_lo, size_hi, pick].
fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let pool = match Pool::with_provider(
        PoolConfig::default(),
        TrackingProvider::new(SystemProvider),
    ) {
        Ok(pool) => pool,
        Err(_) => return,
    };
    // Shadow model: live pointer -> (charged size, fill byte).
    let mut shadow: HashMap<usize, (usize, u8)> = HashMap::new();
    let mut freed: Vec<usize> = Vec::new();

    for chunk in data.chunks_exact(4) {
        let size = u16::from_le_bytes([chunk[1], chunk[2]]) as usize % 1024;
        let pick = chunk[3] as usize;
        match chunk[0] % 5 {
            0 | 1 => match pool.alloc(size) {
                Ok(ptr) => {
                    let addr = ptr.as_ptr() as usize;
                    let real = pool.real_alloc_size_of(ptr.as_ptr());
                    assert_eq!(real, pool.real_alloc_size(size));
                    assert!(shadow.insert(addr, (real, chunk[3])).is_none());
                    // SAFETY: the pool handed out `real` bytes at `ptr`.
                    unsafe { std::ptr::write_bytes(ptr.as_ptr(), chunk[3], real) };
                    freed.retain(|&f| f != addr);
                }
                Err(PoolError::ZeroSize) => assert_eq!(size, 0),
                Err(err) => panic!("unexpected alloc failure: {err}"),
            },
            2 => {
                if shadow.is_empty() {
                    continue;
                }
                let addr = *shadow.keys().nth(pick % shadow.len()).unwrap();
                let (real, fill) = shadow.remove(&addr).unwrap();
                // SAFETY: `addr` is live with `real` bytes.
                let bytes = unsafe { std::slice::from_raw_parts(addr as *const u8, real) };
                assert!(bytes.iter().all(|&b| b == fill));
                pool.dealloc(NonNull::new(addr as *mut u8).unwrap()).unwrap();
                freed.push(addr);
            }
            3 => {
                if let Some(&addr) = freed.get(pick % freed.len().max(1)) {
                    let result = pool.dealloc(NonNull::new(addr as *mut u8).unwrap());
                    assert_eq!(result, Err(PoolError::UnknownPointer { addr }));
                }
            }
            _ => {
                if pick % 16 == 0 {
                    pool.dealloc_all();
                    shadow.clear();
                    freed.clear();
                    assert_eq!(pool.provider().snapshot().live_spans, 0);
                }
            }
        }

        let stats = pool.stats();
        assert_eq!(stats.live_allocations, shadow.len());
        assert_eq!(
            stats.live_bytes,
            shadow.values().map(|&(real, _)| real).sum::<usize>()
        );
    }

    drop(pool);
});
