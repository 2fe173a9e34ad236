mod common;

use common::allocator;
use kernel_memory_addresses::PhysicalAddress;
use kernel_pmm::{AllocError, GlobalFrameAllocator, InitError, MemoryRegion};
use kernel_sync::RawSpin;
use std::sync::{Arc, Barrier};
use std::thread;

type Global = GlobalFrameAllocator<RawSpin>;

fn online(regions: &[MemoryRegion]) -> Global {
    let global = Global::new();
    global.init(allocator(regions)).expect("first init");
    global
}

#[test]
fn second_init_is_rejected() {
    let global = online(&[MemoryRegion::usable(0, 0x10000)]);
    assert!(global.is_initialized());

    let other = allocator(&[MemoryRegion::usable(0x100000, 0x1000)]);
    assert_eq!(global.init(other), Err(InitError::AlreadyInitialized));

    // the first allocator is still the one serving requests
    assert_eq!(global.stats().map(|s| s.total_frames), Some(16));
}

#[test]
fn requests_before_init_fail() {
    let global = Global::default();
    assert!(!global.is_initialized());
    assert_eq!(global.allocate_frame(0), Err(AllocError::NotInitialized));
    assert_eq!(global.try_allocate_frame(0), Err(AllocError::NotInitialized));
    assert_eq!(global.allocate_frames(2), Err(AllocError::NotInitialized));
    assert_eq!(global.stats(), None);
    assert_eq!(global.with_allocator(|a| a.max_order()), Err(AllocError::NotInitialized));
}

#[test]
#[should_panic(expected = "before initialization")]
fn free_before_init_halts() {
    Global::new().free_frame(PhysicalAddress::new(0x1000), 0);
}

#[test]
#[should_panic(expected = "physical frame allocator")]
fn double_free_halts() {
    let global = online(&[MemoryRegion::usable(0, 0x4000)]);
    let frame = global.allocate_frame(0).unwrap();
    global.free_frame(frame, 0);
    global.free_frame(frame, 0);
}

#[test]
fn allocate_and_free_through_the_lock() {
    let global = online(&[MemoryRegion::usable(0, 0x10000)]);

    let block = global.allocate_frames(3).unwrap();
    assert_eq!(block.order, 2);
    let single = global.allocate_frame(0).unwrap();
    assert_eq!(global.stats().map(|s| s.free_frames), Some(11));

    global.free_frame(single, 0);
    global.free_frames(block.address, 3);
    assert_eq!(global.stats().map(|s| s.free_frames), Some(16));
    assert_eq!(global.with_allocator(|a| a.verify()), Ok(Ok(())));
}

#[test]
fn try_allocate_reports_contention() {
    let global = online(&[MemoryRegion::usable(0, 0x10000)]);

    let inner = global
        .with_allocator(|_| global.try_allocate_frame(0))
        .unwrap();
    assert_eq!(inner, Err(AllocError::Contended));

    assert!(global.try_allocate_frame(0).is_ok());
}

#[test]
fn concurrent_callers_never_share_a_frame() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 200;

    let global = Arc::new(online(&[MemoryRegion::usable(0, 0x100000)]));
    let total = global.stats().unwrap().total_frames;
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let global = Arc::clone(&global);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut held = Vec::new();
                for round in 0..ROUNDS {
                    #[allow(clippy::cast_possible_truncation)]
                    let order = ((t + round) % 3) as u8;
                    if let Ok(frame) = global.allocate_frame(order) {
                        held.push((frame, order));
                    }
                    if round % 4 == 3 {
                        for (frame, order) in held.drain(..) {
                            global.free_frame(frame, order);
                        }
                    }
                }
                held
            })
        })
        .collect();

    let mut live: Vec<(PhysicalAddress, u8)> = Vec::new();
    for handle in handles {
        live.extend(handle.join().unwrap());
    }

    let mut ranges: Vec<(u64, u64)> = live
        .iter()
        .map(|&(frame, order)| (frame.as_u64(), frame.as_u64() + (0x1000 << order)))
        .collect();
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "overlapping blocks {pair:x?}");
    }

    let held: u64 = live.iter().map(|&(_, order)| 1_u64 << order).sum();
    assert_eq!(global.stats().map(|s| s.free_frames + held), Some(total));

    for (frame, order) in live {
        global.free_frame(frame, order);
    }
    assert_eq!(global.with_allocator(|a| a.verify()), Ok(Ok(())));
    assert_eq!(global.stats().map(|s| s.free_frames), Some(total));
}
