mod common;

use common::{
    FRAME, allocator, allocator_with, free_frames, free_snapshot, no_reservations, pa, range,
};
use kernel_memory_addresses::PhysicalAddress;
use kernel_pmm::{
    AllocError, AllocatorConfig, BuddyAllocator, ConsistencyError, FrameInfo, FrameUsage,
    InitError, MAX_ORDER, MemoryRegion, buddy_of, summarize,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn eight_frame_region_serves_one_order_3_block() {
    let mut a = allocator(&[MemoryRegion::usable(0x10_0000, 8 * FRAME)]);
    assert_eq!(a.max_order(), 3);

    let block = a.allocate(3).unwrap();
    assert_eq!(block.address, pa(0x10_0000));
    assert_eq!(block.frames(), 8);
    assert_eq!(a.allocate(3), Err(AllocError::OutOfMemory { order: 3 }));
    assert_eq!(a.allocate(0), Err(AllocError::OutOfMemory { order: 0 }));
}

#[test]
fn buddies_coalesce_in_either_free_order() {
    for lower_first in [true, false] {
        let mut a = allocator(&[MemoryRegion::usable(0, 4 * FRAME)]);

        let first = a.allocate(0).unwrap().address;
        let second = a.allocate(0).unwrap().address;
        assert_eq!(second, PhysicalAddress::new(first.as_u64() ^ FRAME));
        assert_eq!(buddy_of(first, 0), second);

        if lower_first {
            a.free(first, 0);
            a.free(second, 0);
        } else {
            a.free(second, 0);
            a.free(first, 0);
        }

        assert_eq!(a.free_block_count(0), 0);
        assert_eq!(a.free_block_count(1), 0);
        assert_eq!(a.free_blocks(2).collect::<Vec<_>>(), vec![pa(0)]);
        a.verify().unwrap();
    }
}

#[test]
fn exhaustion_yields_exactly_the_free_frame_count() {
    let mut a = allocator(&[
        MemoryRegion::usable(0x3000, 0x1D000),
        MemoryRegion::usable(0x40000, 0x7000),
    ]);
    let total = a.free_frame_count();
    assert_eq!(total, 0x1D + 0x7);

    let mut seen = std::collections::BTreeSet::new();
    for _ in 0..total {
        let block = a.allocate(0).unwrap();
        assert!(seen.insert(block.address), "frame handed out twice");
    }
    assert_eq!(a.allocate(0), Err(AllocError::OutOfMemory { order: 0 }));
    assert_eq!(a.free_frame_count(), 0);
    assert_eq!(a.stats().allocated_frames(), total);
}

#[test]
fn allocate_then_free_restores_the_free_lists() {
    let mut a = allocator(&[
        MemoryRegion::usable(0x1000, 0x3F000),
        MemoryRegion::usable(0x80000, 0x13000),
    ]);

    for order in 0..=a.max_order() {
        let before = free_snapshot(&a);
        let free_before = a.free_frame_count();

        let Ok(block) = a.allocate(order) else {
            continue;
        };
        assert_eq!(a.free_frame_count(), free_before - (1 << order));
        assert!(block.address.is_aligned_to(block.bytes()));

        a.free(block.address, order);
        assert_eq!(free_snapshot(&a), before, "order {order}");
        assert_eq!(a.free_frame_count(), free_before);
    }
}

#[test]
fn most_recently_freed_block_is_reused_first() {
    let mut a = allocator(&[MemoryRegion::usable(0, 0x10000)]);

    let blocks: Vec<_> = (0..6).map(|_| a.allocate(0).unwrap().address).collect();
    // free every other frame, so no buddy pair can merge
    for &address in blocks.iter().step_by(2) {
        a.free(address, 0);
    }
    assert_eq!(a.free_blocks(0).next(), Some(blocks[4]));
    assert_eq!(a.allocate(0).unwrap().address, blocks[4]);
    assert_eq!(a.allocate(0).unwrap().address, blocks[2]);
    a.verify().unwrap();
}

#[test]
fn freeing_into_a_fragmented_order_links_at_the_front() {
    let mut a = allocator(&[MemoryRegion::usable(0, 0x400_0000)]);
    let frames = a.total_frame_count();

    let mut all = Vec::new();
    while let Ok(block) = a.allocate(0) {
        all.push(block.address);
    }
    assert_eq!(all.len() as u64, frames);

    // every even frame free: thousands of unmergeable order-0 blocks
    let mut evens: Vec<_> = all.iter().copied().filter(|p| p.as_u64() & 0x1000 == 0).collect();
    evens.sort_unstable();
    let (last, rest) = evens.split_last().unwrap();
    for &address in rest {
        a.free(address, 0);
    }
    assert_eq!(a.free_block_count(0) as u64, frames / 2 - 1);

    // the highest block lands at the front, not behind every lower one
    a.free(*last, 0);
    assert_eq!(a.free_blocks(0).next(), Some(*last));
    assert_eq!(a.free_block_count(0) as u64, frames / 2);
    a.verify().unwrap();
}

#[test]
fn adjacent_regions_merge_at_seed_time() {
    let mut a = allocator(&[
        MemoryRegion::usable(0x0, 0x4000),
        MemoryRegion::usable(0x4000, 0x4000),
    ]);
    assert_eq!(a.free_blocks(3).collect::<Vec<_>>(), vec![pa(0)]);
    assert_eq!(a.allocate(3).unwrap().address, pa(0));
}

#[test]
fn overlapping_usable_regions_are_not_double_counted() {
    let mut a = allocator(&[
        MemoryRegion::usable(0x0, 0x6000),
        MemoryRegion::usable(0x4000, 0x4000),
        MemoryRegion::usable(0x1000, 0x1000),
    ]);
    assert_eq!(a.total_frame_count(), 8);
    assert_eq!(free_frames(&a).len(), 8);
    a.verify().unwrap();

    for _ in 0..8 {
        a.allocate(0).unwrap();
    }
    assert!(a.allocate(0).is_err());
}

#[test]
fn reserved_ranges_are_never_handed_out() {
    let reserved = [range(0x5800, 0x6100), range(0x20000, 0x21000)];
    let mut a = allocator_with(
        &[MemoryRegion::usable(0, 0x40000)],
        &reserved,
        &AllocatorConfig::default(),
    );

    // 0x5000..0x7000 (widened) and 0x20000..0x21000
    assert_eq!(a.total_frame_count(), 0x40 - 3);
    for addr in [0x5000, 0x6000, 0x20000] {
        assert_eq!(a.frame_usage(pa(addr)), FrameUsage::Reserved);
    }

    while let Ok(block) = a.allocate(0) {
        let addr = block.address.as_u64();
        assert!(!(0x5000..0x7000).contains(&addr));
        assert_ne!(addr, 0x20000);
    }
    assert_eq!(a.free_frame_count(), 0);
}

#[test]
fn null_frame_can_be_kept_out() {
    let config = AllocatorConfig::default().with_null_frame_reserved(true);
    let mut a = allocator_with(&[MemoryRegion::usable(0, 0x4000)], &[], &config);
    assert_eq!(a.total_frame_count(), 3);
    assert_eq!(a.frame_usage(pa(0)), FrameUsage::Reserved);
    assert_eq!(a.allocate(0).unwrap().address, pa(0x1000));

    let mut plain = allocator(&[MemoryRegion::usable(0, 0x4000)]);
    assert_eq!(plain.allocate(0).unwrap().address, pa(0));
}

#[test]
fn order_limits() {
    let mut a = allocator(&[MemoryRegion::usable(0, 0x10000)]);
    assert_eq!(a.max_order(), 4);
    assert_eq!(
        a.allocate(5),
        Err(AllocError::OrderTooLarge {
            order: 5,
            max_order: 4
        })
    );
    assert_eq!(
        a.allocate(MAX_ORDER + 1),
        Err(AllocError::OrderTooLarge {
            order: MAX_ORDER + 1,
            max_order: 4
        })
    );
    assert_eq!(a.free_block_count(MAX_ORDER + 5), 0);
    assert_eq!(a.free_blocks(MAX_ORDER + 5).count(), 0);

    let capped = allocator_with(
        &[MemoryRegion::usable(0, 0x10000)],
        &[],
        &AllocatorConfig::default().with_order_ceiling(2),
    );
    assert_eq!(capped.max_order(), 2);
    assert_eq!(capped.free_block_count(2), 4);
}

#[test]
fn contiguous_frames_round_up() {
    let mut a = allocator(&[MemoryRegion::usable(0, 0x10000)]);
    assert_eq!(a.allocate_frames(0), Err(AllocError::ZeroFrames));

    let block = a.allocate_frames(3).unwrap();
    assert_eq!(block.order, 2);
    assert_eq!(a.free_frame_count(), 12);

    assert_eq!(a.free_frames(block.address, 0), Err(ConsistencyError::ZeroFrames));
    a.free_frames(block.address, 3).unwrap();
    assert_eq!(a.free_frame_count(), 16);
    assert_eq!(
        a.allocate_frames(17),
        Err(AllocError::OrderTooLarge {
            order: 5,
            max_order: 4
        })
    );
}

#[test]
fn table_storage_must_cover_the_span() {
    let regions = [MemoryRegion::usable(0x10_0000, 0x10_0000)];
    let summary = summarize(regions).unwrap();
    let config = AllocatorConfig::default();
    let required = BuddyAllocator::table_entries_required(&summary, &config).unwrap();
    assert_eq!(required, 256);

    let mut small = vec![FrameInfo::new(); required - 1];
    assert!(matches!(
        BuddyAllocator::init(&summary, regions, no_reservations(), &mut small, &config),
        Err(InitError::TableTooSmall {
            required: 256,
            provided: 255
        })
    ));

    let mut large = vec![FrameInfo::new(); required + 10];
    let a = BuddyAllocator::init(&summary, regions, no_reservations(), &mut large, &config).unwrap();
    assert_eq!(a.total_frame_count(), 256);
}

#[test]
fn randomized_sequences_keep_every_invariant() {
    let mut rng = StdRng::seed_from_u64(0x5eed_f4a3);

    for round in 0..8_u64 {
        let mut a = allocator_with(
            &[
                MemoryRegion::usable(0x1000, 0x7F000),
                MemoryRegion::reserved(0x80000, 0x3000),
                MemoryRegion::usable(0x83000, 0x2D000),
            ],
            &[range(0x30000 + round * FRAME, 0x31000 + round * FRAME)],
            &AllocatorConfig::default(),
        );
        let total = a.total_frame_count();
        let mut live: Vec<(PhysicalAddress, u8)> = Vec::new();

        for _ in 0..2_000 {
            if live.is_empty() || rng.gen_bool(0.55) {
                let order = rng.gen_range(0..=4);
                if let Ok(block) = a.allocate(order) {
                    assert!(block.address.is_aligned_to(block.bytes()));
                    assert_eq!(a.frame_usage(block.address), FrameUsage::Allocated);
                    live.push((block.address, order));
                }
            } else {
                let (address, order) = live.swap_remove(rng.gen_range(0..live.len()));
                a.free(address, order);
                a.verify().unwrap();
            }

            let allocated: u64 = live.iter().map(|&(_, o)| 1_u64 << o).sum();
            assert_eq!(a.free_frame_count() + allocated, total);
        }

        for (address, order) in live.drain(..) {
            a.free(address, order);
        }
        a.verify().unwrap();
        assert_eq!(a.free_frame_count(), total);
    }
}
