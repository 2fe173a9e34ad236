#![allow(dead_code)]

use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};
use kernel_pmm::{AllocatorConfig, BuddyAllocator, FrameInfo, MemoryRegion, summarize};
use std::collections::BTreeSet;

pub const FRAME: u64 = 0x1000;

pub fn pa(v: u64) -> PhysicalAddress {
    PhysicalAddress::new(v)
}

pub fn no_reservations() -> Vec<PhysicalRange> {
    Vec::new()
}

pub fn range(start: u64, end: u64) -> PhysicalRange {
    PhysicalRange::new(pa(start), pa(end))
}

/// Build an allocator with leaked table storage sized exactly as required.
pub fn allocator_with(
    regions: &[MemoryRegion],
    reserved: &[PhysicalRange],
    config: &AllocatorConfig,
) -> BuddyAllocator<'static> {
    let summary = summarize(regions.iter().copied()).expect("valid memory map");
    let entries = BuddyAllocator::table_entries_required(&summary, config).expect("table size");
    let storage = Box::leak(vec![FrameInfo::new(); entries].into_boxed_slice());
    BuddyAllocator::init(
        &summary,
        regions.iter().copied(),
        reserved.iter().copied(),
        storage,
        config,
    )
    .expect("allocator init")
}

pub fn allocator(regions: &[MemoryRegion]) -> BuddyAllocator<'static> {
    allocator_with(regions, &[], &AllocatorConfig::default())
}

/// The set of free blocks per order, for before/after comparisons.
pub fn free_snapshot(a: &BuddyAllocator<'_>) -> Vec<Vec<PhysicalAddress>> {
    (0..=a.max_order())
        .map(|order| {
            let mut blocks: Vec<_> = a.free_blocks(order).collect();
            blocks.sort_unstable();
            blocks
        })
        .collect()
}

/// Every frame address covered by the free lists.
pub fn free_frames(a: &BuddyAllocator<'_>) -> BTreeSet<u64> {
    let mut frames = BTreeSet::new();
    for order in 0..=a.max_order() {
        for block in a.free_blocks(order) {
            let start = block.as_u64();
            for f in 0..(1_u64 << order) {
                assert!(frames.insert(start + f * FRAME), "frame listed twice");
            }
        }
    }
    frames
}
