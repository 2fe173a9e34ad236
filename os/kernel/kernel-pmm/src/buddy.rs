//! # Buddy frame allocator
//!
//! Manages physical frames in power-of-two blocks. A block of order `k`
//! spans `2^k` frames and is aligned to its own size, so its buddy is found
//! by flipping one address bit (see [`buddy_of`]).
//!
//! ## Allocation
//! Take the most recently freed block from the smallest non-empty order
//! `>= k`, then split it down to `k`. Each split keeps the lower half and puts the
//! upper half on the free list one order below.
//!
//! ## Free
//! While the buddy of the block is itself a free block of the same order,
//! unlink it and merge. The merged block starts at the lower of the two
//! addresses. Push what remains.
//!
//! Free lists are LIFO and every list operation is O(1), so both loops cost
//! at most `max_order` steps however fragmented memory is. No free list ever
//! holds two blocks that could be merged.
//!
//! ## Bookkeeping
//! State lives in the [`FrameTable`]: only block heads carry state, and the
//! free lists are threaded through the head entries. "Is this block free?"
//! is a single table read.

use crate::config::AllocatorConfig;
use crate::error::{AllocError, ConsistencyError, InitError};
use crate::frame_table::{FrameInfo, FrameState, FrameTable, NIL, TableLayout};
use crate::free_list::FreeList;
use crate::memory_map::MemoryMapSummary;
use crate::order::{ORDER_COUNT, buddy_of, bytes_for_order, frames_in_order, order_for_frames};
use crate::region::MemoryRegion;
use crate::units::ByteSize;
use core::fmt;
use kernel_memory_addresses::{FRAME_SIZE, PhysicalAddress, PhysicalRange};
use log::{debug, error, info};

/// A run of `2^order` frames starting at `address`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FrameBlock {
    pub address: PhysicalAddress,
    pub order: u8,
}

impl FrameBlock {
    #[inline]
    #[must_use]
    pub const fn frames(&self) -> u64 {
        frames_in_order(self.order)
    }

    #[inline]
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        bytes_for_order(self.order)
    }

    #[inline]
    #[must_use]
    pub const fn range(&self) -> PhysicalRange {
        PhysicalRange::new(
            self.address,
            PhysicalAddress::new(self.address.as_u64() + self.bytes()),
        )
    }
}

/// Frame counters of an allocator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames handed to the allocator at init.
    pub total_frames: u64,
    pub free_frames: u64,
    pub max_order: u8,
}

impl FrameStats {
    #[inline]
    #[must_use]
    pub const fn allocated_frames(&self) -> u64 {
        self.total_frames - self.free_frames
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} frames free ({} of {}), {} allocated, max order {}",
            self.free_frames,
            self.total_frames,
            ByteSize(self.free_frames * FRAME_SIZE),
            ByteSize(self.total_frames * FRAME_SIZE),
            self.allocated_frames(),
            self.max_order
        )
    }
}

/// What a single physical frame is currently used for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameUsage {
    /// Part of a free block.
    Free,
    /// Part of an allocated block.
    Allocated,
    /// Carved out at init.
    Reserved,
    /// Not managed: outside every usable region.
    Unmanaged,
}

/// The buddy allocator over one frame table.
pub struct BuddyAllocator<'m> {
    table: FrameTable<'m>,
    free_lists: [FreeList; ORDER_COUNT],
    max_order: u8,
    total_frames: u64,
    free_frames: u64,
}

impl<'m> BuddyAllocator<'m> {
    /// Number of [`FrameInfo`] entries [`init`](Self::init) needs for this memory map.
    ///
    /// # Errors
    /// [`InitError::NoUsableMemory`] if the map has no whole usable frame.
    pub fn table_entries_required(
        summary: &MemoryMapSummary,
        config: &AllocatorConfig,
    ) -> Result<usize, InitError> {
        TableLayout::for_summary(summary, config).map(|layout| layout.entries())
    }

    /// Build an allocator over the usable frames of `regions`.
    ///
    /// * Usable regions are narrowed inwards to frame boundaries. A usable
    ///   region that overlaps an earlier one only contributes frames not
    ///   already contributed.
    /// * `reserved` ranges are widened outwards to frame boundaries and never
    ///   enter the free pool. They must include the memory of `table` itself
    ///   if it lies in usable memory.
    /// * The remaining frames are seeded as the largest aligned blocks they
    ///   contain, through the same coalescing path as [`free`](Self::free).
    ///
    /// `table` may be larger than needed; the surplus stays untouched.
    ///
    /// # Errors
    /// * [`InitError::NoUsableMemory`] if the summary reports no usable frame.
    /// * [`InitError::TableTooSmall`] if `table` cannot cover the managed span.
    /// * [`InitError::NoFreeFrames`] if every usable frame is reserved.
    pub fn init<R, S>(
        summary: &MemoryMapSummary,
        regions: R,
        reserved: S,
        table: &'m mut [FrameInfo],
        config: &AllocatorConfig,
    ) -> Result<Self, InitError>
    where
        R: IntoIterator<Item = MemoryRegion>,
        R::IntoIter: Clone,
        S: IntoIterator<Item = PhysicalRange>,
    {
        let layout = TableLayout::for_summary(summary, config)?;
        let required = layout.entries();
        if table.len() < required {
            return Err(InitError::TableTooSmall {
                required,
                provided: table.len(),
            });
        }

        debug!(
            "frame table: {} entries ({}) for {}, max order {}",
            required,
            ByteSize(layout.bytes()),
            layout.span(),
            layout.max_order
        );

        let mut allocator = Self {
            table: FrameTable::new(&mut table[..required], layout.base),
            free_lists: [FreeList::EMPTY; ORDER_COUNT],
            max_order: layout.max_order,
            total_frames: 0,
            free_frames: 0,
        };

        for range in reserved {
            allocator.reserve(range.frames_outward());
        }
        if config.reserve_null_frame {
            allocator.reserve(PhysicalRange::new(
                PhysicalAddress::zero(),
                PhysicalAddress::new(FRAME_SIZE),
            ));
        }

        let regions = regions.into_iter();
        for (i, region) in regions.clone().enumerate() {
            let Some(frames) = region.usable_frames() else {
                continue;
            };
            let earlier = regions
                .clone()
                .take(i)
                .filter_map(|r| r.usable_frames());
            allocator.seed_uncovered(frames, earlier);
        }

        if allocator.free_frames == 0 {
            return Err(InitError::NoFreeFrames);
        }
        allocator.total_frames = allocator.free_frames;

        info!("buddy allocator ready: {}", allocator.stats());
        Ok(allocator)
    }

    /// Allocate one block of `2^order` frames.
    ///
    /// Returns the most recently freed block of the smallest sufficient
    /// order, split down to `order`.
    ///
    /// # Errors
    /// * [`AllocError::OrderTooLarge`] if `order > max_order`.
    /// * [`AllocError::OutOfMemory`] if no free block of order `>= order` exists.
    pub fn allocate(&mut self, order: u8) -> Result<FrameBlock, AllocError> {
        if order > self.max_order {
            return Err(AllocError::OrderTooLarge {
                order,
                max_order: self.max_order,
            });
        }

        let Some(mut current) =
            (order..=self.max_order).find(|&o| !self.free_lists[usize::from(o)].is_empty())
        else {
            return Err(AllocError::OutOfMemory { order });
        };
        let index = self.free_lists[usize::from(current)]
            .pop_front(&mut self.table)
            .ok_or(AllocError::OutOfMemory { order })?;

        while current > order {
            current -= 1;
            let upper = index + (1 << current);
            self.table.set(upper, FrameInfo::head(FrameState::Free, current));
            self.free_lists[usize::from(current)].push(&mut self.table, upper);
        }

        self.table
            .set(index, FrameInfo::head(FrameState::Allocated, order));
        self.free_frames -= frames_in_order(order);

        Ok(FrameBlock {
            address: self.table.address_of(index),
            order,
        })
    }

    /// Allocate at least `count` contiguous frames, rounded up to a power of two.
    ///
    /// # Errors
    /// [`AllocError::ZeroFrames`] for `count == 0`, otherwise as [`allocate`](Self::allocate).
    pub fn allocate_frames(&mut self, count: u64) -> Result<FrameBlock, AllocError> {
        if count == 0 {
            return Err(AllocError::ZeroFrames);
        }
        self.allocate(order_for_frames(count))
    }

    /// Return a block to the free pool, merging it with free buddies.
    ///
    /// # Errors
    /// The [`ConsistencyError`] describing why `address`/`order` does not
    /// name a block previously returned by [`allocate`](Self::allocate).
    /// The allocator is left unchanged in that case.
    pub fn try_free(&mut self, address: PhysicalAddress, order: u8) -> Result<(), ConsistencyError> {
        if order > self.max_order {
            return Err(ConsistencyError::OrderOutOfRange {
                order,
                max_order: self.max_order,
            });
        }
        if !address.is_aligned_to(bytes_for_order(order)) {
            return Err(ConsistencyError::Misaligned { address, order });
        }
        let Some(index) = self.table.index_of(address) else {
            return Err(ConsistencyError::OutOfRange { address });
        };

        let entry = self.table.get(index);
        match entry.state() {
            FrameState::Allocated if entry.order() == order => {}
            FrameState::Allocated => {
                return Err(ConsistencyError::OrderMismatch {
                    address,
                    allocated: entry.order(),
                    requested: order,
                });
            }
            FrameState::Free => return Err(ConsistencyError::DoubleFree { address }),
            FrameState::Untracked | FrameState::Reserved => {
                return Err(if self.usage_of(index) == FrameUsage::Free {
                    ConsistencyError::DoubleFree { address }
                } else {
                    ConsistencyError::NotAllocated { address }
                });
            }
        }

        self.table.set(index, FrameInfo::UNTRACKED);
        self.release(index, order);
        Ok(())
    }

    /// Return a block to the free pool.
    ///
    /// # Panics
    /// If the block was not allocated with this order; frame bookkeeping
    /// would be corrupted otherwise. See [`try_free`](Self::try_free).
    pub fn free(&mut self, address: PhysicalAddress, order: u8) {
        if let Err(err) = self.try_free(address, order) {
            error!("physical frame allocator: {err}");
            panic!("physical frame allocator: {err}");
        }
    }

    /// Free a block obtained from [`allocate_frames`](Self::allocate_frames) with the same `count`.
    ///
    /// # Errors
    /// [`ConsistencyError::ZeroFrames`] for `count == 0`, otherwise as [`try_free`](Self::try_free).
    pub fn free_frames(&mut self, address: PhysicalAddress, count: u64) -> Result<(), ConsistencyError> {
        if count == 0 {
            return Err(ConsistencyError::ZeroFrames);
        }
        self.try_free(address, order_for_frames(count))
    }

    #[must_use]
    pub const fn stats(&self) -> FrameStats {
        FrameStats {
            total_frames: self.total_frames,
            free_frames: self.free_frames,
            max_order: self.max_order,
        }
    }

    #[inline]
    #[must_use]
    pub const fn free_frame_count(&self) -> u64 {
        self.free_frames
    }

    #[inline]
    #[must_use]
    pub const fn total_frame_count(&self) -> u64 {
        self.total_frames
    }

    #[inline]
    #[must_use]
    pub const fn max_order(&self) -> u8 {
        self.max_order
    }

    /// The physical span the frame table covers.
    #[inline]
    #[must_use]
    pub const fn managed_span(&self) -> PhysicalRange {
        self.table.span()
    }

    /// Number of free blocks of exactly `order`.
    #[must_use]
    pub fn free_block_count(&self, order: u8) -> usize {
        self.free_lists
            .get(usize::from(order))
            .map_or(0, FreeList::len)
    }

    /// Start addresses of the free blocks of `order`, most recently freed first.
    pub fn free_blocks(&self, order: u8) -> impl Iterator<Item = PhysicalAddress> + '_ {
        let list = self
            .free_lists
            .get(usize::from(order))
            .copied()
            .unwrap_or(FreeList::EMPTY);
        list.iter(&self.table)
            .map(move |index| self.table.address_of(index))
    }

    /// Classify the frame containing `address`.
    #[must_use]
    pub fn frame_usage(&self, address: PhysicalAddress) -> FrameUsage {
        match self.table.index_of(address) {
            Some(index) => self.usage_of(index),
            None => FrameUsage::Unmanaged,
        }
    }

    /// Log the contents of every free list.
    pub fn dump_free_lists(&self) {
        for order in 0..=self.max_order {
            let list = self.free_lists[usize::from(order)];
            if list.is_empty() {
                info!("order {order}: (empty)");
                continue;
            }
            info!("order {order}: {} blocks of {}", list.len(), ByteSize(bytes_for_order(order)));
            for address in self.free_blocks(order) {
                info!("  -> {address}");
            }
        }
    }

    /// Check every free-list invariant.
    ///
    /// # Errors
    /// The first violation found: a broken back link, a linked block whose head
    /// entry does not say "free, this order", a misaligned block, two
    /// mergeable buddies, or free lists that disagree with the free counter.
    pub fn verify(&self) -> Result<(), ConsistencyError> {
        let mut counted = 0_u64;

        for order in 0..=self.max_order {
            let mut previous: Option<u32> = None;
            let mut linked = 0_usize;

            for index in self.free_lists[usize::from(order)].iter(&self.table) {
                let address = self.table.address_of(index);
                if self.table.get(index).prev() != previous.unwrap_or(NIL) {
                    return Err(ConsistencyError::BrokenLink { order, address });
                }
                if !self.table.get(index).is_free_head_of(order) {
                    return Err(ConsistencyError::CorruptFreeBlock { order, address });
                }
                if !address.is_aligned_to(bytes_for_order(order)) {
                    return Err(ConsistencyError::Misaligned { address, order });
                }
                if order < self.max_order
                    && let Some(buddy) = self.table.index_of(buddy_of(address, order))
                    && self.table.get(buddy).is_free_head_of(order)
                {
                    return Err(ConsistencyError::UnmergedBuddies { order, address });
                }

                previous = Some(index);
                linked += 1;
                counted += frames_in_order(order);
            }

            if linked != self.free_lists[usize::from(order)].len() {
                let address = self.table.address_of(previous.unwrap_or(0));
                return Err(ConsistencyError::CorruptFreeBlock { order, address });
            }
        }

        if counted != self.free_frames {
            return Err(ConsistencyError::FreeCountMismatch {
                counted,
                expected: self.free_frames,
            });
        }
        Ok(())
    }

    /// Mark every table frame in `range` as reserved.
    fn reserve(&mut self, range: PhysicalRange) {
        let indices = self.table.index_range(range);
        if indices.is_empty() {
            return;
        }
        debug!("reserving {range}");
        for index in indices {
            self.table.set(index, FrameInfo::head(FrameState::Reserved, 0));
        }
    }

    /// Seed the frames of `range` that no range of `earlier` covers.
    fn seed_uncovered<E>(&mut self, range: PhysicalRange, earlier: E)
    where
        E: Iterator<Item = PhysicalRange> + Clone,
    {
        let mut cursor = range.start();
        while cursor < range.end() {
            if let Some(covered_until) = earlier
                .clone()
                .filter(|r| r.contains(cursor))
                .map(PhysicalRange::end)
                .max()
            {
                cursor = covered_until;
                continue;
            }

            let chunk_end = earlier
                .clone()
                .map(PhysicalRange::start)
                .filter(|&start| start > cursor)
                .min()
                .map_or(range.end(), |start| start.min(range.end()));

            self.seed_range(PhysicalRange::new(cursor, chunk_end));
            cursor = chunk_end;
        }
    }

    /// Seed every non-reserved frame of `range` (frame-aligned).
    fn seed_range(&mut self, range: PhysicalRange) {
        let mut run_start: Option<u32> = None;
        let indices = self.table.index_range(range);
        let end = indices.end;

        for index in indices {
            let reserved = self.table.get(index).state() == FrameState::Reserved;
            match (reserved, run_start) {
                (true, Some(start)) => {
                    self.seed_run(start, index);
                    run_start = None;
                }
                (false, None) => run_start = Some(index),
                _ => {}
            }
        }
        if let Some(start) = run_start {
            self.seed_run(start, end);
        }
    }

    /// Seed frames `[start, end)` as the largest aligned blocks that fit.
    fn seed_run(&mut self, mut start: u32, end: u32) {
        while start < end {
            let mut order = 0;
            while order < self.max_order {
                let next = 1_u32 << (order + 1);
                if start % next != 0 || end - start < next {
                    break;
                }
                order += 1;
            }

            debug!(
                "seeding order-{order} block at {}",
                self.table.address_of(start)
            );
            self.release(start, order);
            start += 1 << order;
        }
    }

    /// Put the block at `index` on the free lists, merging upwards.
    ///
    /// The head entry must not be on any list.
    fn release(&mut self, mut index: u32, mut order: u8) {
        self.free_frames += frames_in_order(order);

        while order < self.max_order {
            let buddy_address = buddy_of(self.table.address_of(index), order);
            let Some(buddy) = self.table.index_of(buddy_address) else {
                break;
            };
            if !self.table.get(buddy).is_free_head_of(order) {
                break;
            }

            self.free_lists[usize::from(order)].remove(&mut self.table, buddy);
            self.table.set(buddy, FrameInfo::UNTRACKED);
            self.table.set(index, FrameInfo::UNTRACKED);
            index = index.min(buddy);
            order += 1;
        }

        self.table.set(index, FrameInfo::head(FrameState::Free, order));
        self.free_lists[usize::from(order)].push(&mut self.table, index);
    }

    /// Find the block containing frame `index` by probing each aligned head.
    fn usage_of(&self, index: u32) -> FrameUsage {
        if self.table.get(index).state() == FrameState::Reserved {
            return FrameUsage::Reserved;
        }
        for order in 0..=self.max_order {
            let head = index & !((1_u32 << order) - 1);
            let entry = self.table.get(head);
            if entry.order() < order {
                continue;
            }
            match entry.state() {
                FrameState::Free => return FrameUsage::Free,
                FrameState::Allocated => return FrameUsage::Allocated,
                FrameState::Untracked | FrameState::Reserved => {}
            }
        }
        FrameUsage::Unmanaged
    }
}
