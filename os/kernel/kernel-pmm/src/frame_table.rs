//! # Frame metadata table
//!
//! One packed 64-bit [`FrameInfo`] per physical frame of the managed span,
//! indexed by `(address - base) / FRAME_SIZE`. The table lives in memory the
//! caller provides, so the allocator works before any heap exists.
//!
//! Only the first frame of a block carries state and order; the remaining
//! frames of a block stay [`FrameState::Untracked`]. The `next`/`prev` fields
//! are the intrusive free-list links.

use crate::config::AllocatorConfig;
use crate::error::InitError;
use crate::memory_map::MemoryMapSummary;
use crate::order::{bytes_for_order, frames_in_order, order_for_frames};
use bitfield_struct::bitfield;
use core::ops::Range;
use kernel_memory_addresses::{FRAME_SHIFT, FRAME_SIZE, PhysicalAddress, PhysicalRange, align_down};
use log::warn;

/// Link value meaning "no frame".
pub const NIL: u32 = (1 << 28) - 1;

/// Largest number of frames one table can describe (link fields are 28 bits, minus [`NIL`]).
pub const MAX_TABLE_FRAMES: u64 = NIL as u64;

/// What a frame table entry describes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameState {
    /// Not a block head: outside usable memory, or the interior of a block.
    Untracked = 0,
    /// Head of a free block; linked into the free list of its order.
    Free = 1,
    /// Head of an allocated block.
    Allocated = 2,
    /// Carved out at init (kernel image, boot structures, the table itself).
    Reserved = 3,
}

impl FrameState {
    const fn into_bits(self) -> u8 {
        self as _
    }

    const fn from_bits(value: u8) -> Self {
        match value {
            0 => Self::Untracked,
            1 => Self::Free,
            2 => Self::Allocated,
            _ => Self::Reserved,
        }
    }
}

/// Packed per-frame metadata.
///
/// | bits   | field   |
/// |--------|---------|
/// | 0..2   | `state` |
/// | 2..8   | `order` |
/// | 8..36  | `next`  |
/// | 36..64 | `prev`  |
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct FrameInfo {
    #[bits(2, default = FrameState::Untracked)]
    pub state: FrameState,
    /// Block order; meaningful for `Free` and `Allocated` heads only.
    #[bits(6)]
    pub order: u8,
    /// Next free block of the same order, or [`NIL`].
    #[bits(28)]
    pub next: u32,
    /// Previous free block of the same order, or [`NIL`].
    #[bits(28)]
    pub prev: u32,
}

impl FrameInfo {
    /// An untracked entry with no links.
    pub const UNTRACKED: Self = Self::new().with_next(NIL).with_prev(NIL);

    #[inline]
    #[must_use]
    pub const fn head(state: FrameState, order: u8) -> Self {
        Self::UNTRACKED.with_state(state).with_order(order)
    }

    #[inline]
    #[must_use]
    pub fn is_free_head_of(self, order: u8) -> bool {
        self.state() == FrameState::Free && self.order() == order
    }
}

/// Where the table starts, how many frames it covers, and the block order
/// limit that follows from the amount of usable memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TableLayout {
    pub base: PhysicalAddress,
    pub frames: u64,
    pub max_order: u8,
}

impl TableLayout {
    /// Compute the layout for a memory map.
    ///
    /// `max_order` is the smallest order whose block covers all usable
    /// frames, bounded by the configured ceiling. The span is
    /// `[lowest usable, highest usable)` widened to max-order block
    /// boundaries, so every buddy of a managed block lies inside the table.
    ///
    /// # Errors
    /// [`InitError::NoUsableMemory`] if the summary has less than one frame
    /// of usable memory.
    pub fn for_summary(
        summary: &MemoryMapSummary,
        config: &AllocatorConfig,
    ) -> Result<Self, InitError> {
        let usable_frames = summary.usable_frames();
        if summary.usable_regions == 0 || usable_frames == 0 {
            return Err(InitError::NoUsableMemory);
        }

        let max_order = order_for_frames(usable_frames).min(config.effective_ceiling());
        let block = bytes_for_order(max_order);

        let usable = summary.usable_span();
        let base = usable.start().align_down(block);
        let end = usable
            .end()
            .checked_align_up(block)
            .unwrap_or_else(|| PhysicalAddress::new(align_down(u64::MAX, block)));
        let mut frames = end.offset_from(base) / FRAME_SIZE;

        let cap = align_down(MAX_TABLE_FRAMES, frames_in_order(max_order));
        if frames > cap {
            warn!(
                "ignoring physical memory above {}: frame table is limited to {cap} frames",
                PhysicalAddress::new(base.as_u64() + cap * FRAME_SIZE)
            );
            frames = cap;
        }

        Ok(Self {
            base,
            frames,
            max_order,
        })
    }

    /// Number of [`FrameInfo`] entries the table needs.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn entries(&self) -> usize {
        // frames <= MAX_TABLE_FRAMES
        self.frames as usize
    }

    /// Size of the table storage in bytes.
    #[inline]
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.frames * size_of::<FrameInfo>() as u64
    }

    #[inline]
    #[must_use]
    pub const fn span(&self) -> PhysicalRange {
        PhysicalRange::new(
            self.base,
            PhysicalAddress::new(self.base.as_u64() + self.frames * FRAME_SIZE),
        )
    }
}

/// The frame metadata table over caller-provided storage.
pub struct FrameTable<'m> {
    entries: &'m mut [FrameInfo],
    base: PhysicalAddress,
}

impl<'m> FrameTable<'m> {
    /// Wrap `entries` as the table for frames starting at `base`; every
    /// entry is reset to [`FrameInfo::UNTRACKED`].
    pub fn new(entries: &'m mut [FrameInfo], base: PhysicalAddress) -> Self {
        entries.fill(FrameInfo::UNTRACKED);
        Self { entries, base }
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn len(&self) -> u32 {
        // bounded by MAX_TABLE_FRAMES
        self.entries.len() as u32
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[must_use]
    pub const fn span(&self) -> PhysicalRange {
        PhysicalRange::new(
            self.base,
            PhysicalAddress::new(self.base.as_u64() + (self.entries.len() as u64) * FRAME_SIZE),
        )
    }

    /// Index of the frame containing `addr`, if the table covers it.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index_of(&self, addr: PhysicalAddress) -> Option<u32> {
        if addr.as_u64() < self.base.as_u64() {
            return None;
        }
        let index = (addr.as_u64() - self.base.as_u64()) >> FRAME_SHIFT;
        if index < self.entries.len() as u64 {
            Some(index as u32)
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn address_of(&self, index: u32) -> PhysicalAddress {
        PhysicalAddress::new(self.base.as_u64() + ((index as u64) << FRAME_SHIFT))
    }

    /// Frame indices of the part of `range` the table covers.
    ///
    /// `range` must be frame-aligned.
    #[must_use]
    pub fn index_range(&self, range: PhysicalRange) -> Range<u32> {
        let clipped = range.intersect(self.span());
        if clipped.is_empty() {
            return 0..0;
        }
        let start = self.index_of(clipped.start()).unwrap_or(0);
        #[allow(clippy::cast_possible_truncation)]
        let count = clipped.frame_count() as u32;
        start..start + count
    }

    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[FrameInfo] {
        self.entries
    }

    #[inline]
    #[must_use]
    pub fn get(&self, index: u32) -> FrameInfo {
        self.entries[index as usize]
    }

    #[inline]
    pub fn set(&mut self, index: u32, info: FrameInfo) {
        self.entries[index as usize] = info;
    }

    #[inline]
    pub fn update(&mut self, index: u32, f: impl FnOnce(FrameInfo) -> FrameInfo) {
        let slot = &mut self.entries[index as usize];
        *slot = f(*slot);
    }
}
