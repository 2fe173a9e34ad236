//! Block order arithmetic.
//!
//! A block of order `k` spans `2^k` frames and starts at a physical address
//! aligned to its own size. The two halves of an order `k + 1` block are
//! *buddies*; their addresses differ in exactly one bit.

use kernel_memory_addresses::{FRAME_SIZE, PhysicalAddress};

/// The largest order the allocator supports (inclusive), i.e. 4 GiB blocks.
pub const MAX_ORDER: u8 = 20;

/// Number of per-order free lists.
pub const ORDER_COUNT: usize = MAX_ORDER as usize + 1;

/// Number of frames in a block of the given order.
#[inline]
#[must_use]
pub const fn frames_in_order(order: u8) -> u64 {
    1 << order
}

/// Size in bytes of a block of the given order.
#[inline]
#[must_use]
pub const fn bytes_for_order(order: u8) -> u64 {
    FRAME_SIZE << order
}

/// The smallest order whose block holds at least `frames` frames.
///
/// `0` and `1` both map to order `0`. The result may exceed [`MAX_ORDER`].
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn order_for_frames(frames: u64) -> u8 {
    if frames <= 1 {
        0
    } else {
        // ceil(log2(frames)) <= 64
        (u64::BITS - (frames - 1).leading_zeros()) as u8
    }
}

/// Address of the buddy of the order-`order` block starting at `addr`.
#[inline]
#[must_use]
pub const fn buddy_of(addr: PhysicalAddress, order: u8) -> PhysicalAddress {
    PhysicalAddress::new(addr.as_u64() ^ bytes_for_order(order))
}
