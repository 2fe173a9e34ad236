//! # Physical Memory Addresses and Ranges
//!
//! Strongly typed wrappers for raw physical addresses and the ranges of
//! 4 KiB frames that the physical memory manager hands out.
//!
//! ## Overview
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PhysicalAddress`] | A raw 64-bit physical address (RAM or MMIO). |
//! | [`PhysicalRange`] | A half-open physical range `[start, end)`. |
//!
//! Both are `#[repr(transparent)]` or plain `Copy` structs around `u64`
//! values and cost nothing at runtime. Alignment helpers are `const fn`.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0010_2042);
//! assert_eq!(pa.align_down(FRAME_SIZE).as_u64(), 0x0010_2000);
//! assert!(!pa.is_frame_aligned());
//!
//! let range = PhysicalRange::from_base_len(pa, 0x3000).unwrap();
//! let inner = range.frames_inward();
//! assert_eq!(inner.start().as_u64(), 0x0010_3000);
//! assert_eq!(inner.end().as_u64(), 0x0010_5000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod physical_address;
mod physical_range;

pub use physical_address::PhysicalAddress;
pub use physical_range::PhysicalRange;

/// Size of a single physical frame in bytes.
pub const FRAME_SIZE: u64 = 4096;

/// `log2(FRAME_SIZE)`.
pub const FRAME_SHIFT: u32 = 12;

const _: () = {
    assert!(FRAME_SIZE.is_power_of_two());
    assert!(1 << FRAME_SHIFT == FRAME_SIZE);
};

/// Align `x` down to the nearest multiple of `align`.
///
/// `align` must be a non-zero power of two.
#[inline(always)]
#[must_use]
pub const fn align_down(x: u64, align: u64) -> u64 {
    x & !(align - 1)
}

/// Align `x` up to the nearest multiple of `align`, or `None` if that
/// would overflow `u64`.
///
/// `align` must be a non-zero power of two.
#[inline(always)]
#[must_use]
pub const fn checked_align_up(x: u64, align: u64) -> Option<u64> {
    match x.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}
