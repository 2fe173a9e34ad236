use crate::{FRAME_SIZE, align_down, checked_align_up};
use core::fmt;

/// Physical memory address.
///
/// Carries intent only; no claim is made that the address is backed by RAM
/// or mapped anywhere. Converting to a usable pointer is the job of whatever
/// physical mapper the caller has set up.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether the address is a multiple of `align` (a power of two).
    #[inline]
    #[must_use]
    pub const fn is_aligned_to(self, align: u64) -> bool {
        self.0 & (align - 1) == 0
    }

    #[inline]
    #[must_use]
    pub const fn is_frame_aligned(self) -> bool {
        self.is_aligned_to(FRAME_SIZE)
    }

    #[inline]
    #[must_use]
    pub const fn align_down(self, align: u64) -> Self {
        Self(align_down(self.0, align))
    }

    /// Align up to `align`, or `None` if the result does not fit in 64 bits.
    #[inline]
    #[must_use]
    pub const fn checked_align_up(self, align: u64) -> Option<Self> {
        match checked_align_up(self.0, align) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, bytes: u64) -> Option<Self> {
        match self.0.checked_add(bytes) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Distance in bytes from `origin` up to `self`.
    ///
    /// Saturates at zero if `origin` lies above `self`.
    #[inline]
    #[must_use]
    pub const fn offset_from(self, origin: Self) -> u64 {
        self.0.saturating_sub(origin.0)
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl fmt::LowerHex for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<PhysicalAddress> for u64 {
    #[inline]
    fn from(v: PhysicalAddress) -> Self {
        v.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_queries() {
        let pa = PhysicalAddress::new(0x8000);
        assert!(pa.is_frame_aligned());
        assert!(pa.is_aligned_to(0x8000));
        assert!(!pa.is_aligned_to(0x10000));
        assert_eq!(PhysicalAddress::new(0x8fff).align_down(FRAME_SIZE), pa);
        assert_eq!(
            PhysicalAddress::new(0x7001).checked_align_up(FRAME_SIZE),
            Some(pa)
        );
    }

    #[test]
    fn offset_from_saturates() {
        let lo = PhysicalAddress::new(0x1000);
        let hi = PhysicalAddress::new(0x3000);
        assert_eq!(hi.offset_from(lo), 0x2000);
        assert_eq!(lo.offset_from(hi), 0);
    }

    #[test]
    fn display_is_zero_padded_hex() {
        assert_eq!(
            format!("{}", PhysicalAddress::new(0xA000)),
            "0x000000000000A000"
        );
    }
}
