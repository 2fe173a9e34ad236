use crate::{FRAME_SIZE, PhysicalAddress};
use core::fmt;

/// A half-open physical address range `[start, end)`.
///
/// Invariant: `start <= end`. An empty range has `start == end`.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct PhysicalRange {
    start: PhysicalAddress,
    end: PhysicalAddress,
}

impl PhysicalRange {
    pub const EMPTY: Self = Self {
        start: PhysicalAddress::zero(),
        end: PhysicalAddress::zero(),
    };

    /// Create `[start, end)`. An inverted pair yields an empty range at `start`.
    #[inline]
    #[must_use]
    pub const fn new(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        if end.as_u64() < start.as_u64() {
            Self { start, end: start }
        } else {
            Self { start, end }
        }
    }

    /// Create `[base, base + len)`, or `None` if the end overflows `u64`.
    #[inline]
    #[must_use]
    pub const fn from_base_len(base: PhysicalAddress, len: u64) -> Option<Self> {
        match base.checked_add(len) {
            Some(end) => Some(Self { start: base, end }),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn start(self) -> PhysicalAddress {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn end(self) -> PhysicalAddress {
        self.end
    }

    #[inline]
    #[must_use]
    pub const fn len(self) -> u64 {
        self.end.as_u64() - self.start.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.start.as_u64() == self.end.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn contains(self, addr: PhysicalAddress) -> bool {
        self.start.as_u64() <= addr.as_u64() && addr.as_u64() < self.end.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn overlaps(self, other: Self) -> bool {
        self.start.as_u64() < other.end.as_u64() && other.start.as_u64() < self.end.as_u64()
    }

    /// Number of whole frames in the range.
    #[inline]
    #[must_use]
    pub const fn frame_count(self) -> u64 {
        self.len() / FRAME_SIZE
    }

    /// Shrink to frame boundaries: start aligned up, end aligned down.
    ///
    /// The result only contains whole frames that lie entirely inside `self`.
    #[must_use]
    pub const fn frames_inward(self) -> Self {
        let end = self.end.align_down(FRAME_SIZE);
        match self.start.checked_align_up(FRAME_SIZE) {
            Some(start) if start.as_u64() < end.as_u64() => Self { start, end },
            _ => Self { start: end, end },
        }
    }

    /// Grow to frame boundaries: start aligned down, end aligned up.
    ///
    /// The result covers every frame that `self` touches. An end that would
    /// overflow is clamped to the last frame boundary of the address space.
    #[must_use]
    pub const fn frames_outward(self) -> Self {
        let start = self.start.align_down(FRAME_SIZE);
        let end = match self.end.checked_align_up(FRAME_SIZE) {
            Some(end) => end,
            None => PhysicalAddress::new(u64::MAX).align_down(FRAME_SIZE),
        };
        Self { start, end }
    }

    /// Intersection of both ranges, or an empty range if they are disjoint.
    #[must_use]
    pub const fn intersect(self, other: Self) -> Self {
        let start = if self.start.as_u64() > other.start.as_u64() {
            self.start
        } else {
            other.start
        };
        let end = if self.end.as_u64() < other.end.as_u64() {
            self.end
        } else {
            other.end
        };
        Self::new(start, end)
    }
}

impl fmt::Debug for PhysicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PR[0x{:X}..0x{:X})", self.start.as_u64(), self.end.as_u64())
    }
}

impl fmt::Display for PhysicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{})", self.start, self.end)
    }
}
