//! # Memory map reader
//!
//! Turns the bootloader's region list into a [`MemoryMapSummary`]: how much
//! usable RAM exists and where it starts and ends. Runs once, single-threaded,
//! before the frame allocator exists.
//!
//! Malformed entries (zero length, or an end beyond the address space) are
//! skipped with a warning; one bad entry never aborts the scan. Only when
//! nothing usable remains does [`summarize`] fail.

use crate::error::MemoryMapError;
use crate::region::MemoryRegion;
use crate::units::ByteSize;
use core::fmt;
use kernel_memory_addresses::{FRAME_SIZE, PhysicalAddress, PhysicalRange};
use log::{info, warn};

/// Aggregates derived from one scan of the boot memory map.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryMapSummary {
    /// Maximum of `base + length` over all usable regions.
    pub highest_usable_address: PhysicalAddress,
    /// Minimum `base` over all usable regions.
    pub lowest_usable_address: PhysicalAddress,
    /// Sum of the lengths of all usable regions.
    pub total_usable_bytes: u64,
    pub usable_regions: usize,
    /// Sum of the lengths of all valid, non-usable regions.
    pub unusable_bytes: u64,
    /// Number of malformed entries that were ignored.
    pub skipped_regions: usize,
}

impl MemoryMapSummary {
    /// Whole frames' worth of usable memory.
    #[inline]
    #[must_use]
    pub const fn usable_frames(&self) -> u64 {
        self.total_usable_bytes / FRAME_SIZE
    }

    /// `[lowest usable address, highest usable address)`.
    #[inline]
    #[must_use]
    pub const fn usable_span(&self) -> PhysicalRange {
        PhysicalRange::new(self.lowest_usable_address, self.highest_usable_address)
    }
}

impl fmt::Display for MemoryMapSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "highest usable address {}, {} usable in {} regions ({} bytes), {} skipped",
            self.highest_usable_address,
            ByteSize(self.total_usable_bytes),
            self.usable_regions,
            self.total_usable_bytes,
            self.skipped_regions
        )
    }
}

/// Scan `regions` once and aggregate the usable memory.
///
/// Every valid region is logged; malformed ones are logged as warnings and
/// counted in [`MemoryMapSummary::skipped_regions`]. The result does not
/// depend on the order of the regions.
///
/// # Errors
/// * [`MemoryMapError::Empty`] if `regions` yields nothing.
/// * [`MemoryMapError::Malformed`] if every region was malformed.
/// * [`MemoryMapError::NoUsableMemory`] if no valid region is usable.
pub fn summarize<I>(regions: I) -> Result<MemoryMapSummary, MemoryMapError>
where
    I: IntoIterator<Item = MemoryRegion>,
{
    let mut seen = 0_usize;
    let mut summary = MemoryMapSummary {
        highest_usable_address: PhysicalAddress::zero(),
        lowest_usable_address: PhysicalAddress::new(u64::MAX),
        total_usable_bytes: 0,
        usable_regions: 0,
        unusable_bytes: 0,
        skipped_regions: 0,
    };

    for region in regions {
        seen += 1;
        let Some(range) = region.range() else {
            warn!(
                "skipping malformed memory region: base {} length {:#x} ({})",
                region.base, region.length, region.kind
            );
            summary.skipped_regions += 1;
            continue;
        };

        info!("{range} {} {}", ByteSize(range.len()), region.kind);

        if region.kind.is_usable() {
            summary.usable_regions += 1;
            summary.total_usable_bytes = summary.total_usable_bytes.saturating_add(range.len());
            summary.highest_usable_address = summary.highest_usable_address.max(range.end());
            summary.lowest_usable_address = summary.lowest_usable_address.min(range.start());
        } else {
            summary.unusable_bytes = summary.unusable_bytes.saturating_add(range.len());
        }
    }

    if seen == 0 {
        return Err(MemoryMapError::Empty);
    }
    if summary.skipped_regions == seen {
        return Err(MemoryMapError::Malformed {
            skipped: summary.skipped_regions,
        });
    }
    if summary.usable_regions == 0 {
        return Err(MemoryMapError::NoUsableMemory);
    }

    info!("{summary}");
    Ok(summary)
}

/// Human-readable rendering of a memory map and its summary.
///
/// One line per region followed by the summary line:
///
/// ```text
/// [0x0000000000000000..0x0000000000009000) 36.00 KiB usable
/// [0x0000000000009000..0x000000000000A000) 4.00 KiB reserved
/// ...
/// highest usable address 0x0000000000010000, 60.00 KiB usable in 2 regions (61440 bytes), 0 skipped
/// ```
pub struct MemoryMapReport<'s, I> {
    regions: I,
    summary: &'s MemoryMapSummary,
}

impl<'s, I> MemoryMapReport<'s, I>
where
    I: Iterator<Item = MemoryRegion> + Clone,
{
    #[must_use]
    pub fn new<R>(regions: R, summary: &'s MemoryMapSummary) -> Self
    where
        R: IntoIterator<IntoIter = I>,
    {
        Self {
            regions: regions.into_iter(),
            summary,
        }
    }
}

impl<I> fmt::Display for MemoryMapReport<'_, I>
where
    I: Iterator<Item = MemoryRegion> + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for region in self.regions.clone() {
            match region.range() {
                Some(range) => {
                    writeln!(f, "{range} {} {}", ByteSize(range.len()), region.kind)?;
                }
                None => writeln!(
                    f,
                    "malformed: base {} length {:#x} ({})",
                    region.base, region.length, region.kind
                )?,
            }
        }
        write!(f, "{}", self.summary)
    }
}
