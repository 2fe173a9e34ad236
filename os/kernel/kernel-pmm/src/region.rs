use core::fmt;
use kernel_info::boot::{MemoryMapEntry, memory_kind};
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};

/// Classification of a boot memory region.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// General purpose RAM, free for the kernel to use.
    Usable,
    Reserved,
    /// ACPI tables; reusable once they have been parsed.
    AcpiReclaimable,
    /// ACPI non-volatile storage; must be preserved across sleep states.
    AcpiNvs,
    BadMemory,
    /// Bootloader data and page tables; reusable after the handoff is consumed.
    BootloaderReclaimable,
    KernelAndModules,
    Framebuffer,
    /// Any tag this kernel does not know about.
    Other(u32),
}

impl RegionKind {
    /// Map a raw boot protocol tag (see [`memory_kind`]).
    #[must_use]
    pub const fn from_raw(tag: u32) -> Self {
        match tag {
            memory_kind::USABLE => Self::Usable,
            memory_kind::RESERVED => Self::Reserved,
            memory_kind::ACPI_RECLAIMABLE => Self::AcpiReclaimable,
            memory_kind::ACPI_NVS => Self::AcpiNvs,
            memory_kind::BAD_MEMORY => Self::BadMemory,
            memory_kind::BOOTLOADER_RECLAIMABLE => Self::BootloaderReclaimable,
            memory_kind::KERNEL_AND_MODULES => Self::KernelAndModules,
            memory_kind::FRAMEBUFFER => Self::Framebuffer,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Usable => memory_kind::USABLE,
            Self::Reserved => memory_kind::RESERVED,
            Self::AcpiReclaimable => memory_kind::ACPI_RECLAIMABLE,
            Self::AcpiNvs => memory_kind::ACPI_NVS,
            Self::BadMemory => memory_kind::BAD_MEMORY,
            Self::BootloaderReclaimable => memory_kind::BOOTLOADER_RECLAIMABLE,
            Self::KernelAndModules => memory_kind::KERNEL_AND_MODULES,
            Self::Framebuffer => memory_kind::FRAMEBUFFER,
            Self::Other(tag) => tag,
        }
    }

    /// Only [`RegionKind::Usable`] memory is handed to the frame allocator.
    #[inline]
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Usable)
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usable => f.write_str("usable"),
            Self::Reserved => f.write_str("reserved"),
            Self::AcpiReclaimable => f.write_str("ACPI reclaimable"),
            Self::AcpiNvs => f.write_str("ACPI NVS"),
            Self::BadMemory => f.write_str("bad memory"),
            Self::BootloaderReclaimable => f.write_str("bootloader reclaimable"),
            Self::KernelAndModules => f.write_str("kernel and modules"),
            Self::Framebuffer => f.write_str("framebuffer"),
            Self::Other(tag) => write!(f, "unknown ({tag})"),
        }
    }
}

/// One entry of the boot memory map.
///
/// A value copy of the bootloader's entry; nothing here points back into
/// bootloader-owned memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: PhysicalAddress,
    /// Length in bytes.
    pub length: u64,
    pub kind: RegionKind,
}

impl MemoryRegion {
    #[must_use]
    pub const fn new(base: PhysicalAddress, length: u64, kind: RegionKind) -> Self {
        Self { base, length, kind }
    }

    #[must_use]
    pub const fn usable(base: u64, length: u64) -> Self {
        Self::new(PhysicalAddress::new(base), length, RegionKind::Usable)
    }

    #[must_use]
    pub const fn reserved(base: u64, length: u64) -> Self {
        Self::new(PhysicalAddress::new(base), length, RegionKind::Reserved)
    }

    /// The byte range this region covers.
    ///
    /// `None` for malformed regions: zero length, or an end beyond the
    /// 64-bit address space.
    #[must_use]
    pub const fn range(&self) -> Option<PhysicalRange> {
        if self.length == 0 {
            return None;
        }
        PhysicalRange::from_base_len(self.base, self.length)
    }

    /// Whole frames usable by the allocator, or `None` if this region
    /// contributes none.
    #[must_use]
    pub fn usable_frames(&self) -> Option<PhysicalRange> {
        if !self.kind.is_usable() {
            return None;
        }
        self.range()
            .map(PhysicalRange::frames_inward)
            .filter(|r| !r.is_empty())
    }
}

impl From<&MemoryMapEntry> for MemoryRegion {
    fn from(entry: &MemoryMapEntry) -> Self {
        Self::new(
            PhysicalAddress::new(entry.base),
            entry.length,
            RegionKind::from_raw(entry.kind),
        )
    }
}

impl From<MemoryMapEntry> for MemoryRegion {
    fn from(entry: MemoryMapEntry) -> Self {
        Self::from(&entry)
    }
}
