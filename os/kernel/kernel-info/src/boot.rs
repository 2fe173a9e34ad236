//! # Kernel Boot Information

/// Information the kernel needs to bring up physical memory management.
/// Keep this `#[repr(C)]` and prefer fixed-size integers at the ABI boundary.
#[repr(C)]
#[derive(Clone, Debug)]
pub struct KernelBootInfo {
    /// Memory map information.
    pub mmap: MemoryMapInfo,

    /// Physical extent of the loaded kernel image (text, data, bss).
    pub kernel_image: PhysicalExtent,
}

/// Location of the memory map array handed over by the bootloader.
#[repr(C)]
#[derive(Clone, Debug)]
pub struct MemoryMapInfo {
    /// **Physical** address of the first [`MemoryMapEntry`].
    pub mmap_ptr: u64,

    /// Number of entries in the array (not bytes).
    pub mmap_len: u64,
}

impl MemoryMapInfo {
    /// Size of a single entry in bytes.
    pub const ENTRY_SIZE: u64 = size_of::<MemoryMapEntry>() as u64;

    /// The physical bytes occupied by the entry array itself.
    ///
    /// Saturates instead of overflowing on a corrupt `mmap_len`.
    #[must_use]
    pub const fn buffer_extent(&self) -> PhysicalExtent {
        PhysicalExtent {
            phys_start: self.mmap_ptr,
            phys_len: self.mmap_len.saturating_mul(Self::ENTRY_SIZE),
        }
    }
}

/// A single physical memory region as reported by the firmware.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryMapEntry {
    /// Physical base address of the region.
    pub base: u64,

    /// Length of the region in **bytes**.
    pub length: u64,

    /// Region type tag, one of the [`memory_kind`] constants (or an unknown value).
    pub kind: u32,
}

/// A physical `[phys_start, phys_start + phys_len)` extent.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PhysicalExtent {
    pub phys_start: u64,
    pub phys_len: u64,
}

/// Raw region type tags carried in [`MemoryMapEntry::kind`].
///
/// Tag values follow the Limine boot protocol.
pub mod memory_kind {
    /// RAM that is free for general use.
    pub const USABLE: u32 = 0;
    /// Firmware-reserved; never touch.
    pub const RESERVED: u32 = 1;
    /// ACPI tables; reclaimable once they have been parsed.
    pub const ACPI_RECLAIMABLE: u32 = 2;
    /// ACPI non-volatile storage; must be preserved across sleep states.
    pub const ACPI_NVS: u32 = 3;
    /// Defective RAM.
    pub const BAD_MEMORY: u32 = 4;
    /// Bootloader data structures; reclaimable once the handoff is consumed.
    pub const BOOTLOADER_RECLAIMABLE: u32 = 5;
    /// The kernel image and boot modules.
    pub const KERNEL_AND_MODULES: u32 = 6;
    /// Linear framebuffer memory.
    pub const FRAMEBUFFER: u32 = 7;
}

const _: () = {
    assert!(size_of::<MemoryMapEntry>() == 24);
};
