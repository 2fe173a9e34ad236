//! # Boot bring-up
//!
//! Glue between the loader handoff ([`KernelBootInfo`]) and the allocator:
//!
//! 1. read the memory map through a [`PhysMapper`],
//! 2. summarize it,
//! 3. place the frame table in the first usable gap clear of the kernel
//!    image, the memory map buffer and any caller reservations,
//! 4. build the [`BuddyAllocator`] with all of those reserved,
//! 5. publish it as [`PHYSICAL_MEMORY`].
//!
//! The bootloader's memory is only borrowed while the allocator is built;
//! no pointer into it survives this module.

use crate::buddy::BuddyAllocator;
use crate::config::AllocatorConfig;
use crate::error::BootError;
use crate::frame_table::{FrameInfo, TableLayout};
use crate::global::{GlobalFrameAllocator, KernelLock, PHYSICAL_MEMORY};
use crate::memory_map::{MemoryMapSummary, summarize};
use crate::region::MemoryRegion;
use core::iter;
use kernel_info::boot::{KernelBootInfo, MemoryMapEntry, MemoryMapInfo, PhysicalExtent};
use kernel_memory_addresses::{FRAME_SIZE, PhysicalAddress, PhysicalRange};
use log::{debug, error};

/// Access to physical memory from the current address space.
///
/// The implementation belongs to the paging code (identity map, HHDM, ...).
pub trait PhysMapper {
    /// Convert a physical address to a usable pointer.
    ///
    /// # Safety
    /// The mapping must cover the physical range the caller goes on to
    /// access, and be writable if the caller writes through the pointer.
    unsafe fn phys_to_mut_ptr(&self, pa: PhysicalAddress) -> *mut u8;
}

/// The result of [`build_from_boot`].
pub struct BootMemory {
    pub allocator: BuddyAllocator<'static>,
    pub summary: MemoryMapSummary,
    /// Where the frame table was placed; reserved in `allocator`.
    pub table: PhysicalRange,
}

/// Build the allocator from the boot handoff without publishing it.
///
/// `extra_reserved` names further physical ranges (e.g. the boot info page
/// itself, ACPI tables still in use) that must not be handed out.
///
/// # Errors
/// Any [`BootError`]; all of them are boot-fatal.
///
/// # Safety
/// * `boot.mmap` must describe `mmap_len` readable [`MemoryMapEntry`] values
///   that `mapper` maps.
/// * `mapper` must map all usable memory writable; the memory chosen for the
///   frame table is taken over for the rest of the kernel's uptime.
pub unsafe fn build_from_boot<M: PhysMapper>(
    boot: &KernelBootInfo,
    mapper: &M,
    extra_reserved: &[PhysicalRange],
    config: &AllocatorConfig,
) -> Result<BootMemory, BootError> {
    let entries = unsafe { memory_map_entries(&boot.mmap, mapper) }?;
    let regions = entries.iter().map(MemoryRegion::from);
    let summary = summarize(regions.clone())?;

    let layout = TableLayout::for_summary(&summary, config)?;
    let reserved = [
        extent_range(boot.kernel_image),
        extent_range(boot.mmap.buffer_extent()),
    ]
    .into_iter()
    .chain(extra_reserved.iter().copied())
    .chain(null_frame(config));

    let table = find_table_gap(regions.clone(), reserved.clone(), layout.bytes()).ok_or(
        BootError::NoRoomForTable {
            bytes: layout.bytes(),
        },
    )?;
    debug!("placing frame table at {table}");

    let storage = unsafe { table_storage(mapper, table.start(), layout.entries()) };
    let allocator = BuddyAllocator::init(
        &summary,
        regions,
        reserved.chain(iter::once(table)),
        storage,
        config,
    )?;

    Ok(BootMemory {
        allocator,
        summary,
        table,
    })
}

/// Bring up physical memory and publish it as [`PHYSICAL_MEMORY`].
///
/// # Panics
/// On any boot-fatal condition: no usable memory, a malformed map, no room
/// for the frame table, or a second call.
///
/// # Safety
/// As [`build_from_boot`].
pub unsafe fn init_from_boot<M: PhysMapper>(
    boot: &KernelBootInfo,
    mapper: &M,
    extra_reserved: &[PhysicalRange],
    config: &AllocatorConfig,
) -> &'static GlobalFrameAllocator<KernelLock> {
    let memory = match unsafe { build_from_boot(boot, mapper, extra_reserved, config) } {
        Ok(memory) => memory,
        Err(err) => {
            error!("cannot bring up physical memory: {err}");
            panic!("cannot bring up physical memory: {err}");
        }
    };

    if let Err(err) = PHYSICAL_MEMORY.init(memory.allocator) {
        error!("cannot bring up physical memory: {err}");
        panic!("cannot bring up physical memory: {err}");
    }
    &PHYSICAL_MEMORY
}

/// First frame-aligned range of `bytes` inside a usable region that overlaps
/// none of `reserved`.
#[must_use]
pub fn find_table_gap<R, S>(regions: R, reserved: S, bytes: u64) -> Option<PhysicalRange>
where
    R: IntoIterator<Item = MemoryRegion>,
    S: Iterator<Item = PhysicalRange> + Clone,
{
    let frames = bytes.div_ceil(FRAME_SIZE).max(1);
    let size = frames * FRAME_SIZE;

    for usable in regions.into_iter().filter_map(|r| r.usable_frames()) {
        let mut cursor = usable.start();
        loop {
            let Some(candidate) = PhysicalRange::from_base_len(cursor, size) else {
                break;
            };
            if candidate.end() > usable.end() {
                break;
            }

            let blocker = reserved
                .clone()
                .map(PhysicalRange::frames_outward)
                .filter(|r| r.overlaps(candidate))
                .map(PhysicalRange::end)
                .max();
            match blocker {
                Some(end) => cursor = end,
                None => return Some(candidate),
            }
        }
    }
    None
}

#[inline]
const fn extent_range(extent: PhysicalExtent) -> PhysicalRange {
    let start = PhysicalAddress::new(extent.phys_start);
    match PhysicalRange::from_base_len(start, extent.phys_len) {
        Some(range) => range,
        None => PhysicalRange::new(start, PhysicalAddress::new(u64::MAX)),
    }
}

fn null_frame(config: &AllocatorConfig) -> Option<PhysicalRange> {
    config
        .reserve_null_frame
        .then_some(PhysicalRange::new(PhysicalAddress::zero(), PhysicalAddress::new(FRAME_SIZE)))
}

/// Borrow the bootloader's memory map entries.
///
/// # Errors
/// [`BootError::MemoryMapTooLarge`] if the array would wrap the physical
/// address space or exceed `isize::MAX` bytes.
///
/// # Safety
/// See [`build_from_boot`].
unsafe fn memory_map_entries<'b, M: PhysMapper>(
    mmap: &MemoryMapInfo,
    mapper: &M,
) -> Result<&'b [MemoryMapEntry], BootError> {
    if mmap.mmap_len == 0 {
        return Ok(&[]);
    }

    let address = PhysicalAddress::new(mmap.mmap_ptr);
    let too_large = BootError::MemoryMapTooLarge {
        address,
        entries: mmap.mmap_len,
    };
    let fits = mmap
        .mmap_len
        .checked_mul(MemoryMapInfo::ENTRY_SIZE)
        .filter(|&bytes| isize::try_from(bytes).is_ok())
        .and_then(|bytes| PhysicalRange::from_base_len(address, bytes));
    let (Some(_), Ok(len)) = (fits, usize::try_from(mmap.mmap_len)) else {
        return Err(too_large);
    };

    let ptr = unsafe { mapper.phys_to_mut_ptr(address) };
    Ok(unsafe { core::slice::from_raw_parts(ptr.cast::<MemoryMapEntry>(), len) })
}

/// Zero the frame table memory and hand it out as a slice.
///
/// # Safety
/// See [`build_from_boot`]; `start` must be frame-aligned.
unsafe fn table_storage<M: PhysMapper>(
    mapper: &M,
    start: PhysicalAddress,
    entries: usize,
) -> &'static mut [FrameInfo] {
    let ptr = unsafe { mapper.phys_to_mut_ptr(start) }.cast::<FrameInfo>();
    unsafe {
        ptr.write_bytes(0, entries);
        core::slice::from_raw_parts_mut(ptr, entries)
    }
}
