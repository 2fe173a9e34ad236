//! Error types, one per failure domain.
//!
//! * [`MemoryMapError`] and [`InitError`] are boot-fatal; the boot path halts on them.
//! * [`AllocError`] is recoverable and reported to the caller.
//! * [`ConsistencyError`] means frame bookkeeping was violated; [`BuddyAllocator::free`]
//!   halts on it.
//!
//! [`BuddyAllocator::free`]: crate::BuddyAllocator::free

use kernel_memory_addresses::PhysicalAddress;
use thiserror::Error;

/// The boot memory map cannot describe any usable memory.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum MemoryMapError {
    #[error("the boot memory map is empty")]
    Empty,
    #[error("all {skipped} boot memory map entries are malformed")]
    Malformed { skipped: usize },
    #[error("the boot memory map reports no usable memory")]
    NoUsableMemory,
}

/// The allocator could not be brought up.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("no usable memory to manage")]
    NoUsableMemory,
    #[error("frame table needs {required} entries but only {provided} were provided")]
    TableTooSmall { required: usize, provided: usize },
    #[error("every usable frame is reserved")]
    NoFreeFrames,
    #[error("the physical frame allocator is already initialized")]
    AlreadyInitialized,
}

/// A request the allocator cannot satisfy right now.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("out of physical memory: no free block of order {order}")]
    OutOfMemory { order: u8 },
    #[error("order {order} exceeds the maximum order {max_order}")]
    OrderTooLarge { order: u8, max_order: u8 },
    #[error("cannot allocate zero frames")]
    ZeroFrames,
    #[error("the physical frame allocator is not initialized")]
    NotInitialized,
    #[error("the physical frame allocator is locked by another context")]
    Contended,
}

/// Frame bookkeeping does not match the request, or is itself corrupt.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("order {order} exceeds the maximum order {max_order}")]
    OrderOutOfRange { order: u8, max_order: u8 },
    #[error("{address} is not aligned to an order-{order} block")]
    Misaligned { address: PhysicalAddress, order: u8 },
    #[error("{address} lies outside the managed physical range")]
    OutOfRange { address: PhysicalAddress },
    #[error("{address} is not the start of an allocated block")]
    NotAllocated { address: PhysicalAddress },
    #[error("{address} is already free")]
    DoubleFree { address: PhysicalAddress },
    #[error("{address} was allocated with order {allocated} but freed with order {requested}")]
    OrderMismatch {
        address: PhysicalAddress,
        allocated: u8,
        requested: u8,
    },
    #[error("cannot free zero frames")]
    ZeroFrames,
    #[error("free block {address} on the order-{order} list has a broken back link")]
    BrokenLink { order: u8, address: PhysicalAddress },
    #[error("free block {address} on the order-{order} list has a corrupt frame entry")]
    CorruptFreeBlock { order: u8, address: PhysicalAddress },
    #[error("free block {address} of order {order} and its buddy were not merged")]
    UnmergedBuddies { order: u8, address: PhysicalAddress },
    #[error("free lists hold {counted} frames but {expected} are accounted as free")]
    FreeCountMismatch { counted: u64, expected: u64 },
}

/// Bringing up physical memory from the boot handoff failed.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum BootError {
    #[error(transparent)]
    MemoryMap(#[from] MemoryMapError),
    #[error(transparent)]
    Init(#[from] InitError),
    #[error("no usable gap can hold the {bytes}-byte frame table")]
    NoRoomForTable { bytes: u64 },
    #[error("memory map of {entries} entries at {address} does not fit the address space")]
    MemoryMapTooLarge {
        address: PhysicalAddress,
        entries: u64,
    },
}
