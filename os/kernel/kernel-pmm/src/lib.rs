//! # Physical Memory Manager
//!
//! Discovers usable physical memory from the bootloader's memory map and
//! hands it out as power-of-two blocks of 4 KiB frames.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  boot memory map (borrowed)  │  kernel_info::boot::MemoryMapEntry
//! └──────────────┬───────────────┘
//!                │ summarize()
//! ┌──────────────▼───────────────┐
//! │      MemoryMapSummary        │  highest/lowest usable, total bytes
//! └──────────────┬───────────────┘
//!                │ BuddyAllocator::init()
//! ┌──────────────▼───────────────┐
//! │       BuddyAllocator         │  free lists per order, frame table
//! └──────────────┬───────────────┘
//!                │ GlobalFrameAllocator::init()
//! ┌──────────────▼───────────────┐
//! │      PHYSICAL_MEMORY         │  Mutex<_, R: RawLock>, init once
//! └──────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! * [`memory_map`]: [`summarize`] a region list into a [`MemoryMapSummary`];
//!   skips malformed regions with a warning; [`MemoryMapReport`] renders it.
//! * [`buddy`]: the [`BuddyAllocator`] with `allocate`/`free` by order,
//!   contiguous-frame helpers, statistics and a full invariant check.
//! * [`frame_table`]: one packed 64-bit [`FrameInfo`] per frame; holds block
//!   state and the intrusive free-list links. No heap required.
//! * [`global`]: the [`GlobalFrameAllocator`] singleton and [`PHYSICAL_MEMORY`].
//! * [`bootstrap`]: from [`KernelBootInfo`](kernel_info::boot::KernelBootInfo)
//!   to a published allocator.
//!
//! ## Errors
//!
//! Out of memory is an ordinary [`AllocError`]. Freeing something that was
//! never allocated (or with the wrong order) is a [`ConsistencyError`];
//! [`BuddyAllocator::free`] halts on it, [`BuddyAllocator::try_free`]
//! reports it.
//!
//! ## Features
//!
//! * `irq`: on `x86_64`, [`PHYSICAL_MEMORY`] masks interrupts while its lock
//!   is held, so it can be used from interrupt handlers.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod bootstrap;
pub mod buddy;
pub mod config;
pub mod error;
pub mod frame_table;
mod free_list;
pub mod global;
pub mod memory_map;
pub mod order;
pub mod region;
pub mod units;

pub use bootstrap::{BootMemory, PhysMapper, build_from_boot, init_from_boot};
pub use buddy::{BuddyAllocator, FrameBlock, FrameStats, FrameUsage};
pub use config::AllocatorConfig;
pub use error::{AllocError, BootError, ConsistencyError, InitError, MemoryMapError};
pub use frame_table::FrameInfo;
pub use global::{GlobalFrameAllocator, KernelLock, PHYSICAL_MEMORY};
pub use memory_map::{MemoryMapReport, MemoryMapSummary, summarize};
pub use order::{MAX_ORDER, buddy_of};
pub use region::{MemoryRegion, RegionKind};
