//! # Kernel Boot Interface
//!
//! This crate defines the stable ABI through which the bootloader hands the
//! kernel everything it needs to bring up physical memory management.
//!
//! ## Overview
//!
//! The bootloader knows the physical memory layout; the kernel does not. Right
//! before jumping to the kernel entry point, the bootloader fills in a
//! [`KernelBootInfo`](boot::KernelBootInfo) structure describing:
//!
//! * **Memory Map**: a flat array of [`MemoryMapEntry`](boot::MemoryMapEntry)
//!   records (`base`, `length`, `kind` tag), one per physical region.
//! * **Kernel Image**: the physical extent the kernel was loaded into, which
//!   must never be handed out by the frame allocator.
//!
//! ## Boot Protocol
//!
//! ```text
//!  Bootloader                               Kernel
//!  ──────────                               ──────
//!  collect firmware memory map
//!  copy into MemoryMapEntry[] ──────────┐
//!  fill KernelBootInfo                  │
//!  jump to entry(&KernelBootInfo) ──────┼──▶ read mmap through a phys mapper
//!                                       └──▶ summarize, seed frame allocator
//! ```
//!
//! ## ABI Compatibility
//!
//! * **`#[repr(C)]`** on every structure; only fixed-size integers cross the
//!   boundary.
//! * **No Rust enums with payloads**: region kinds travel as raw `u32` tags
//!   (see [`boot::memory_kind`]) and are interpreted on the kernel side.
//! * **Physical pointers**: `mmap_ptr` is a *physical* address. The kernel must
//!   translate it before dereferencing.
//!
//! The bootloader owns the memory map buffer. The kernel reads it once during
//! physical memory bring-up and keeps no references into it afterwards.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
