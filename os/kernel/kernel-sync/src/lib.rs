//! # Kernel synchronization primitives
//!
//! The physical memory manager must be callable from any core and from
//! interrupt context, and it must work before any scheduler exists. Everything
//! here therefore spins; nothing sleeps.
//!
//! * [`RawLock`]: a data-less lock. The locking discipline is a type parameter
//!   so that callers choose it, and tests can run the same code on the host.
//! * [`RawSpin`]: test-and-test-and-set spin lock.
//! * `RawIrqSpin` (x86_64, feature `irq`): spin lock that also masks
//!   interrupts while held.
//! * [`Mutex`]: owns data behind any [`RawLock`].
//! * [`SyncOnceCell`]: publish a value exactly once, e.g. a global singleton.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod mutex;
#[cfg(all(target_arch = "x86_64", feature = "irq"))]
mod raw_irq;
mod raw_spin;
mod sync_once_cell;

pub use mutex::{Mutex, MutexGuard};
#[cfg(all(target_arch = "x86_64", feature = "irq"))]
pub use raw_irq::RawIrqSpin;
pub use raw_spin::RawSpin;
pub use sync_once_cell::SyncOnceCell;

pub type SpinMutex<T> = Mutex<T, RawSpin>;

/// A raw mutual-exclusion primitive that protects no data by itself.
///
/// # Safety
/// Implementations must guarantee that after `lock` returns (or `try_lock`
/// returns `true`) no other caller acquires the lock until `unlock` is called.
pub unsafe trait RawLock {
    /// The unlocked state, used to build locks in `const` contexts.
    const UNLOCKED: Self;

    /// Acquire the lock, spinning until it is available.
    fn lock(&self);

    /// Try to acquire the lock once without spinning.
    fn try_lock(&self) -> bool;

    /// Release the lock.
    ///
    /// # Safety
    /// The caller must currently hold the lock.
    unsafe fn unlock(&self);
}
