//! # Global frame allocator
//!
//! The kernel has exactly one [`BuddyAllocator`]. It is published once into
//! a [`GlobalFrameAllocator`] and from then on is reached only through the
//! mutex, whose raw lock `R` is a type parameter: host tests use a plain
//! [`RawSpin`], an interrupt-safe kernel build uses the interrupt-masking lock.
//!
//! Every public call takes the lock for exactly one allocate or free.

use crate::buddy::{BuddyAllocator, FrameBlock, FrameStats};
use crate::error::{AllocError, InitError};
use kernel_memory_addresses::PhysicalAddress;
use kernel_sync::{Mutex, RawLock, SyncOnceCell};
use log::{error, info};

#[cfg(not(all(target_arch = "x86_64", feature = "irq")))]
pub type KernelLock = kernel_sync::RawSpin;

#[cfg(all(target_arch = "x86_64", feature = "irq"))]
pub type KernelLock = kernel_sync::RawIrqSpin;

/// The kernel-wide physical frame allocator.
pub static PHYSICAL_MEMORY: GlobalFrameAllocator<KernelLock> = GlobalFrameAllocator::new();

/// A process-wide, initialize-once frame allocator behind a lock of type `R`.
pub struct GlobalFrameAllocator<R: RawLock> {
    inner: SyncOnceCell<Mutex<BuddyAllocator<'static>, R>>,
}

impl<R: RawLock> Default for GlobalFrameAllocator<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RawLock> GlobalFrameAllocator<R> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: SyncOnceCell::new(),
        }
    }

    /// Publish `allocator`. Only the first call succeeds.
    ///
    /// # Errors
    /// [`InitError::AlreadyInitialized`] on every later call; the rejected
    /// allocator is dropped.
    pub fn init(&self, allocator: BuddyAllocator<'static>) -> Result<(), InitError> {
        let stats = allocator.stats();
        match self.inner.set(Mutex::new(allocator)) {
            Ok(_) => {
                info!("physical frame allocator online: {stats}");
                Ok(())
            }
            Err(_) => Err(InitError::AlreadyInitialized),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    #[inline]
    fn allocator(&self) -> Result<&Mutex<BuddyAllocator<'static>, R>, AllocError> {
        self.inner.get().ok_or(AllocError::NotInitialized)
    }

    /// Allocate a block of `2^order` frames and return its physical address.
    ///
    /// # Errors
    /// [`AllocError::NotInitialized`] before [`init`](Self::init), otherwise
    /// as [`BuddyAllocator::allocate`].
    pub fn allocate_frame(&self, order: u8) -> Result<PhysicalAddress, AllocError> {
        let block = self.allocator()?.lock().allocate(order)?;
        Ok(block.address)
    }

    /// Like [`allocate_frame`](Self::allocate_frame) but never spins.
    ///
    /// # Errors
    /// [`AllocError::Contended`] if the lock is held elsewhere.
    pub fn try_allocate_frame(&self, order: u8) -> Result<PhysicalAddress, AllocError> {
        let mut allocator = self.allocator()?.try_lock().ok_or(AllocError::Contended)?;
        Ok(allocator.allocate(order)?.address)
    }

    /// Allocate at least `count` contiguous frames.
    ///
    /// # Errors
    /// As [`BuddyAllocator::allocate_frames`], or [`AllocError::NotInitialized`].
    pub fn allocate_frames(&self, count: u64) -> Result<FrameBlock, AllocError> {
        self.allocator()?.lock().allocate_frames(count)
    }

    /// Free a block returned by [`allocate_frame`](Self::allocate_frame).
    ///
    /// # Panics
    /// On any bookkeeping mismatch (see [`BuddyAllocator::free`]), or if the
    /// allocator was never initialized.
    pub fn free_frame(&self, address: PhysicalAddress, order: u8) {
        self.initialized_or_halt(address).lock().free(address, order);
    }

    /// Free a block returned by [`allocate_frames`](Self::allocate_frames).
    ///
    /// # Panics
    /// As [`free_frame`](Self::free_frame).
    pub fn free_frames(&self, address: PhysicalAddress, count: u64) {
        let result = self.initialized_or_halt(address).lock().free_frames(address, count);
        if let Err(err) = result {
            error!("physical frame allocator: {err}");
            panic!("physical frame allocator: {err}");
        }
    }

    /// Current counters, or `None` before initialization.
    #[must_use]
    pub fn stats(&self) -> Option<FrameStats> {
        self.inner.get().map(|m| m.lock().stats())
    }

    /// Run `f` with the allocator locked.
    ///
    /// # Errors
    /// [`AllocError::NotInitialized`] before [`init`](Self::init).
    pub fn with_allocator<U>(
        &self,
        f: impl FnOnce(&mut BuddyAllocator<'static>) -> U,
    ) -> Result<U, AllocError> {
        Ok(self.allocator()?.with_lock(f))
    }

    fn initialized_or_halt(&self, address: PhysicalAddress) -> &Mutex<BuddyAllocator<'static>, R> {
        if let Some(m) = self.inner.get() {
            return m;
        }
        error!("physical frame allocator: free of {address} before initialization");
        panic!("physical frame allocator: free of {address} before initialization");
    }
}
