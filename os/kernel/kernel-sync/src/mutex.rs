use crate::RawLock;
use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

/// Data protected by a raw lock `R`.
///
/// The locking discipline is injected through `R`, so the same protected
/// structure can sit behind a plain spin lock in tests and behind an
/// interrupt-masking lock in the kernel.
pub struct Mutex<T, R> {
    raw: R,
    cell: UnsafeCell<T>,
}

// Safety: the raw lock serializes all access to `cell`; only `T: Send` may cross threads.
unsafe impl<T: Send, R: RawLock + Sync> Sync for Mutex<T, R> {}
unsafe impl<T: Send, R: RawLock + Send> Send for Mutex<T, R> {}

impl<T, R: RawLock> Mutex<T, R> {
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self::from_raw(R::UNLOCKED, value)
    }

    #[must_use]
    pub const fn from_raw(raw: R, value: T) -> Self {
        Self {
            raw,
            cell: UnsafeCell::new(value),
        }
    }

    /// Spin until acquired, then return a guard.
    #[inline]
    #[must_use = "if unused the Mutex will immediately unlock"]
    pub fn lock(&self) -> MutexGuard<'_, T, R> {
        self.raw.lock();
        MutexGuard {
            m: self,
            _not_send: PhantomData,
        }
    }

    /// Try once; returns immediately.
    #[inline]
    #[must_use = "if unused the Mutex will immediately unlock"]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T, R>> {
        if self.raw.try_lock() {
            Some(MutexGuard {
                m: self,
                _not_send: PhantomData,
            })
        } else {
            None
        }
    }

    /// Run `f` with the lock held; the lock is released when `f` returns or unwinds.
    #[inline]
    pub fn with_lock<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        let mut g = self.lock();
        f(&mut g)
    }

    /// Mutable access through `&mut self`; no locking needed.
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.cell.get_mut()
    }

    #[inline]
    #[must_use]
    pub fn into_inner(self) -> T {
        self.cell.into_inner()
    }
}

/// Holds the lock until dropped.
///
/// Neither `Send` nor `Sync` by default: the lock must be released on the
/// context that took it (an interrupt-masking lock restores that CPU's
/// interrupt flag), and a shared guard only hands out `&T`.
pub struct MutexGuard<'a, T, R: RawLock> {
    m: &'a Mutex<T, R>,
    _not_send: PhantomData<*mut ()>,
}

// Safety: `&MutexGuard` only gives `&T`.
unsafe impl<T: Sync, R: RawLock> Sync for MutexGuard<'_, T, R> {}

impl<T, R: RawLock> Deref for MutexGuard<'_, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.m.cell.get() }
    }
}

impl<T, R: RawLock> DerefMut for MutexGuard<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.m.cell.get() }
    }
}

impl<T, R: RawLock> Drop for MutexGuard<'_, T, R> {
    fn drop(&mut self) {
        // Release publishes the critical section.
        unsafe { self.m.raw.unlock() }
    }
}
