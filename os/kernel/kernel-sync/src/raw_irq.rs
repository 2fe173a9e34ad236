use crate::{RawLock, RawSpin};
use core::sync::atomic::{AtomicBool, Ordering};

/// `IF` bit in `RFLAGS`.
const RFLAGS_IF: u64 = 1 << 9;

/// Spin lock that keeps interrupts masked for as long as it is held.
///
/// Locking snapshots the `IF` flag, executes `cli`, then spins for the lock.
/// Unlocking releases the lock and executes `sti` only if interrupts were
/// enabled when the lock was taken, so nested use from an interrupt handler
/// leaves interrupts off.
///
/// # Platform / Privilege
///
/// Uses `cli/sti` and `pushfq/pop`; requires `x86_64` and a privileged
/// context. Never use it from user space (including host test binaries).
pub struct RawIrqSpin {
    spin: RawSpin,
    /// Interrupt state of the current holder at the time it locked.
    restore_if: AtomicBool,
}

#[inline]
fn interrupts_enabled() -> bool {
    let flags: u64;
    unsafe {
        core::arch::asm!("pushfq; pop {}", out(reg) flags, options(nomem, preserves_flags));
    }
    flags & RFLAGS_IF != 0
}

#[inline]
fn disable_interrupts() {
    unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
}

#[inline]
fn enable_interrupts() {
    unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
}

unsafe impl RawLock for RawIrqSpin {
    const UNLOCKED: Self = Self {
        spin: RawSpin::new(),
        restore_if: AtomicBool::new(false),
    };

    fn lock(&self) {
        let enabled = interrupts_enabled();
        disable_interrupts();
        self.spin.lock();
        self.restore_if.store(enabled, Ordering::Relaxed);
    }

    fn try_lock(&self) -> bool {
        let enabled = interrupts_enabled();
        disable_interrupts();
        if self.spin.try_lock() {
            self.restore_if.store(enabled, Ordering::Relaxed);
            true
        } else {
            if enabled {
                enable_interrupts();
            }
            false
        }
    }

    unsafe fn unlock(&self) {
        let restore = self.restore_if.load(Ordering::Relaxed);
        unsafe { self.spin.unlock() };
        if restore {
            enable_interrupts();
        }
    }
}
