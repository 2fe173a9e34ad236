use kernel_sync::{Mutex, MutexGuard, RawLock, RawSpin, SpinMutex};
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::{panic, thread};

#[test]
fn basic_lock_and_raii() {
    let m: SpinMutex<u32> = Mutex::new(0);

    {
        let mut g = m.lock();
        *g = 41;
    }

    // previous guard must have unlocked on drop
    let mut g = m.lock();
    *g += 1;
    assert_eq!(*g, 42);
}

#[test]
fn try_lock_fails_while_held() {
    let m: SpinMutex<u8> = Mutex::new(1);

    let g1 = m.try_lock();
    assert!(g1.is_some());
    assert!(m.try_lock().is_none());

    drop(g1);
    assert!(m.try_lock().is_some());
}

#[test]
fn with_lock_releases_afterwards() {
    let m: SpinMutex<String> = Mutex::new(String::from("a"));
    let len = m.with_lock(|s| {
        s.push('b');
        s.len()
    });
    assert_eq!(len, 2);
    assert_eq!(m.with_lock(|s| s.clone()), "ab");
}

#[test]
fn get_mut_and_into_inner_bypass_the_lock() {
    let mut m: SpinMutex<Vec<i32>> = Mutex::new(vec![1, 2, 3]);
    m.get_mut().push(4);
    assert_eq!(m.lock().as_slice(), &[1, 2, 3, 4]);
    assert_eq!(m.into_inner(), vec![1, 2, 3, 4]);
}

#[test]
fn from_raw_uses_the_given_lock() {
    let m = Mutex::from_raw(RawSpin::new(), 7_u64);
    assert_eq!(*m.lock(), 7);
}

#[test]
fn raw_spin_tracks_holder() {
    let raw = RawSpin::UNLOCKED;
    assert!(!raw.is_locked());
    raw.lock();
    assert!(raw.is_locked());
    assert!(!raw.try_lock());
    unsafe { raw.unlock() };
    assert!(raw.try_lock());
    unsafe { raw.unlock() };
}

#[test]
fn contended_increments_are_exact_and_exclusive() {
    let threads = 8;
    let iters = 5_000;

    let lock: Arc<SpinMutex<usize>> = Arc::new(Mutex::new(0));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let in_cs = Arc::clone(&in_cs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..iters {
                    let mut g = lock.lock();
                    assert_eq!(in_cs.fetch_add(1, Ordering::SeqCst), 0);
                    *g += 1;
                    assert_eq!(in_cs.fetch_sub(1, Ordering::SeqCst), 1);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(*lock.lock(), threads * iters);
}

#[test]
fn lock_is_released_when_the_holder_panics() {
    let m: Arc<SpinMutex<u32>> = Arc::new(Mutex::new(0));

    let m2 = Arc::clone(&m);
    let r = thread::spawn(move || {
        let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            m2.with_lock(|v| {
                *v = 1;
                panic!("boom");
            });
        }));
    })
    .join();
    assert!(r.is_ok());

    assert_eq!(*m.try_lock().expect("lock must be free after unwind"), 1);
}

/// Compiles only if `T` lacks the auto trait `A` stands for; with the
/// trait implemented the `_` below is ambiguous.
trait AmbiguousIfSend<A> {
    fn check() {}
}
impl<T: ?Sized> AmbiguousIfSend<()> for T {}
impl<T: ?Sized + Send> AmbiguousIfSend<u8> for T {}

trait AmbiguousIfSync<A> {
    fn check() {}
}
impl<T: ?Sized> AmbiguousIfSync<()> for T {}
impl<T: ?Sized + Sync> AmbiguousIfSync<u8> for T {}

const fn assert_sync<T: Sync>() {}

#[test]
fn guards_stay_on_the_locking_context() {
    <MutexGuard<'static, u32, RawSpin> as AmbiguousIfSend<_>>::check();
    <MutexGuard<'static, Cell<u32>, RawSpin> as AmbiguousIfSend<_>>::check();

    // shared guards only hand out `&T`
    <MutexGuard<'static, Cell<u32>, RawSpin> as AmbiguousIfSync<_>>::check();
    assert_sync::<MutexGuard<'static, u32, RawSpin>>();

    // the mutex itself still shares `Send` data
    assert_sync::<SpinMutex<Cell<u32>>>();
}
