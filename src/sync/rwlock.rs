//! Reader/writer locks.
//!
//! The raw locking protocol is abstracted behind [`RawLock`]
//! so that the spinning implementation can be swapped for a blocking one.
//! Data is only reachable through the scoped [`ReadGuard`] and [`WriteGuard`] types.

use std::cell::{RefCell, UnsafeCell};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use std::{fmt, mem, ops};

use parking_lot::lock_api::{RawRwLock as _, RawRwLockRecursive as _, RawRwLockTimed as _};

use super::{Backoff, DefaultLock};

/// The access mode requested from a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Shared access; any number of readers may hold the lock together.
    Read,
    /// Exclusive access; no other reader or writer may hold the lock.
    Write,
}

/// The raw locking protocol behind [`RwLock`].
///
/// # Safety
/// Implementors must guarantee that while a thread holds [`Mode::Write`],
/// no other thread holds the lock in any mode,
/// and that [`Mode::Read`] is never granted while a writer holds the lock.
pub unsafe trait RawLock: Default + Send + Sync + 'static {
    /// Acquires the lock, waiting until it is available.
    fn lock(&self, mode: Mode);

    /// Attempts to acquire the lock without waiting.
    fn try_lock(&self, mode: Mode) -> bool;

    /// Attempts to acquire the lock, queueing up as a waiter if it is unavailable.
    ///
    /// Meant for callers that retry until they succeed.
    /// A queued writer keeps new readers out,
    /// so the retrying caller is not starved by overlapping readers.
    fn try_lock_queued(&self, mode: Mode) -> bool { self.try_lock(mode) }

    /// Releases the lock.
    ///
    /// # Safety
    /// The current thread must hold the lock in `mode`.
    unsafe fn unlock(&self, mode: Mode);
}

const WRITER: usize = 1 << (usize::BITS - 1);
const WRITER_PENDING: usize = 1 << (usize::BITS - 2);
const READERS: usize = WRITER_PENDING - 1;

thread_local! {
    /// Read nesting depth of the current thread, keyed by lock address.
    static READ_NESTING: RefCell<Vec<(usize, usize)>> = RefCell::new(Vec::new());
}

/// A writer-preferring spinning reader/writer lock.
///
/// The state word stores the reader count in the low bits,
/// and a "writer active" and a "writer pending" flag in the two high bits.
/// Once a writer has registered itself as pending,
/// new readers are refused until a writer has completed.
///
/// Each thread additionally tracks how many read locks it holds on each lock,
/// so a thread that already holds read access may acquire it again
/// even when a writer is pending, instead of deadlocking against that writer.
pub struct SpinLock {
    state: AtomicUsize,
}

impl Default for SpinLock {
    fn default() -> Self { Self { state: AtomicUsize::new(0) } }
}

impl fmt::Debug for SpinLock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.state.load(Ordering::Relaxed);
        f.debug_struct("SpinLock")
            .field("readers", &(state & READERS))
            .field("writer", &(state & WRITER != 0))
            .field("writer_pending", &(state & WRITER_PENDING != 0))
            .finish()
    }
}

impl SpinLock {
    fn key(&self) -> usize { self as *const Self as usize }

    /// Returns the number of read locks the current thread holds on this lock.
    pub fn nested_reads(&self) -> usize {
        let key = self.key();
        READ_NESTING.with(|nesting| {
            nesting.borrow().iter().find(|&&(k, _)| k == key).map_or(0, |&(_, depth)| depth)
        })
    }

    fn push_nesting(&self) {
        let key = self.key();
        READ_NESTING.with(|nesting| {
            let mut nesting = nesting.borrow_mut();
            match nesting.iter_mut().find(|(k, _)| *k == key) {
                Some((_, depth)) => *depth += 1,
                None => nesting.push((key, 1)),
            }
        });
    }

    fn pop_nesting(&self) {
        let key = self.key();
        READ_NESTING.with(|nesting| {
            let mut nesting = nesting.borrow_mut();
            let index = nesting
                .iter()
                .position(|&(k, _)| k == key)
                .expect("read lock released on a thread that does not hold it");
            let depth = &mut nesting[index].1;
            *depth -= 1;
            if *depth == 0 {
                nesting.swap_remove(index);
            }
        });
    }

    /// Returns the number of readers currently holding the lock, across all threads.
    pub fn readers(&self) -> usize { self.state.load(Ordering::Relaxed) & READERS }

    /// Whether a writer currently holds the lock.
    pub fn is_write_locked(&self) -> bool { self.state.load(Ordering::Relaxed) & WRITER != 0 }

    /// Whether a writer has registered its request and is waiting for readers to leave.
    pub fn is_write_pending(&self) -> bool {
        self.state.load(Ordering::Relaxed) & WRITER_PENDING != 0
    }

    fn assert_not_reading(&self) {
        if self.nested_reads() > 0 {
            panic!(
                "Cannot acquire write access to a lock while the same thread holds read access \
                 to it"
            );
        }
    }

    fn reenter_read(&self) {
        // a writer cannot be active while this thread holds a read lock
        let prev = self.state.fetch_add(1, Ordering::Acquire);
        debug_assert_eq!(prev & WRITER, 0);
        self.push_nesting();
    }

    fn try_lock_read_fresh(&self) -> bool {
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            if state & (WRITER | WRITER_PENDING) != 0 {
                return false;
            }
            assert!(state & READERS != READERS, "reader count overflow");
            match self.state.compare_exchange_weak(
                state,
                state + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.push_nesting();
                    return true;
                }
                Err(actual) => state = actual,
            }
        }
    }

    fn try_lock_write(&self) -> bool {
        let state = self.state.load(Ordering::Relaxed);
        state & (WRITER | READERS) == 0
            && self
                .state
                .compare_exchange(state, WRITER, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }
}

unsafe impl RawLock for SpinLock {
    fn lock(&self, mode: Mode) {
        match mode {
            Mode::Read => {
                if self.nested_reads() > 0 {
                    self.reenter_read();
                    return;
                }

                let backoff = Backoff::new();
                while !self.try_lock_read_fresh() {
                    backoff.snooze();
                }
            }
            Mode::Write => {
                self.assert_not_reading();

                let backoff = Backoff::new();
                loop {
                    if self.try_lock_write() {
                        return;
                    }

                    let state = self.state.load(Ordering::Relaxed);
                    if state & WRITER_PENDING == 0 {
                        self.state.fetch_or(WRITER_PENDING, Ordering::Relaxed);
                    }
                    backoff.snooze();
                }
            }
        }
    }

    fn try_lock(&self, mode: Mode) -> bool {
        match mode {
            Mode::Read => {
                if self.nested_reads() > 0 {
                    self.reenter_read();
                    true
                } else {
                    self.try_lock_read_fresh()
                }
            }
            Mode::Write => self.nested_reads() == 0 && self.try_lock_write(),
        }
    }

    fn try_lock_queued(&self, mode: Mode) -> bool {
        match mode {
            Mode::Read => self.try_lock(Mode::Read),
            Mode::Write => {
                self.assert_not_reading();
                if self.try_lock_write() {
                    return true;
                }
                self.state.fetch_or(WRITER_PENDING, Ordering::Relaxed);
                false
            }
        }
    }

    unsafe fn unlock(&self, mode: Mode) {
        match mode {
            Mode::Read => {
                self.pop_nesting();
                let prev = self.state.fetch_sub(1, Ordering::Release);
                debug_assert!(prev & READERS > 0, "read unlock without readers");
            }
            Mode::Write => {
                // keep WRITER_PENDING so that readers stay out while other writers queue up
                let prev = self.state.fetch_and(!WRITER, Ordering::Release);
                debug_assert!(prev & WRITER != 0, "write unlock without writer");
            }
        }
    }
}

/// How long a queued writer parks on a [`BlockingLock`] before giving up the attempt.
const QUEUED_WRITE_TIMEOUT: Duration = Duration::from_micros(100);

/// A blocking reader/writer lock backed by [`parking_lot::RawRwLock`].
///
/// Shared locking is recursive, so nested reads on one thread behave like [`SpinLock`].
pub struct BlockingLock(parking_lot::RawRwLock);

impl Default for BlockingLock {
    fn default() -> Self { Self(parking_lot::RawRwLock::INIT) }
}

impl fmt::Debug for BlockingLock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BlockingLock").field("locked", &self.0.is_locked()).finish()
    }
}

unsafe impl RawLock for BlockingLock {
    fn lock(&self, mode: Mode) {
        match mode {
            Mode::Read => self.0.lock_shared_recursive(),
            Mode::Write => self.0.lock_exclusive(),
        }
    }

    fn try_lock(&self, mode: Mode) -> bool {
        match mode {
            Mode::Read => self.0.try_lock_shared_recursive(),
            Mode::Write => self.0.try_lock_exclusive(),
        }
    }

    fn try_lock_queued(&self, mode: Mode) -> bool {
        match mode {
            Mode::Read => self.0.try_lock_shared_recursive(),
            // a parked writer blocks new non-recursive readers
            Mode::Write => self.0.try_lock_exclusive_for(QUEUED_WRITE_TIMEOUT),
        }
    }

    unsafe fn unlock(&self, mode: Mode) {
        match mode {
            Mode::Read => self.0.unlock_shared(),
            Mode::Write => self.0.unlock_exclusive(),
        }
    }
}

/// A reader/writer lock protecting a value of type `T`.
pub struct RwLock<T: ?Sized, L: RawLock = DefaultLock> {
    raw:  L,
    data: UnsafeCell<T>,
}

// Safety: the raw lock serializes access to `data`.
unsafe impl<T: ?Sized + Send, L: RawLock> Send for RwLock<T, L> {}
unsafe impl<T: ?Sized + Send + Sync, L: RawLock> Sync for RwLock<T, L> {}

impl<T: Default, L: RawLock> Default for RwLock<T, L> {
    fn default() -> Self { Self::new(T::default()) }
}

impl<T: ?Sized + fmt::Debug, L: RawLock> fmt::Debug for RwLock<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.try_read() {
            Some(guard) => f.debug_struct("RwLock").field("data", &&*guard).finish(),
            None => f.debug_struct("RwLock").field("data", &"<locked>").finish(),
        }
    }
}

impl<T, L: RawLock> RwLock<T, L> {
    /// Creates a new unlocked lock.
    pub fn new(value: T) -> Self { Self { raw: L::default(), data: UnsafeCell::new(value) } }

    /// Consumes the lock and returns the protected value.
    pub fn into_inner(self) -> T { self.data.into_inner() }
}

impl<T: ?Sized, L: RawLock> RwLock<T, L> {
    /// Acquires shared access, waiting as long as necessary.
    pub fn read(&self) -> ReadGuard<'_, T, L> {
        self.raw.lock(Mode::Read);
        ReadGuard { raw: &self.raw, data: self.data.get(), _ph: PhantomData }
    }

    /// Acquires exclusive access, waiting as long as necessary.
    pub fn write(&self) -> WriteGuard<'_, T, L> {
        self.raw.lock(Mode::Write);
        WriteGuard { raw: &self.raw, data: self.data.get(), _ph: PhantomData }
    }

    /// Attempts to acquire shared access without waiting.
    pub fn try_read(&self) -> Option<ReadGuard<'_, T, L>> {
        self.raw.try_lock(Mode::Read).then(|| ReadGuard {
            raw:  &self.raw,
            data: self.data.get(),
            _ph:  PhantomData,
        })
    }

    /// Attempts to acquire exclusive access without waiting.
    pub fn try_write(&self) -> Option<WriteGuard<'_, T, L>> {
        self.raw.try_lock(Mode::Write).then(|| WriteGuard {
            raw:  &self.raw,
            data: self.data.get(),
            _ph:  PhantomData,
        })
    }

    /// Attempts to acquire exclusive access, queueing up as a pending writer on failure.
    ///
    /// See [`RawLock::try_lock_queued`].
    pub(super) fn try_write_queued(&self) -> Option<WriteGuard<'_, T, L>> {
        self.raw.try_lock_queued(Mode::Write).then(|| WriteGuard {
            raw:  &self.raw,
            data: self.data.get(),
            _ph:  PhantomData,
        })
    }

    /// Returns the protected value through unique access, without locking.
    pub fn get_mut(&mut self) -> &mut T { self.data.get_mut() }

    /// Returns the raw lock, mostly for diagnostics.
    pub fn raw(&self) -> &L { &self.raw }
}

/// Shared access to the data of a [`RwLock`], released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'t, T: ?Sized, L: RawLock = DefaultLock> {
    raw:  &'t L,
    data: *const T,
    _ph:  PhantomData<&'t T>,
}

// Safety: the guard only hands out shared references.
unsafe impl<'t, T: ?Sized + Sync, L: RawLock> Sync for ReadGuard<'t, T, L> {}

impl<'t, T: ?Sized, L: RawLock> ReadGuard<'t, T, L> {
    /// Projects the guard onto a part of the protected data.
    pub fn map<U: ?Sized>(this: Self, f: impl FnOnce(&T) -> &U) -> ReadGuard<'t, U, L> {
        // Safety: the lock is still held in read mode.
        let data: *const U = f(unsafe { &*this.data });
        let raw = this.raw;
        mem::forget(this);
        ReadGuard { raw, data, _ph: PhantomData }
    }

    /// Like [`map`](Self::map), but the projection may fail,
    /// in which case the original guard is returned.
    pub fn try_map<U: ?Sized>(
        this: Self,
        f: impl FnOnce(&T) -> Option<&U>,
    ) -> Result<ReadGuard<'t, U, L>, Self> {
        // Safety: the lock is still held in read mode.
        match f(unsafe { &*this.data }) {
            Some(data) => {
                let data: *const U = data;
                let raw = this.raw;
                mem::forget(this);
                Ok(ReadGuard { raw, data, _ph: PhantomData })
            }
            None => Err(this),
        }
    }
}

impl<'t, T: ?Sized, L: RawLock> ops::Deref for ReadGuard<'t, T, L> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the lock is held in read mode for the lifetime of the guard.
        unsafe { &*self.data }
    }
}

impl<'t, T: ?Sized, L: RawLock> Drop for ReadGuard<'t, T, L> {
    fn drop(&mut self) {
        // Safety: the guard was created after acquiring read access.
        unsafe { self.raw.unlock(Mode::Read) }
    }
}

impl<'t, T: ?Sized + fmt::Debug, L: RawLock> fmt::Debug for ReadGuard<'t, T, L> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { fmt::Debug::fmt(&**self, f) }
}

/// Exclusive access to the data of a [`RwLock`], released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'t, T: ?Sized, L: RawLock = DefaultLock> {
    raw:  &'t L,
    data: *mut T,
    _ph:  PhantomData<&'t mut T>,
}

// Safety: the guard hands out unique references only through `&mut self`.
unsafe impl<'t, T: ?Sized + Sync, L: RawLock> Sync for WriteGuard<'t, T, L> {}

impl<'t, T: ?Sized, L: RawLock> WriteGuard<'t, T, L> {
    /// Projects the guard onto a part of the protected data.
    pub fn map<U: ?Sized>(this: Self, f: impl FnOnce(&mut T) -> &mut U) -> WriteGuard<'t, U, L> {
        // Safety: the lock is still held in write mode.
        let data: *mut U = f(unsafe { &mut *this.data });
        let raw = this.raw;
        mem::forget(this);
        WriteGuard { raw, data, _ph: PhantomData }
    }

    /// Like [`map`](Self::map), but the projection may fail,
    /// in which case the original guard is returned.
    pub fn try_map<U: ?Sized>(
        this: Self,
        f: impl FnOnce(&mut T) -> Option<&mut U>,
    ) -> Result<WriteGuard<'t, U, L>, Self> {
        // Safety: the lock is still held in write mode.
        match f(unsafe { &mut *this.data }) {
            Some(data) => {
                let data: *mut U = data;
                let raw = this.raw;
                mem::forget(this);
                Ok(WriteGuard { raw, data, _ph: PhantomData })
            }
            None => Err(this),
        }
    }
}

impl<'t, T: ?Sized, L: RawLock> ops::Deref for WriteGuard<'t, T, L> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the lock is held in write mode for the lifetime of the guard.
        unsafe { &*self.data }
    }
}

impl<'t, T: ?Sized, L: RawLock> ops::DerefMut for WriteGuard<'t, T, L> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the lock is held in write mode for the lifetime of the guard.
        unsafe { &mut *self.data }
    }
}

impl<'t, T: ?Sized, L: RawLock> Drop for WriteGuard<'t, T, L> {
    fn drop(&mut self) {
        // Safety: the guard was created after acquiring write access.
        unsafe { self.raw.unlock(Mode::Write) }
    }
}

impl<'t, T: ?Sized + fmt::Debug, L: RawLock> fmt::Debug for WriteGuard<'t, T, L> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { fmt::Debug::fmt(&**self, f) }
}
