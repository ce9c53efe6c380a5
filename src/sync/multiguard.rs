//! Acquiring several locks at once without a global lock order.
//!
//! A request is tried as a whole: every lock is try-locked in sequence,
//! and if any of them is unavailable, the guards acquired so far are dropped
//! before the thread backs off and retries.
//! A thread therefore never waits while holding part of a request,
//! which rules out lock-order deadlocks between multi-lock requests.
//!
//! While [`acquire_all`] retries, an unavailable write lock keeps its writer
//! registered as pending, so a steady stream of readers cannot starve the request.

use super::{Backoff, DefaultLock, RawLock, ReadGuard, RwLock, WriteGuard};

/// Number of failed attempts after which a contention message is logged.
const CONTENTION_LOG_THRESHOLD: usize = 1 << 16;

/// How an attempt treats locks it cannot take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Leaves unavailable locks untouched.
    Once,
    /// Queues up as a pending writer on unavailable write locks.
    ///
    /// Only for callers that retry until they succeed,
    /// since the pending flag refuses new readers until a writer completes.
    Retrying,
}

/// A set of locks to acquire together.
pub trait LockRequest<'t> {
    /// The guards held once the request is granted.
    type Guard: 't;

    /// Tries to acquire every lock of the request without waiting.
    ///
    /// Returns `None` if any lock is unavailable.
    /// Locks acquired during a failed attempt are released before returning.
    ///
    /// # Panics
    /// With [`Attempt::Retrying`], requesting write access to a [`SpinLock`](super::SpinLock)
    /// that the current thread holds read access to panics, like [`RwLock::write`].
    fn try_acquire(&self, attempt: Attempt) -> Option<Self::Guard>;
}

/// Requests shared access to a lock.
pub struct Read<'t, T: ?Sized, L: RawLock = DefaultLock>(pub &'t RwLock<T, L>);

/// Requests exclusive access to a lock.
pub struct Write<'t, T: ?Sized, L: RawLock = DefaultLock>(pub &'t RwLock<T, L>);

impl<'t, T: ?Sized, L: RawLock> LockRequest<'t> for Read<'t, T, L> {
    type Guard = ReadGuard<'t, T, L>;

    fn try_acquire(&self, _: Attempt) -> Option<Self::Guard> { self.0.try_read() }
}

impl<'t, T: ?Sized, L: RawLock> LockRequest<'t> for Write<'t, T, L> {
    type Guard = WriteGuard<'t, T, L>;

    fn try_acquire(&self, attempt: Attempt) -> Option<Self::Guard> {
        match attempt {
            Attempt::Once => self.0.try_write(),
            Attempt::Retrying => self.0.try_write_queued(),
        }
    }
}

impl<'t, R: LockRequest<'t>> LockRequest<'t> for Vec<R> {
    type Guard = Vec<R::Guard>;

    fn try_acquire(&self, attempt: Attempt) -> Option<Self::Guard> {
        self.iter().map(|request| request.try_acquire(attempt)).collect()
    }
}

macro_rules! impl_tuple_request {
    ($($name:ident $index:tt),*) => {
        impl<'t, $($name: LockRequest<'t>),*> LockRequest<'t> for ($($name,)*) {
            type Guard = ($($name::Guard,)*);

            fn try_acquire(&self, attempt: Attempt) -> Option<Self::Guard> {
                // elements evaluated before a failing `?` are dropped, releasing their locks
                Some(($(self.$index.try_acquire(attempt)?,)*))
            }
        }
    };
}

impl_tuple_request!(A 0);
impl_tuple_request!(A 0, B 1);
impl_tuple_request!(A 0, B 1, C 2);
impl_tuple_request!(A 0, B 1, C 2, D 3);

/// Acquires every lock in `request`, retrying until all of them are held at the same time.
///
/// # Panics
/// Panics if the request asks for write access to a [`SpinLock`](super::SpinLock)
/// that the current thread already reads, since that request could never be granted.
pub fn acquire_all<'t, R: LockRequest<'t>>(request: R) -> R::Guard {
    let backoff = Backoff::new();
    let mut attempts = 0_usize;
    loop {
        if let Some(guard) = request.try_acquire(Attempt::Retrying) {
            return guard;
        }

        attempts += 1;
        if attempts % CONTENTION_LOG_THRESHOLD == 0 {
            log::debug!("Multi-lock request still contended after {attempts} attempts");
        }
        backoff.snooze();
    }
}

/// Makes a single attempt at acquiring every lock in `request`.
pub fn try_acquire_all<'t, R: LockRequest<'t>>(request: R) -> Option<R::Guard> {
    request.try_acquire(Attempt::Once)
}
