//! Rank barriers let worker threads rendezvous with the tick of a single owning thread.
//!
//! The owner advances a rank counter once per logical tick.
//! Other threads calling [`Barrier::sync`] park until the rank they observed has been left,
//! and the owner does not return from its own `sync` until every thread
//! parked at the old rank has observed the advance.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex, RwLock};

use super::Backoff;

/// A rendezvous point between one owning thread and any number of waiting threads.
pub trait Barrier: Send + Sync {
    /// Synchronizes the calling thread with the barrier.
    ///
    /// On the owning thread, this advances the rank
    /// and waits until all threads waiting at the previous rank have left.
    /// On any other thread, this waits until the owner advances past the current rank.
    fn sync(&self);

    /// Releases every waiting thread and makes all future `sync` calls return immediately.
    fn force_release(&self);

    /// Whether [`force_release`](Self::force_release) was called since the last reset.
    fn is_released(&self) -> bool;

    /// Re-arms a released barrier.
    fn reset(&self);

    /// Makes the calling thread the owner of the barrier.
    fn bind_owner(&self);

    /// Returns the current rank.
    fn rank(&self) -> usize;
}

fn check_max_rank(max_rank: usize) {
    assert!(max_rank >= 2, "A rank barrier needs at least 2 ranks, got {max_rank}");
}

/// The busy-waiting rank barrier.
///
/// Waiting threads spin and then yield instead of parking in the kernel,
/// which is cheaper when ticks are shorter than a scheduler time slice.
#[derive(Debug)]
pub struct SpinBarrier {
    owner:    RwLock<ThreadId>,
    rank:     AtomicUsize,
    /// Number of threads waiting at each rank.
    waiting:  Box<[AtomicUsize]>,
    released: AtomicBool,
}

impl SpinBarrier {
    /// Creates a barrier owned by the calling thread, with ranks wrapping at `max_rank`.
    pub fn new(max_rank: usize) -> Self {
        check_max_rank(max_rank);
        Self {
            owner:    RwLock::new(thread::current().id()),
            rank:     AtomicUsize::new(0),
            waiting:  (0..max_rank).map(|_| AtomicUsize::new(0)).collect(),
            released: AtomicBool::new(false),
        }
    }

    /// Returns the number of threads currently waiting at `rank`.
    pub fn waiting_at(&self, rank: usize) -> usize {
        self.waiting.get(rank).map_or(0, |count| count.load(Ordering::Acquire))
    }

    fn is_owner(&self) -> bool { *self.owner.read() == thread::current().id() }
}

impl Barrier for SpinBarrier {
    fn sync(&self) {
        if self.is_released() {
            return;
        }

        let backoff = Backoff::new();

        if self.is_owner() {
            let old = self.rank.load(Ordering::Acquire);
            let new = (old + 1) % self.waiting.len();
            self.rank.store(new, Ordering::Release);

            let waiting = &self.waiting[old];
            while waiting.load(Ordering::Acquire) != 0 && !self.is_released() {
                backoff.snooze();
            }
        } else {
            let rank = self.rank.load(Ordering::Acquire);
            let waiting = &self.waiting[rank];
            waiting.fetch_add(1, Ordering::AcqRel);

            while self.rank.load(Ordering::Acquire) == rank && !self.is_released() {
                backoff.snooze();
            }

            waiting.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn force_release(&self) {
        log::debug!("Rank barrier force-released at rank {}", self.rank());
        self.released.store(true, Ordering::Release);
    }

    fn is_released(&self) -> bool { self.released.load(Ordering::Acquire) }

    fn reset(&self) { self.released.store(false, Ordering::Release); }

    fn bind_owner(&self) { *self.owner.write() = thread::current().id(); }

    fn rank(&self) -> usize { self.rank.load(Ordering::Acquire) }
}

#[derive(Debug)]
struct BlockingState {
    rank:     usize,
    waiting:  Vec<usize>,
    released: bool,
}

/// A rank barrier that parks waiting threads on condition variables.
///
/// Follows the same protocol as [`SpinBarrier`],
/// for builds where burning CPU while waiting is not acceptable.
#[derive(Debug)]
pub struct BlockingBarrier {
    owner:    RwLock<ThreadId>,
    state:    Mutex<BlockingState>,
    advanced: Condvar,
    drained:  Condvar,
}

impl BlockingBarrier {
    /// Creates a barrier owned by the calling thread, with ranks wrapping at `max_rank`.
    pub fn new(max_rank: usize) -> Self {
        check_max_rank(max_rank);
        Self {
            owner:    RwLock::new(thread::current().id()),
            state:    Mutex::new(BlockingState {
                rank:     0,
                waiting:  vec![0; max_rank],
                released: false,
            }),
            advanced: Condvar::new(),
            drained:  Condvar::new(),
        }
    }

    /// Returns the number of threads currently waiting at `rank`.
    pub fn waiting_at(&self, rank: usize) -> usize {
        self.state.lock().waiting.get(rank).copied().unwrap_or(0)
    }

    fn is_owner(&self) -> bool { *self.owner.read() == thread::current().id() }
}

impl Barrier for BlockingBarrier {
    fn sync(&self) {
        let mut state = self.state.lock();
        if state.released {
            return;
        }

        if self.is_owner() {
            let old = state.rank;
            state.rank = (old + 1) % state.waiting.len();
            self.advanced.notify_all();

            while state.waiting[old] != 0 && !state.released {
                self.drained.wait(&mut state);
            }
        } else {
            let rank = state.rank;
            state.waiting[rank] += 1;

            while state.rank == rank && !state.released {
                self.advanced.wait(&mut state);
            }

            state.waiting[rank] -= 1;
            if state.waiting[rank] == 0 {
                self.drained.notify_all();
            }
        }
    }

    fn force_release(&self) {
        let mut state = self.state.lock();
        log::debug!("Rank barrier force-released at rank {}", state.rank);
        state.released = true;
        self.advanced.notify_all();
        self.drained.notify_all();
    }

    fn is_released(&self) -> bool { self.state.lock().released }

    fn reset(&self) { self.state.lock().released = false; }

    fn bind_owner(&self) { *self.owner.write() = thread::current().id(); }

    fn rank(&self) -> usize { self.state.lock().rank }
}
