//! Claim-based splitting of data-parallel work.
//!
//! A [`JobPool`] holds `n` jobs sharing one callback.
//! Any number of threads may call [`JobPool::complete_job`] concurrently;
//! each call claims at most one job index, so every job runs exactly once.
//! Threads waiting for a pool can help draining it instead of idling.

use std::fmt;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::sync::Backoff;


/// How a thread waits for a job pool to complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitPriority {
    /// Park the thread until another thread completes the last job.
    ///
    /// The pool must be drained by other threads.
    Sleep,
    /// Help draining the remaining jobs, yielding while other threads finish theirs.
    Normal,
    /// Like [`Normal`](Self::Normal), but spin instead of yielding.
    RealTime,
}

type Callback = Box<dyn Fn(usize) + Send + Sync>;

/// A fixed number of identical jobs.
pub struct JobPool {
    count:    usize,
    /// Decremented once per claim; a previous value in `1..=count` is a valid claim.
    claims:   AtomicIsize,
    progress: AtomicUsize,
    callback: Callback,
    sleepers: Mutex<()>,
    wakeup:   Condvar,
}

impl JobPool {
    /// Creates a pool of `count` jobs, each calling `callback` with its index in `0..count`.
    ///
    /// # Panics
    /// Panics if `count` exceeds `isize::MAX`.
    pub fn new(count: usize, callback: impl Fn(usize) + Send + Sync + 'static) -> Self {
        let claims = isize::try_from(count).expect("too many jobs in one pool");
        Self {
            count,
            claims: AtomicIsize::new(claims),
            progress: AtomicUsize::new(0),
            callback: Box::new(callback),
            sleepers: Mutex::new(()),
            wakeup: Condvar::new(),
        }
    }

    /// Claims and runs one job.
    ///
    /// Returns `false` without doing anything if all jobs have been claimed.
    pub fn complete_job(&self) -> bool {
        if self.claims.load(Ordering::Relaxed) <= 0 {
            return false;
        }

        let claim = self.claims.fetch_sub(1, Ordering::AcqRel);
        if claim < 1 {
            return false;
        }

        let index = self.count - claim as usize;
        (self.callback)(index);

        let finished = self.progress.fetch_add(1, Ordering::AcqRel) + 1;
        if finished == self.count {
            let _guard = self.sleepers.lock();
            self.wakeup.notify_all();
        }
        true
    }

    /// Runs jobs on the current thread until no unclaimed job is left.
    ///
    /// Returns the number of jobs run by this call.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        while self.complete_job() {
            ran += 1;
        }
        ran
    }

    /// Whether every job has completed.
    pub fn is_done(&self) -> bool { self.progress() == self.count }

    /// Number of completed jobs.
    pub fn progress(&self) -> usize { self.progress.load(Ordering::Acquire) }

    /// Total number of jobs.
    pub fn len(&self) -> usize { self.count }

    /// Whether the pool has no jobs, in which case it is done from the start.
    pub fn is_empty(&self) -> bool { self.count == 0 }

    /// Blocks until every job has completed.
    pub fn wait(&self, priority: WaitPriority) {
        match priority {
            WaitPriority::Sleep => {
                let mut guard = self.sleepers.lock();
                while !self.is_done() {
                    self.wakeup.wait(&mut guard);
                }
            }
            WaitPriority::Normal => {
                while !self.is_done() {
                    if !self.complete_job() {
                        std::thread::yield_now();
                    }
                }
            }
            WaitPriority::RealTime => {
                let backoff = Backoff::new();
                while !self.is_done() {
                    if self.complete_job() {
                        backoff.reset();
                    } else {
                        backoff.spin();
                    }
                }
            }
        }
    }
}

impl fmt::Debug for JobPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("JobPool")
            .field("count", &self.count)
            .field("progress", &self.progress())
            .finish_non_exhaustive()
    }
}

/// A single background computation producing a `T`.
///
/// The computation is a job pool of one job,
/// so a [`Normal`](WaitPriority::Normal) or [`RealTime`](WaitPriority::RealTime) wait
/// runs it on the waiting thread if no worker has claimed it yet.
pub struct AsyncOperation<T> {
    pool:   Arc<JobPool>,
    result: Arc<Mutex<Option<T>>>,
}

impl<T: Send + 'static> AsyncOperation<T> {
    /// Wraps a computation. It does not run until a thread claims it.
    pub fn new(task: impl FnOnce() -> T + Send + 'static) -> Self {
        let result = Arc::new(Mutex::new(None));
        let task = Mutex::new(Some(task));
        let slot = Arc::clone(&result);

        let pool = JobPool::new(1, move |_| {
            let task = task.lock().take().expect("the only job is claimed once");
            *slot.lock() = Some(task());
        });

        Self { pool: Arc::new(pool), result }
    }
}

impl<T> AsyncOperation<T> {
    /// The job pool running the computation, for handing it to workers.
    pub fn pool(&self) -> &Arc<JobPool> { &self.pool }

    /// Whether the computation has completed.
    pub fn is_done(&self) -> bool { self.pool.is_done() }

    /// Blocks until the computation has completed.
    pub fn wait(&self, priority: WaitPriority) { self.pool.wait(priority) }

    /// Takes the result out of the operation.
    ///
    /// Returns `None` if the computation has not completed or its result was already taken.
    pub fn take(&self) -> Option<T> {
        match self.is_done() {
            true => self.result.lock().take(),
            false => None,
        }
    }

    /// Waits for the computation and returns its result.
    ///
    /// # Panics
    /// Panics if the result was already taken.
    pub fn join(self, priority: WaitPriority) -> T {
        self.wait(priority);
        self.take().expect("result of AsyncOperation was already taken")
    }
}

impl<T> fmt::Debug for AsyncOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AsyncOperation").field("done", &self.is_done()).finish()
    }
}
