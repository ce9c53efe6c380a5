//! Synchronization primitives shared by the registry and the scheduler.
//!
//! All cross-thread containers are guarded by [`RwLock`],
//! and threads rendezvous with the main tick through a [`Barrier`].
//! Both come in a spinning flavour for sub-millisecond ticks
//! and a blocking flavour selected by the `blocking-sync` feature.

mod backoff;
pub use backoff::Backoff;

mod rwlock;
pub use rwlock::{BlockingLock, Mode, RawLock, ReadGuard, RwLock, SpinLock, WriteGuard};

mod multiguard;
pub use multiguard::{acquire_all, try_acquire_all, Attempt, LockRequest, Read, Write};

mod barrier;
pub use barrier::{Barrier, BlockingBarrier, SpinBarrier};

cfg_if::cfg_if! {
    if #[cfg(feature = "blocking-sync")] {
        /// The lock implementation used by default.
        pub type DefaultLock = BlockingLock;
        /// The barrier implementation used by default.
        pub type DefaultBarrier = BlockingBarrier;
    } else {
        /// The lock implementation used by default.
        pub type DefaultLock = SpinLock;
        /// The barrier implementation used by default.
        pub type DefaultBarrier = SpinBarrier;
    }
}
