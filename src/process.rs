//! Processes are named, interval-gated units of periodic work.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;


const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hashes byte strings with 64-bit FNV-1a, separating each part with a `0xff` byte.
pub(crate) fn fnv1a<'t>(parts: impl IntoIterator<Item = &'t [u8]>) -> u64 {
    let mut hash = FNV_OFFSET;
    for part in parts {
        for &byte in part.iter().chain(&[0xff]) {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

/// Identifies a process by its name, owner and interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u64);

impl ProcessId {
    /// Computes the id of a process.
    pub fn new(name: &str, owner: &str, interval: Duration) -> Self {
        let nanos = interval.as_nanos().to_le_bytes();
        Self(fnv1a([name.as_bytes(), owner.as_bytes(), &nanos[..]]))
    }

    /// The raw hash value.
    pub fn get(self) -> u64 { self.0 }
}

type Callback = Box<dyn FnMut(Duration) + Send>;

struct State {
    accumulated: Duration,
    callback:    Callback,
}

/// A callback that runs at most once per `interval`.
///
/// Time passed to [`tick`](Self::tick) accumulates until it reaches the interval.
/// The callback then receives the accumulated time and the accumulator restarts from zero.
/// A zero interval runs the callback on every tick.
pub struct Process {
    id:       ProcessId,
    name:     String,
    owner:    String,
    interval: Duration,
    state:    Mutex<State>,
}

impl Process {
    /// Creates a process.
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
        interval: Duration,
        callback: impl FnMut(Duration) + Send + 'static,
    ) -> Self {
        let name = name.into();
        let owner = owner.into();
        Self {
            id: ProcessId::new(&name, &owner, interval),
            name,
            owner,
            interval,
            state: Mutex::new(State { accumulated: Duration::ZERO, callback: Box::new(callback) }),
        }
    }

    /// The id of this process.
    pub fn id(&self) -> ProcessId { self.id }

    /// The name of this process.
    pub fn name(&self) -> &str { &self.name }

    /// The name of the system owning this process.
    pub fn owner(&self) -> &str { &self.owner }

    /// The minimum time between two runs of the callback.
    pub fn interval(&self) -> Duration { self.interval }

    /// Advances the process by `elapsed`.
    ///
    /// Returns whether the callback ran.
    pub fn tick(&self, elapsed: Duration) -> bool {
        let mut state = self.state.lock();
        state.accumulated += elapsed;
        if state.accumulated < self.interval {
            return false;
        }

        let accumulated = std::mem::take(&mut state.accumulated);
        (state.callback)(accumulated);
        true
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
