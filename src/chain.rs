//! Process chains group processes that tick together on one thread.
//!
//! Processes tick in the order they were hooked.
//! A chain either runs on a dedicated thread, looping until its exit flag is set,
//! or is ticked explicitly by the main thread.

use std::hint;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::process::{fnv1a, Process, ProcessId};
use crate::sync::RwLock;
use crate::tracer::{self, Tracer};
use crate::{Error, Result};


/// Identifies a chain by the hash of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainId(u64);

impl ChainId {
    /// Computes the id of a chain name.
    pub fn new(name: &str) -> Self { Self(fnv1a([name.as_bytes()])) }

    /// The raw hash value.
    pub fn get(self) -> u64 { self.0 }
}

/// An ordered collection of processes.
///
/// The chain only references its processes; they are owned by their systems.
#[derive(Debug)]
pub struct ProcessChain {
    id:        ChainId,
    name:      String,
    processes: RwLock<IndexMap<ProcessId, Arc<Process>>>,
    exit:      AtomicBool,
    low_power: AtomicBool,
    last_tick: Mutex<Option<Instant>>,
    ticks:     AtomicU64,
}

impl ProcessChain {
    /// Creates an empty chain.
    pub fn new(name: impl Into<String>, low_power: bool) -> Self {
        let name = name.into();
        Self {
            id: ChainId::new(&name),
            name,
            processes: RwLock::default(),
            exit: AtomicBool::new(false),
            low_power: AtomicBool::new(low_power),
            last_tick: Mutex::new(None),
            ticks: AtomicU64::new(0),
        }
    }

    /// The id of this chain.
    pub fn id(&self) -> ChainId { self.id }

    /// The name of this chain.
    pub fn name(&self) -> &str { &self.name }

    /// Appends a process to the chain.
    pub fn hook(&self, process: Arc<Process>) -> Result<()> {
        let mut processes = self.processes.write();
        let id = process.id();
        if processes.contains_key(&id) {
            return Err(Error::DuplicateProcess(id));
        }
        log::debug!("Hooked process {:?} into chain {:?}", process.name(), self.name);
        processes.insert(id, process);
        Ok(())
    }

    /// Removes a process from the chain, preserving the order of the others.
    pub fn unhook(&self, id: ProcessId) -> Result<Arc<Process>> {
        let process = self.processes.write().shift_remove(&id).ok_or(Error::UnknownProcess(id))?;
        log::debug!("Unhooked process {:?} from chain {:?}", process.name(), self.name);
        Ok(process)
    }

    /// Whether a process is hooked into this chain.
    pub fn contains(&self, id: ProcessId) -> bool { self.processes.read().contains_key(&id) }

    /// Number of hooked processes.
    pub fn len(&self) -> usize { self.processes.read().len() }

    /// Whether no process is hooked.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 { self.ticks.load(Ordering::Relaxed) }

    /// Ticks every process with the time elapsed since the previous tick.
    ///
    /// The first tick of a chain passes zero elapsed time.
    /// Returns the number of processes whose callback ran.
    pub fn tick(&self, tracer: &dyn Tracer, thread: tracer::Thread) -> usize {
        let now = Instant::now();
        let elapsed = match self.last_tick.lock().replace(now) {
            Some(last) => now - last,
            None => Duration::ZERO,
        };
        self.tick_with(elapsed, tracer, thread)
    }

    /// Ticks every process with an explicit elapsed time.
    pub fn tick_with(
        &self,
        elapsed: Duration,
        tracer: &dyn Tracer,
        thread: tracer::Thread,
    ) -> usize {
        tracer.start_chain_tick(thread, &self.name);

        // callbacks may hook or unhook processes on this chain
        let processes: Vec<_> = self.processes.read().values().cloned().collect();

        let mut ran = 0;
        for process in processes {
            if process.tick(elapsed) {
                tracer.run_process(&self.name, process.name(), elapsed);
                ran += 1;
            }
        }

        self.ticks.fetch_add(1, Ordering::Relaxed);
        tracer.end_chain_tick(thread, &self.name, ran);
        ran
    }

    /// Asks the loop in [`run`](Self::run) to stop at its next iteration.
    pub fn request_exit(&self) { self.exit.store(true, Ordering::Release); }

    /// Whether an exit was requested.
    pub fn should_exit(&self) -> bool { self.exit.load(Ordering::Acquire) }

    /// Switches between yielding (low power) and spinning between ticks.
    pub fn set_low_power(&self, low_power: bool) {
        self.low_power.store(low_power, Ordering::Relaxed);
    }

    /// Whether the loop yields between ticks.
    pub fn is_low_power(&self) -> bool { self.low_power.load(Ordering::Relaxed) }

    /// Ticks the chain until an exit is requested.
    pub fn run(&self, tracer: &dyn Tracer, thread: tracer::Thread) {
        while !self.should_exit() {
            self.tick(tracer, thread);
            if self.is_low_power() {
                std::thread::yield_now();
            } else {
                hint::spin_loop();
            }
        }
        log::debug!("Chain {:?} exited after {} ticks", self.name, self.ticks());
    }
}
