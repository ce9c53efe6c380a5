//! The scheduler owns the threads that tick process chains and drain job pools.
//!
//! The number of threads is bounded by the hardware concurrency
//! minus a margin reserved for the OS and the main thread.
//! Each threaded chain occupies one thread for its whole lifetime.
//! Generic worker threads each own a private command queue
//! and share one queue of job pools.
//!
//! The main thread ticks the main chains through [`Scheduler::tick_main`],
//! which also advances the rank barrier that other threads rendezvous with.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::{fmt, mem};

use crossbeam_channel::{Receiver, Sender};
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::chain::{ChainId, ProcessChain};
use crate::job::{AsyncOperation, JobPool};
use crate::process::{Process, ProcessId};
use crate::sync::{Barrier, DefaultBarrier, RwLock};
use crate::tracer::{self, Noop, Tracer};
use crate::{Config, Error, Result};

mod worker;


/// Where a chain runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainMode {
    /// Ticked by [`Scheduler::tick_main`] on the calling thread.
    Main,
    /// Ticked in a loop on a dedicated thread.
    Threaded,
}

/// A unit of work sent to a specific worker thread.
pub type Command = Box<dyn FnOnce() + Send>;

struct ChainEntry {
    chain: Arc<ProcessChain>,
    mode:  ChainMode,
}

/// Runs process chains and job pools.
pub struct Scheduler {
    budget:        usize,
    low_power:     bool,
    tracer:        Arc<dyn Tracer>,
    barrier:       DefaultBarrier,
    chains:        RwLock<IndexMap<String, ChainEntry>>,
    threads_used:  AtomicUsize,
    chain_threads: AtomicUsize,
    handles:       Mutex<Vec<JoinHandle<()>>>,
    /// The private command queue of each worker thread.
    commands:      RwLock<HashMap<ThreadId, Sender<Command>>>,
    jobs_tx:       Sender<Arc<JobPool>>,
    jobs_rx:       Receiver<Arc<JobPool>>,
    exit:          Arc<AtomicBool>,
}

impl Scheduler {
    /// Creates a scheduler that does not trace events.
    ///
    /// The calling thread becomes the main thread.
    pub fn new(config: &Config) -> Self { Self::with_tracer(config, Arc::new(Noop)) }

    /// Creates a scheduler reporting events to `tracer`.
    ///
    /// The calling thread becomes the main thread.
    pub fn with_tracer(config: &Config, tracer: Arc<dyn Tracer>) -> Self {
        let budget = config.thread_budget();
        log::debug!("Scheduler may use {budget} threads");

        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded();
        Self {
            budget,
            low_power: config.low_power,
            tracer,
            barrier: DefaultBarrier::new(config.max_rank),
            chains: RwLock::default(),
            threads_used: AtomicUsize::new(0),
            chain_threads: AtomicUsize::new(0),
            handles: Mutex::new(Vec::new()),
            commands: RwLock::default(),
            jobs_tx,
            jobs_rx,
            exit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes the calling thread the main thread that ticks main chains and owns the barrier.
    pub fn bind_main_thread(&self) { self.barrier.bind_owner() }

    /// Maximum number of threads this scheduler may spawn.
    pub fn thread_budget(&self) -> usize { self.budget }

    /// Number of threads currently spawned.
    pub fn threads_in_use(&self) -> usize { self.threads_used.load(Ordering::Acquire) }

    /// Number of generic worker threads.
    pub fn worker_count(&self) -> usize { self.commands.read().len() }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool { self.exit.load(Ordering::Acquire) }

    fn ensure_running(&self) -> Result<()> {
        match self.is_shut_down() {
            true => Err(Error::ShutDown),
            false => Ok(()),
        }
    }

    fn spawn_thread(&self, name: String, body: impl FnOnce() + Send + 'static) -> Result<ThreadId> {
        self.threads_used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.budget).then_some(used + 1)
            })
            .map_err(|_| Error::ThreadPoolExhausted(self.budget))?;

        match thread::Builder::new().name(name).spawn(body) {
            Ok(handle) => {
                let id = handle.thread().id();
                self.handles.lock().push(handle);
                Ok(id)
            }
            Err(err) => {
                self.threads_used.fetch_sub(1, Ordering::AcqRel);
                Err(Error::Spawn(err.to_string()))
            }
        }
    }

    /// Creates a chain.
    ///
    /// A threaded chain fails with [`Error::ThreadPoolExhausted`]
    /// when every thread of the budget is in use;
    /// callers are expected to fall back to [`ChainMode::Main`].
    pub fn create_chain(&self, name: &str, mode: ChainMode) -> Result<ChainId> {
        self.ensure_running()?;

        let mut chains = self.chains.write();
        if chains.contains_key(name) {
            return Err(Error::DuplicateChain(name.to_string()));
        }

        let chain = Arc::new(ProcessChain::new(name, self.low_power));
        if mode == ChainMode::Threaded {
            let thread = tracer::Thread::Chain(self.chain_threads.fetch_add(1, Ordering::Relaxed));
            let chain = Arc::clone(&chain);
            let tracer = Arc::clone(&self.tracer);
            self.spawn_thread(format!("kinetic chain {name}"), move || {
                tracer.start_thread(thread, chain.name());
                chain.run(&*tracer, thread);
                tracer.end_thread(thread, chain.name());
            })?;
        }

        log::debug!("Created {mode:?} chain {name:?}");
        let id = chain.id();
        chains.insert(name.to_string(), ChainEntry { chain, mode });
        Ok(id)
    }

    /// Returns a chain by name.
    pub fn chain(&self, name: &str) -> Result<Arc<ProcessChain>> {
        let chains = self.chains.read();
        let entry = chains.get(name).ok_or_else(|| Error::UnknownChain(name.to_string()))?;
        Ok(Arc::clone(&entry.chain))
    }

    /// Returns the mode of a chain.
    pub fn chain_mode(&self, name: &str) -> Result<ChainMode> {
        let chains = self.chains.read();
        let entry = chains.get(name).ok_or_else(|| Error::UnknownChain(name.to_string()))?;
        Ok(entry.mode)
    }

    /// Hooks a process into an existing chain.
    ///
    /// Chains are never created implicitly.
    pub fn hook(&self, chain: &str, process: Arc<Process>) -> Result<()> {
        self.ensure_running()?;
        self.chain(chain)?.hook(process)
    }

    /// Unhooks a process from a chain.
    pub fn unhook(&self, chain: &str, process: ProcessId) -> Result<Arc<Process>> {
        self.chain(chain)?.unhook(process)
    }

    /// Ticks every main chain in creation order, then advances the rank barrier.
    ///
    /// Must be called on the main thread.
    /// Returns the number of processes whose callback ran.
    pub fn tick_main(&self) -> usize {
        let chains: Vec<_> = self
            .chains
            .read()
            .values()
            .filter(|entry| entry.mode == ChainMode::Main)
            .map(|entry| Arc::clone(&entry.chain))
            .collect();

        let ran = chains.iter().map(|chain| chain.tick(&*self.tracer, tracer::Thread::Main)).sum();

        self.barrier.sync();
        self.tracer.advance_rank(self.barrier.rank());
        ran
    }

    /// Blocks the calling thread until the main thread advances the rank barrier,
    /// or until the scheduler shuts down.
    ///
    /// Must not be called on the main thread.
    pub fn wait_for_sync(&self) { self.barrier.sync() }

    /// The current rank of the barrier.
    pub fn rank(&self) -> usize { self.barrier.rank() }

    /// Starts a generic worker thread and returns its id.
    pub fn spawn_worker(&self) -> Result<ThreadId> {
        self.ensure_running()?;

        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let mut commands = self.commands.write();
        let context = worker::Context {
            thread:   tracer::Thread::Worker(commands.len()),
            commands: commands_rx,
            jobs:     self.jobs_rx.clone(),
            exit:     Arc::clone(&self.exit),
            tracer:   Arc::clone(&self.tracer),
        };
        let name = format!("kinetic worker #{}", commands.len());
        let id = self.spawn_thread(name, move || worker::run(context))?;

        commands.insert(id, commands_tx);
        Ok(id)
    }

    /// Sends a command to the private queue of a worker thread.
    ///
    /// Commands still queued at shutdown are dropped without running.
    pub fn submit(&self, thread: ThreadId, command: impl FnOnce() + Send + 'static) -> Result<()> {
        self.ensure_running()?;

        let commands = self.commands.read();
        let sender = commands.get(&thread).ok_or(Error::UnknownThread(thread))?;
        sender.send(Box::new(command)).map_err(|_| Error::ShutDown)
    }

    /// Hands a job pool to the worker threads.
    ///
    /// Without workers, nobody drains the pool until a thread waits on it
    /// with [`Normal`](crate::WaitPriority::Normal) or
    /// [`RealTime`](crate::WaitPriority::RealTime) priority.
    pub fn dispatch(&self, pool: JobPool) -> Result<Arc<JobPool>> {
        let pool = Arc::new(pool);
        self.dispatch_shared(&pool)?;
        Ok(pool)
    }

    fn dispatch_shared(&self, pool: &Arc<JobPool>) -> Result<()> {
        self.ensure_running()?;

        let workers = self.worker_count().min(pool.len());
        self.tracer.dispatch_jobs(pool.len(), workers);
        for _ in 0..workers {
            self.jobs_tx.send(Arc::clone(pool)).map_err(|_| Error::ShutDown)?;
        }
        Ok(())
    }

    /// Runs a computation on a worker thread.
    pub fn spawn_async<T: Send + 'static>(
        &self,
        task: impl FnOnce() -> T + Send + 'static,
    ) -> Result<AsyncOperation<T>> {
        let operation = AsyncOperation::new(task);
        self.dispatch_shared(operation.pool())?;
        Ok(operation)
    }

    /// Stops every chain, releases the barrier and joins all threads.
    ///
    /// Calling this more than once has no effect.
    pub fn shutdown(&self) {
        if self.exit.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("Shutting down scheduler");

        for entry in self.chains.read().values() {
            entry.chain.request_exit();
        }
        self.barrier.force_release();
        self.commands.write().clear();

        let handles = mem::take(&mut *self.handles.lock());
        for handle in handles {
            // the last reference may be dropped on one of our own threads
            if handle.thread().id() == thread::current().id() {
                continue;
            }
            let name = handle.thread().name().unwrap_or("<unnamed>").to_string();
            if handle.join().is_err() {
                log::error!("Thread {name:?} panicked");
            }
        }
        self.threads_used.store(0, Ordering::Release);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) { self.shutdown(); }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let chains: Vec<_> = self.chains.read().keys().cloned().collect();
        f.debug_struct("Scheduler")
            .field("budget", &self.budget)
            .field("threads_used", &self.threads_in_use())
            .field("chains", &chains)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
