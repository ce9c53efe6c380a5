//! Exposes testing, profiling and tracing capabilities.

use std::time::Duration;

/// A handler that receives scheduling-related events.
///
/// Every method has an empty default implementation,
/// so implementations only override the events they are interested in.
pub trait Tracer: Send + Sync {
    /// A thread owned by the scheduler has started.
    fn start_thread(&self, _thread: Thread, _name: &str) {}

    /// A thread owned by the scheduler is about to exit.
    fn end_thread(&self, _thread: Thread, _name: &str) {}

    /// A chain starts ticking its processes.
    fn start_chain_tick(&self, _thread: Thread, _chain: &str) {}

    /// A chain has ticked its processes, `ran` of which invoked their callbacks.
    fn end_chain_tick(&self, _thread: Thread, _chain: &str, _ran: usize) {}

    /// A process invoked its callback with the time accumulated since its previous run.
    fn run_process(&self, _chain: &str, _process: &str, _elapsed: Duration) {}

    /// A job pool was handed to the worker threads.
    fn dispatch_jobs(&self, _jobs: usize, _workers: usize) {}

    /// The main thread advanced the rank barrier.
    fn advance_rank(&self, _rank: usize) {}
}

/// An empty tracer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl Tracer for Noop {}

/// A tracer that logs all events.
#[derive(Debug, Clone, Copy)]
pub struct Log(
    /// The log level to log events with.
    pub log::Level,
);

impl Tracer for Log {
    fn start_thread(&self, thread: Thread, name: &str) {
        log::log!(self.0, "{thread:?}: thread {name:?} started");
    }

    fn end_thread(&self, thread: Thread, name: &str) {
        log::log!(self.0, "{thread:?}: thread {name:?} exiting");
    }

    fn start_chain_tick(&self, thread: Thread, chain: &str) {
        log::log!(self.0, "{thread:?}: chain {chain:?} tick start");
    }

    fn end_chain_tick(&self, thread: Thread, chain: &str, ran: usize) {
        log::log!(self.0, "{thread:?}: chain {chain:?} tick end, {ran} processes ran");
    }

    fn run_process(&self, chain: &str, process: &str, elapsed: Duration) {
        log::log!(self.0, "chain {chain:?}: process {process:?} ran after {elapsed:?}");
    }

    fn dispatch_jobs(&self, jobs: usize, workers: usize) {
        log::log!(self.0, "dispatched {jobs} jobs to {workers} workers");
    }

    fn advance_rank(&self, rank: usize) { log::log!(self.0, "barrier advanced to rank {rank}"); }
}

/// Identifies the thread an event happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Thread {
    /// The thread calling [`Scheduler::tick_main`](crate::Scheduler::tick_main).
    Main,
    /// A thread running a threaded chain. The index is the order of creation.
    Chain(usize),
    /// A generic worker thread. The index is the order of creation.
    Worker(usize),
}
