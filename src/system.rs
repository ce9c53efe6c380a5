//! Systems own the processes they register with the scheduler.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;

use crate::process::{Process, ProcessId};
use crate::{Error, Result, Scheduler};

#[cfg(test)]
mod tests;

/// A named owner of processes.
///
/// Dropping a system unhooks every process it still owns.
pub struct System {
    name:      String,
    scheduler: Arc<Scheduler>,
    /// The chain each owned process is hooked to.
    processes: IndexMap<ProcessId, String>,
}

impl System {
    /// Creates a system that owns no processes yet.
    pub fn new(name: impl Into<String>, scheduler: Arc<Scheduler>) -> Self {
        Self { name: name.into(), scheduler, processes: IndexMap::new() }
    }

    /// The name of this system, which is the owner of all its processes.
    pub fn name(&self) -> &str { &self.name }

    /// The scheduler this system registers processes with.
    pub fn scheduler(&self) -> &Arc<Scheduler> { &self.scheduler }

    /// Registers a process on an existing chain.
    ///
    /// `callback` receives the time accumulated since its previous run,
    /// and runs on every tick when `interval` is zero.
    pub fn create_process(
        &mut self,
        chain: &str,
        name: &str,
        interval: Duration,
        callback: impl FnMut(Duration) + Send + 'static,
    ) -> Result<ProcessId> {
        let process = Arc::new(Process::new(name, self.name.as_str(), interval, callback));
        let id = process.id();
        if self.processes.contains_key(&id) {
            return Err(Error::DuplicateProcess(id));
        }
        self.scheduler.hook(chain, process)?;

        log::trace!("System {:?} hooked process {name:?} to chain {chain:?}", self.name);
        self.processes.insert(id, chain.to_string());
        Ok(id)
    }

    /// Unhooks and drops a process owned by this system.
    pub fn destroy_process(&mut self, id: ProcessId) -> Result<()> {
        let chain = self.processes.shift_remove(&id).ok_or(Error::UnknownProcess(id))?;
        self.scheduler.unhook(&chain, id)?;
        Ok(())
    }

    /// Iterates over the owned processes and the chains they are hooked to.
    pub fn processes(&self) -> impl Iterator<Item = (ProcessId, &str)> + '_ {
        self.processes.iter().map(|(&id, chain)| (id, chain.as_str()))
    }

    /// Blocks until the main thread advances the rank barrier.
    pub fn wait_for_sync(&self) { self.scheduler.wait_for_sync() }
}

impl Drop for System {
    fn drop(&mut self) {
        for (id, chain) in self.processes.drain(..) {
            if let Err(err) = self.scheduler.unhook(&chain, id) {
                log::debug!("System {:?} could not unhook {id:?}: {err}", self.name);
            }
        }
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("System")
            .field("name", &self.name)
            .field("processes", &self.processes)
            .finish_non_exhaustive()
    }
}
