//! The context owns every table of the runtime for its whole lifetime.

use std::sync::Arc;

use crate::query::{self, Query};
use crate::registry::{self, Registry};
use crate::{Config, Scheduler, System};


/// Owns the registry and the scheduler.
///
/// Construct it once on the main thread and hand out the shared parts
/// to systems and queries.
#[derive(Debug)]
pub struct Context {
    config:    Config,
    registry:  Arc<Registry>,
    scheduler: Arc<Scheduler>,
}

impl Context {
    /// Builds the registry from `builder` and starts a scheduler bound to the calling thread.
    pub fn new(config: Config, builder: registry::Builder) -> Self {
        let registry = Arc::new(builder.build());
        let scheduler = Arc::new(Scheduler::new(&config));
        log::debug!("Context initialized with {config:?}");
        Self { config, registry, scheduler }
    }

    /// The configuration this context was created with.
    pub fn config(&self) -> &Config { &self.config }

    /// The shared registry.
    pub fn registry(&self) -> &Arc<Registry> { &self.registry }

    /// The shared scheduler.
    pub fn scheduler(&self) -> &Arc<Scheduler> { &self.scheduler }

    /// Creates a system registering processes with this scheduler.
    pub fn system(&self, name: impl Into<String>) -> System {
        System::new(name, Arc::clone(&self.scheduler))
    }

    /// Starts building a query over the registry.
    ///
    /// A query built without types matches every live entity.
    pub fn query(&self) -> query::Builder { Query::builder(Arc::clone(&self.registry)) }

    /// Stops the scheduler and joins its threads.
    ///
    /// The registry stays usable until the context is dropped.
    pub fn shutdown(&self) { self.scheduler.shutdown() }
}

impl Drop for Context {
    fn drop(&mut self) { self.shutdown(); }
}
