//! Errors reported by the registry and the scheduler.
//!
//! Most variants describe programmer errors,
//! such as using a destroyed entity or hooking into a chain that was never created.
//! They are returned instead of silently ignored
//! because continuing would desynchronize compositions from pools.

use std::thread::ThreadId;

use crate::process::ProcessId;
use crate::Entity;

/// The error type of this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The entity was never created or has been destroyed.
    #[error("{0:?} is not alive")]
    DeadEntity(Entity),
    /// The world entity cannot be destroyed or reparented.
    #[error("the world entity cannot be destroyed or reparented")]
    WorldEntity,
    /// The component type was not registered when the registry was built.
    #[error("component type {0} is not registered")]
    UnregisteredComponent(&'static str),
    /// The entity already has a component of this type.
    #[error("{entity:?} already has a {comp} component")]
    ComponentExists {
        /// The entity operated on.
        entity: Entity,
        /// The component type name.
        comp:   &'static str,
    },
    /// The entity does not have a component of this type.
    #[error("{entity:?} does not have a {comp} component")]
    MissingComponent {
        /// The entity operated on.
        entity: Entity,
        /// The component type name.
        comp:   &'static str,
    },
    /// Reparenting would make an entity its own ancestor.
    #[error("{parent:?} cannot become the parent of its ancestor {entity:?}")]
    HierarchyCycle {
        /// The entity being reparented.
        entity: Entity,
        /// The requested parent.
        parent: Entity,
    },
    /// No process chain has this name.
    #[error("no process chain is named {0:?}")]
    UnknownChain(String),
    /// A process chain with this name already exists.
    #[error("a process chain named {0:?} already exists")]
    DuplicateChain(String),
    /// The process is not hooked into the chain.
    #[error("{0:?} is not hooked into the chain")]
    UnknownProcess(ProcessId),
    /// The process is already hooked into the chain.
    #[error("{0:?} is already hooked into the chain")]
    DuplicateProcess(ProcessId),
    /// The thread is not a worker thread of the scheduler.
    #[error("{0:?} is not a scheduler worker thread")]
    UnknownThread(ThreadId),
    /// Every thread allowed by the configured budget is in use.
    #[error("all {0} scheduler threads are in use")]
    ThreadPoolExhausted(usize),
    /// The OS refused to spawn a thread.
    #[error("cannot spawn thread: {0}")]
    Spawn(String),
    /// The scheduler has already been shut down.
    #[error("the scheduler has been shut down")]
    ShutDown,
}

/// Shorthand for results with [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
