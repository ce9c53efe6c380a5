//! A concurrent entity/component runtime with a cooperative scheduler.
//!
//! # Entities and components
//! An [`Entity`] is an opaque id owned by a [`Registry`].
//! Entities form a tree rooted at [`Entity::WORLD`],
//! which exists for as long as the registry does.
//! Components are plain values attached to entities;
//! every component type is registered when the registry is built
//! and stored in its own sparse-set [`Pool`](storage::Pool).
//!
//! # Queries
//! A [`Query`] names a set of component types
//! and yields the live entities having all of them.
//! Matching entities are cached per type set and updated on every composition change,
//! so iterating a query never scans the entity table.
//! Queries with the same type set share one cache.
//!
//! # Scheduling
//! A [`System`] owns [`Process`](process::Process)es,
//! periodic callbacks hooked to named [`ProcessChain`](chain::ProcessChain)s.
//! The [`Scheduler`] runs each chain either on a dedicated thread
//! or on the main thread through [`Scheduler::tick_main`],
//! which also advances a rank barrier that other threads can synchronize with.
//! Data-parallel work is split into a [`JobPool`]
//! that worker threads and waiting threads drain together.
//!
//! # Locking
//! All shared tables are guarded by the reader/writer locks in [`sync`].
//! Readers never block each other, and a thread holding a read lock
//! cannot upgrade it to a write lock on the same table.
//! Enable the `blocking-sync` feature to park contended threads
//! instead of spinning.
//!
//! ```
//! use std::sync::Arc;
//!
//! use kinetic::{Config, Context, Registry};
//!
//! struct Position(f32);
//!
//! let context = Context::new(Config::default(), Registry::builder().register::<Position>());
//! let registry = Arc::clone(context.registry());
//!
//! let entity = registry.create_entity().unwrap();
//! registry.insert_component(entity, Position(1.)).unwrap();
//!
//! let query = context.query().with::<Position>().unwrap().build();
//! assert_eq!(query.entities(), vec![entity]);
//! ```

#![cfg_attr(not(debug_assertions), deny(missing_docs))]
#![cfg_attr(doc, warn(missing_docs))]

pub mod sync;

pub mod tracer;

pub mod entity;
pub use entity::Entity;

pub mod comp;
pub use comp::{Component, Prototype};

pub mod storage;

mod filter;

pub mod registry;
pub use registry::Registry;

pub mod query;
pub use query::Query;

pub mod process;

pub mod chain;

pub mod job;
pub use job::{AsyncOperation, JobPool, WaitPriority};

pub mod scheduler;
pub use scheduler::Scheduler;

pub mod system;
pub use system::System;

mod config;
pub use config::Config;

mod context;
pub use context::Context;

mod error;
pub use error::{Error, Result};

#[cfg(test)]
mod test_util;

static_assertions::assert_impl_all!(Registry: Send, Sync);
static_assertions::assert_impl_all!(Query: Send, Sync);
static_assertions::assert_impl_all!(Scheduler: Send, Sync);
static_assertions::assert_impl_all!(JobPool: Send, Sync);
