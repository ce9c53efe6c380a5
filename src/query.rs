//! Handles to cached filters.
//!
//! A [`Query`] holds one reference to the filter of its required component types.
//! Handles with the same required set share one cache;
//! the cache is dropped together with the last handle.
//!
//! A [`Builder`] collects the required types first and registers the filter once,
//! so no intermediate filter is ever populated.

use std::fmt;
use std::sync::Arc;
use std::vec;

use crate::comp::{CompId, Component};
use crate::filter::{self, FilterId};
use crate::{Entity, Registry, Result};

#[cfg(test)]
mod tests;

/// A handle to the entities having a set of component types.
///
/// Iteration always yields a fresh snapshot of the cache,
/// so a query can be iterated again after the registry is mutated.
/// The enumeration order is unspecified and may change after any structural mutation.
pub struct Query {
    registry: Arc<Registry>,
    required: Vec<CompId>,
    filter:   FilterId,
}

impl Query {
    /// Creates a query without required types, which matches every live entity.
    pub fn new(registry: Arc<Registry>) -> Self { Self::register(registry, Vec::new()) }

    /// Starts collecting the required types of a query.
    pub fn builder(registry: Arc<Registry>) -> Builder {
        Builder { registry, required: Vec::new() }
    }

    fn register(registry: Arc<Registry>, required: Vec<CompId>) -> Self {
        let filter = registry.add_query(required.clone());
        Self { registry, required, filter }
    }

    /// Adds a required component type, consuming the query.
    ///
    /// The handle moves to the filter of the new type set.
    /// Prefer [`Builder`] when the types are known upfront.
    pub fn with<T: Component>(mut self) -> Result<Self> {
        self.add_component_type::<T>()?;
        Ok(self)
    }

    /// Adds a required component type in place.
    ///
    /// The handle moves to the filter of the new type set.
    pub fn add_component_type<T: Component>(&mut self) -> Result<()> {
        let comp = self.registry.comp_id::<T>()?;
        let required = filter::canonicalize(self.required.iter().copied().chain([comp]));
        self.migrate(required);
        Ok(())
    }

    /// Removes a required component type in place.
    ///
    /// Removing a type that is not required has no effect.
    pub fn remove_component_type<T: Component>(&mut self) -> Result<()> {
        let comp = self.registry.comp_id::<T>()?;
        let required = self.required.iter().copied().filter(|&other| other != comp).collect();
        self.migrate(required);
        Ok(())
    }

    fn migrate(&mut self, required: Vec<CompId>) {
        if required == self.required {
            return;
        }

        let filter = self.registry.add_query(required.clone());
        self.registry.remove_filter_reference(self.filter);
        self.filter = filter;
        self.required = required;
    }

    /// Iterates over a snapshot of the matching entities.
    pub fn iter(&self) -> vec::IntoIter<Entity> { self.entities().into_iter() }

    /// Returns a snapshot of the matching entities.
    pub fn entities(&self) -> Vec<Entity> { self.registry.filter_entities(self.filter) }

    /// Number of matching entities.
    pub fn len(&self) -> usize { self.registry.filter_len(self.filter) }

    /// Whether no entity matches.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Whether an entity currently matches.
    pub fn contains(&self, entity: Entity) -> bool {
        self.registry.filter_contains(self.filter, entity)
    }

    /// The registry this query reads from.
    pub fn registry(&self) -> &Arc<Registry> { &self.registry }

    /// Number of handles sharing the filter of this query.
    pub fn shared_count(&self) -> usize { self.registry.filter_refcount(self.filter) }
}

/// Collects required component types without registering anything.
#[must_use = "nothing is registered until `build` is called"]
pub struct Builder {
    registry: Arc<Registry>,
    required: Vec<CompId>,
}

impl Builder {
    /// Adds a required component type.
    pub fn with<T: Component>(mut self) -> Result<Self> {
        self.required.push(self.registry.comp_id::<T>()?);
        Ok(self)
    }

    /// Registers the filter of the collected types and returns its handle.
    pub fn build(self) -> Query {
        let required = filter::canonicalize(self.required);
        Query::register(self.registry, required)
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Builder").field("required", &self.required).finish_non_exhaustive()
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Query")
            .field("required", &self.required)
            .field("filter", &self.filter)
            .finish()
    }
}

impl Clone for Query {
    fn clone(&self) -> Self {
        self.registry.add_filter_reference(self.filter);
        Self {
            registry: Arc::clone(&self.registry),
            required: self.required.clone(),
            filter:   self.filter,
        }
    }
}

impl Drop for Query {
    fn drop(&mut self) { self.registry.remove_filter_reference(self.filter); }
}

impl<'t> IntoIterator for &'t Query {
    type Item = Entity;
    type IntoIter = vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter { self.iter() }
}
