//! A storage is the data structure where components of the same type for all entities are stored.
//!
//! Each component type has one [`Pool`], a sparse set keyed by entity id.
//! The registry holds pools behind the object-safe [`AnyPool`] trait
//! and recovers the concrete pool by downcasting with the type resolved at the call site.
//!
//! Pools are not internally synchronized.
//! The registry locks a pool together with the entity table and filter registry
//! whenever the composition of an entity changes.

use std::any::Any;

use crate::Entity;

mod pool;
pub use pool::Pool;


/// Type-erased operations on a component pool.
pub trait AnyPool: Send + Sync + 'static {
    /// Whether the entity has a component in this pool.
    fn contains(&self, entity: Entity) -> bool;

    /// Drops the component of the entity, returning whether it was present.
    fn erase(&mut self, entity: Entity) -> bool;

    /// Number of components in the pool.
    fn len(&self) -> usize;

    /// Whether the pool is empty.
    fn is_empty(&self) -> bool { self.len() == 0 }

    /// The owners of all components, in dense order.
    fn entities(&self) -> &[Entity];

    /// The name of the component type, for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Upcasts to [`Any`] for downcasting into the concrete pool.
    fn as_any(&self) -> &dyn Any;

    /// Upcasts to [`Any`] for downcasting into the concrete pool.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
