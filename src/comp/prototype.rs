use std::any::{self, TypeId};
use std::fmt;

use crate::comp::Component;
use crate::storage::{AnyPool, Pool};
use crate::{Entity, Error};

/// A declarative description of an entity subtree.
///
/// Instantiating a prototype clones every component value into the new entities
/// and recursively instantiates child prototypes under the new entity.
#[derive(Default)]
pub struct Prototype {
    pub(crate) comps:    Vec<Box<dyn AnyComp>>,
    pub(crate) children: Vec<Prototype>,
}

impl Prototype {
    /// Creates an empty prototype.
    pub fn new() -> Self { Self::default() }

    /// Adds a component value to the prototype.
    ///
    /// # Panics
    /// Panics if the prototype already has a component of type `T`.
    pub fn with<T: Component + Clone>(mut self, comp: T) -> Self {
        if self.comps.iter().any(|existing| (**existing).comp_type_id() == TypeId::of::<T>()) {
            panic!(
                "Cannot insert the same component type {} into the same prototype twice",
                any::type_name::<T>()
            );
        }
        self.comps.push(Box::new(comp));
        self
    }

    /// Adds a child prototype, instantiated as a child of this prototype's entity.
    pub fn child(mut self, child: Prototype) -> Self {
        self.children.push(child);
        self
    }

    /// Number of entities instantiating this prototype creates.
    pub fn entity_count(&self) -> usize {
        1 + self.children.iter().map(Prototype::entity_count).sum::<usize>()
    }
}

impl fmt::Debug for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let comps: Vec<_> = self.comps.iter().map(|comp| (**comp).comp_type_name()).collect();
        f.debug_struct("Prototype")
            .field("comps", &comps)
            .field("children", &self.children)
            .finish()
    }
}

/// A type-erased component value stored in a prototype.
pub(crate) trait AnyComp: Send + Sync {
    fn comp_type_id(&self) -> TypeId;

    fn comp_type_name(&self) -> &'static str;

    /// Inserts a clone of the value into `pool`, which must be the pool of the same type.
    fn insert_clone(&self, pool: &mut dyn AnyPool, entity: Entity) -> Result<(), Error>;
}

impl<T: Component + Clone> AnyComp for T {
    fn comp_type_id(&self) -> TypeId { TypeId::of::<T>() }

    fn comp_type_name(&self) -> &'static str { any::type_name::<T>() }

    fn insert_clone(&self, pool: &mut dyn AnyPool, entity: Entity) -> Result<(), Error> {
        let pool = pool.as_any_mut().downcast_mut::<Pool<T>>().expect("TypeId mismatch");
        pool.insert(entity, self.clone())?;
        Ok(())
    }
}
