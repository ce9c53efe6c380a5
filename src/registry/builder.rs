use std::any;

use super::Registry;
use crate::comp::{Component, Types};
use crate::storage::{AnyPool, Pool};

/// This type is used to build a registry.
/// No more component types can be registered after the builder is built.
#[derive(Default)]
pub struct Builder {
    types: Types,
    pools: Vec<Box<dyn AnyPool>>,
}

impl Builder {
    /// Registers a component type.
    ///
    /// Registering the same type twice has no effect.
    pub fn register<T: Component>(mut self) -> Self {
        let (id, new) = self.types.register::<T>();
        if new {
            debug_assert_eq!(id.index(), self.pools.len());
            self.pools.push(Box::new(Pool::<T>::default()));
            log::trace!("Registered component {} as {id:?}", any::type_name::<T>());
        }
        self
    }

    /// Builds the registry, which starts with only the world entity.
    pub fn build(self) -> Registry { Registry::from_parts(self.types, self.pools) }
}
