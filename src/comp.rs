//! Components are plain values attached to entities.
//!
//! Every component type used with a [`Registry`](crate::Registry)
//! must be registered when the registry is built,
//! which assigns it a dense [`CompId`] used to index pools and composition masks.

use std::any::{self, TypeId};
use std::collections::HashMap;

use crate::Error;

mod prototype;
pub(crate) use prototype::AnyComp;
pub use prototype::Prototype;

/// A value that can be attached to entities.
///
/// This is implemented for all thread-safe owned types.
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

/// Identifies a registered component type within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompId(pub(crate) usize);

impl CompId {
    /// The dense index of the component type.
    pub fn index(self) -> usize { self.0 }
}

/// Maps Rust types to [`CompId`]s.
#[derive(Debug, Default)]
pub(crate) struct Types {
    ids:   HashMap<TypeId, CompId>,
    names: Vec<&'static str>,
}

impl Types {
    /// Registers `T`, returning the existing id if it was registered before.
    pub(crate) fn register<T: Component>(&mut self) -> (CompId, bool) {
        let next = CompId(self.names.len());
        let id = *self.ids.entry(TypeId::of::<T>()).or_insert(next);
        let new = id == next;
        if new {
            self.names.push(any::type_name::<T>());
        }
        (id, new)
    }

    pub(crate) fn id_of<T: Component>(&self) -> Result<CompId, Error> {
        self.id_of_dyn(TypeId::of::<T>(), any::type_name::<T>())
    }

    pub(crate) fn id_of_dyn(&self, ty: TypeId, name: &'static str) -> Result<CompId, Error> {
        self.ids.get(&ty).copied().ok_or(Error::UnregisteredComponent(name))
    }

    pub(crate) fn name(&self, id: CompId) -> &'static str {
        self.names.get(id.0).copied().expect("CompId from another registry")
    }

    pub(crate) fn len(&self) -> usize { self.names.len() }
}
