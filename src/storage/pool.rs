use std::any::{self, Any};
use std::{fmt, iter, slice};

use super::AnyPool;
use crate::comp::Component;
use crate::{Entity, Error};

/// A sparse set storing components of type `T`.
///
/// `sparse` maps an entity index to a slot in the dense arrays.
/// Sparse entries are never cleared, so they may be stale;
/// an entity is present iff `owners[sparse[entity]] == entity`.
/// Removal moves the last dense element into the freed slot,
/// so iteration order is not preserved across removals.
pub struct Pool<T> {
    sparse: Vec<u32>,
    owners: Vec<Entity>,
    dense:  Vec<T>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self { Self { sparse: Vec::new(), owners: Vec::new(), dense: Vec::new() } }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Pool")
            .field("type", &any::type_name::<T>())
            .field("owners", &self.owners)
            .finish()
    }
}

impl<T> Pool<T> {
    fn slot(&self, entity: Entity) -> Option<usize> {
        let slot = *self.sparse.get(entity.to_primitive())? as usize;
        match self.owners.get(slot) {
            Some(&owner) if owner == entity => Some(slot),
            _ => None,
        }
    }

    /// Whether the entity has a component in this pool.
    pub fn contains(&self, entity: Entity) -> bool { self.slot(entity).is_some() }

    /// Inserts the component of an entity.
    ///
    /// Fails with [`Error::ComponentExists`] if the entity already has one;
    /// the existing value is left untouched.
    pub(crate) fn insert(&mut self, entity: Entity, value: T) -> Result<&mut T, Error> {
        if self.contains(entity) {
            return Err(Error::ComponentExists { entity, comp: any::type_name::<T>() });
        }

        let slot = self.dense.len();
        let index = entity.to_primitive();
        if self.sparse.len() <= index {
            self.sparse.resize(index + 1, 0);
        }
        self.sparse[index] = slot.try_into().expect("too many components in one pool");
        self.owners.push(entity);
        self.dense.push(value);

        Ok(self.dense.last_mut().expect("just pushed"))
    }

    /// Gets the component of an entity.
    pub fn get(&self, entity: Entity) -> Option<&T> {
        let slot = self.slot(entity)?;
        Some(&self.dense[slot])
    }

    /// Gets the component of an entity mutably.
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        let slot = self.slot(entity)?;
        Some(&mut self.dense[slot])
    }

    /// Removes the component of an entity in O(1),
    /// moving the last component into its slot.
    pub(crate) fn remove(&mut self, entity: Entity) -> Option<T> {
        let slot = self.slot(entity)?;

        self.owners.swap_remove(slot);
        let value = self.dense.swap_remove(slot);

        if let Some(&moved) = self.owners.get(slot) {
            self.sparse[moved.to_primitive()] = slot.try_into().expect("slot was valid");
        }

        Some(value)
    }

    /// Number of components in the pool.
    pub fn len(&self) -> usize { self.dense.len() }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool { self.dense.is_empty() }

    /// The owners of all components, in dense order.
    pub fn entities(&self) -> &[Entity] { &self.owners }

    /// The components, in dense order.
    pub fn values(&self) -> &[T] { &self.dense }

    /// Iterates over `(owner, component)` pairs in dense order.
    pub fn iter(&self) -> iter::Zip<iter::Copied<slice::Iter<'_, Entity>>, slice::Iter<'_, T>> {
        self.owners.iter().copied().zip(self.dense.iter())
    }

    /// Iterates over `(owner, component)` pairs in dense order with mutable components.
    pub fn iter_mut(
        &mut self,
    ) -> iter::Zip<iter::Copied<slice::Iter<'_, Entity>>, slice::IterMut<'_, T>> {
        self.owners.iter().copied().zip(self.dense.iter_mut())
    }

    /// Checks that every owner resolves back to its own slot.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(self.owners.len(), self.dense.len());
        for (slot, &owner) in self.owners.iter().enumerate() {
            assert_eq!(
                self.sparse.get(owner.to_primitive()).map(|&slot| slot as usize),
                Some(slot),
                "sparse entry of {owner:?} does not point to its slot",
            );
        }
    }
}

impl<T: Component> AnyPool for Pool<T> {
    fn contains(&self, entity: Entity) -> bool { Pool::contains(self, entity) }

    fn erase(&mut self, entity: Entity) -> bool { self.remove(entity).is_some() }

    fn len(&self) -> usize { Pool::len(self) }

    fn entities(&self) -> &[Entity] { &self.owners }

    fn type_name(&self) -> &'static str { any::type_name::<T>() }

    fn as_any(&self) -> &dyn Any { self }

    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}
