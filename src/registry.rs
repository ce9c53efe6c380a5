//! The registry owns every entity, component pool and filter.
//!
//! It is the only sanctioned way to change the composition of an entity.
//! Each structural mutation holds the entity table, the affected pools and the filter registry
//! write-locked at the same time, so observers never see a pool entry
//! that disagrees with the composition of its owner, or a filter cache that lags behind either.

use std::any;
use std::fmt;

use crate::comp::{AnyComp, CompId, Component, Prototype, Types};
use crate::entity::table::Table;
use crate::entity::AllocHint;
use crate::filter::{FilterId, Filters};
use crate::storage::{AnyPool, Pool};
use crate::sync::{self, Read, ReadGuard, RwLock, Write, WriteGuard};
use crate::{Entity, Error, Result};

mod builder;
pub use builder::Builder;

#[cfg(test)]
mod tests;

/// Shared access to a component, released on drop.
pub type ComponentRef<'t, T> = ReadGuard<'t, T>;

/// Exclusive access to a component, released on drop.
pub type ComponentMut<'t, T> = WriteGuard<'t, T>;

type PoolLock = RwLock<Box<dyn AnyPool>>;

/// What happens to the children of a destroyed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurse {
    /// Children are destroyed together with their parent, recursively.
    Yes,
    /// Children are reparented to the world.
    No,
}

/// Stores the entities and components of a world.
///
/// Component guards returned by the registry keep the pool of that component type locked.
/// Mutating the composition of any entity for the same component type
/// on the thread holding such a guard is a programmer error.
///
/// # Panics
/// With the default spinning locks, such a mutation panics.
/// With `blocking-sync`, it never completes.
pub struct Registry {
    types:    Types,
    entities: RwLock<Table>,
    pools:    Box<[PoolLock]>,
    filters:  RwLock<Filters>,
}

fn downcast_ref<T: Component>(pool: &dyn AnyPool) -> &Pool<T> {
    pool.as_any().downcast_ref::<Pool<T>>().expect("TypeId mismatch")
}

fn downcast_mut<T: Component>(pool: &mut dyn AnyPool) -> &mut Pool<T> {
    pool.as_any_mut().downcast_mut::<Pool<T>>().expect("TypeId mismatch")
}

impl Registry {
    /// Starts building a registry.
    pub fn builder() -> Builder { Builder::default() }

    pub(crate) fn from_parts(types: Types, pools: Vec<Box<dyn AnyPool>>) -> Self {
        let mut table = Table::default();
        let world = table.spawn(None, AllocHint::default());
        assert_eq!(world, Entity::WORLD, "the first allocated entity must be the world");

        let mut filters = Filters::new(types.len());
        filters.mark_entity_spawn(world);

        Self {
            types,
            entities: RwLock::new(table),
            pools: pools.into_iter().map(RwLock::new).collect(),
            filters: RwLock::new(filters),
        }
    }

    pub(crate) fn comp_id<T: Component>(&self) -> Result<CompId> { self.types.id_of::<T>() }

    fn pool_lock<T: Component>(&self) -> Result<(CompId, &PoolLock)> {
        let id = self.comp_id::<T>()?;
        Ok((id, &self.pools[id.index()]))
    }

    /// Creates an entity under the world.
    pub fn create_entity(&self) -> Result<Entity> { self.create_child(Entity::WORLD) }

    /// Creates an entity with an empty composition under `parent`.
    ///
    /// Recycled ids close to the parent are preferred.
    pub fn create_child(&self, parent: Entity) -> Result<Entity> {
        let (mut entities, mut filters) =
            sync::acquire_all((Write(&self.entities), Write(&self.filters)));

        entities.get(parent)?;
        let entity = entities.spawn(Some(parent), AllocHint { near: Some(parent) });
        entities.get_mut(parent)?.children.insert(entity);
        filters.mark_entity_spawn(entity);

        log::trace!("Created {entity:?} under {parent:?}");
        Ok(entity)
    }

    /// Creates the entity subtree described by `prototype` under `parent`.
    ///
    /// Each created entity is announced to the filters once, with its full composition.
    /// Returns the root of the new subtree.
    pub fn instantiate(&self, parent: Entity, prototype: &Prototype) -> Result<Entity> {
        self.validate_prototype(prototype)?;

        let (mut entities, mut pools, mut filters) = sync::acquire_all((
            Write(&self.entities),
            self.pools.iter().map(Write).collect::<Vec<_>>(),
            Write(&self.filters),
        ));

        entities.get(parent)?;

        let mut created = Vec::with_capacity(prototype.entity_count());
        let root =
            self.spawn_prototype(&mut entities, &mut pools, parent, prototype, &mut created)?;

        for &entity in &created {
            filters.mark_entity_creation(entity, entities.get(entity)?);
        }

        log::trace!("Instantiated {} entities under {parent:?}", created.len());
        Ok(root)
    }

    fn validate_prototype(&self, prototype: &Prototype) -> Result<()> {
        for comp in &prototype.comps {
            let comp = &**comp;
            self.types.id_of_dyn(comp.comp_type_id(), comp.comp_type_name())?;
        }
        prototype.children.iter().try_for_each(|child| self.validate_prototype(child))
    }

    fn spawn_prototype(
        &self,
        entities: &mut Table,
        pools: &mut [WriteGuard<'_, Box<dyn AnyPool>>],
        parent: Entity,
        prototype: &Prototype,
        created: &mut Vec<Entity>,
    ) -> Result<Entity> {
        let entity = entities.spawn(Some(parent), AllocHint { near: Some(parent) });
        entities.get_mut(parent)?.children.insert(entity);
        created.push(entity);

        for comp in &prototype.comps {
            let comp = &**comp;
            let id = self.types.id_of_dyn(comp.comp_type_id(), comp.comp_type_name())?;
            comp.insert_clone(&mut **pools[id.index()], entity)?;
            entities.get_mut(entity)?.set(id, true);
        }

        for child in &prototype.children {
            self.spawn_prototype(entities, pools, entity, child, created)?;
        }

        Ok(entity)
    }

    /// Destroys an entity and all of its components.
    ///
    /// The entity leaves every filter before its data is torn down.
    /// Returns the number of destroyed entities.
    pub fn destroy_entity(&self, entity: Entity, recurse: Recurse) -> Result<usize> {
        if entity.is_world() {
            return Err(Error::WorldEntity);
        }

        let (mut entities, mut pools, mut filters) = sync::acquire_all((
            Write(&self.entities),
            self.pools.iter().map(Write).collect::<Vec<_>>(),
            Write(&self.filters),
        ));

        if let Some(parent) = entities.get(entity)?.parent {
            entities.get_mut(parent)?.children.shift_remove(&entity);
        }

        let mut stack = vec![entity];
        let mut destroyed = 0;
        while let Some(entity) = stack.pop() {
            filters.mark_entity_destruction(entity);

            let record = entities.get_mut(entity)?;
            let children: Vec<Entity> = record.children.drain(..).collect();
            let comps: Vec<CompId> = record.comps().collect();

            for comp in comps {
                let erased = pools[comp.index()].erase(entity);
                debug_assert!(erased, "composition of {entity:?} lists a missing component");
                record.set(comp, false);
            }

            match recurse {
                Recurse::Yes => stack.extend(children),
                Recurse::No => {
                    for &child in &children {
                        entities.get_mut(child)?.parent = Some(Entity::WORLD);
                    }
                    entities.get_mut(Entity::WORLD)?.children.extend(children);
                }
            }

            entities.despawn(entity);
            destroyed += 1;
        }

        log::trace!("Destroyed {destroyed} entities starting from {entity:?}");
        Ok(destroyed)
    }

    /// Moves `entity` under `parent`.
    pub fn set_parent(&self, entity: Entity, parent: Entity) -> Result<()> {
        if entity.is_world() {
            return Err(Error::WorldEntity);
        }

        let mut entities = self.entities.write();
        let old_parent = entities.get(entity)?.parent;
        entities.get(parent)?;

        let mut ancestor = Some(parent);
        while let Some(current) = ancestor {
            if current == entity {
                return Err(Error::HierarchyCycle { entity, parent });
            }
            ancestor = entities.get(current)?.parent;
        }

        if let Some(old_parent) = old_parent {
            entities.get_mut(old_parent)?.children.shift_remove(&entity);
        }
        entities.get_mut(parent)?.children.insert(entity);
        entities.get_mut(entity)?.parent = Some(parent);
        Ok(())
    }

    /// Returns the parent of an entity, which is `None` only for the world.
    pub fn parent(&self, entity: Entity) -> Result<Option<Entity>> {
        Ok(self.entities.read().get(entity)?.parent)
    }

    /// Returns the children of an entity in insertion order.
    pub fn children(&self, entity: Entity) -> Result<Vec<Entity>> {
        Ok(self.entities.read().get(entity)?.children.iter().copied().collect())
    }

    /// Marks an entity as active or inactive.
    ///
    /// The flag is informational and does not affect filters or children.
    pub fn set_active(&self, entity: Entity, active: bool) -> Result<()> {
        self.entities.write().get_mut(entity)?.active = active;
        Ok(())
    }

    /// Whether an entity is marked as active.
    pub fn is_active(&self, entity: Entity) -> Result<bool> {
        Ok(self.entities.read().get(entity)?.active)
    }

    /// Whether an entity is alive.
    pub fn is_alive(&self, entity: Entity) -> bool { self.entities.read().is_alive(entity) }

    /// Number of live entities, including the world.
    pub fn entity_count(&self) -> usize { self.entities.read().len() }

    /// Attaches a default-constructed component and returns exclusive access to it.
    pub fn create_component<T: Component + Default>(
        &self,
        entity: Entity,
    ) -> Result<ComponentMut<'_, T>> {
        let pool = self.attach(entity, T::default())?;
        Ok(WriteGuard::map(pool, |pool| {
            downcast_mut::<T>(&mut **pool).get_mut(entity).expect("component was just inserted")
        }))
    }

    /// Attaches a component value.
    pub fn insert_component<T: Component>(&self, entity: Entity, value: T) -> Result<()> {
        self.attach(entity, value).map(drop)
    }

    /// Inserts a component and returns the still locked pool.
    fn attach<T: Component>(
        &self,
        entity: Entity,
        value: T,
    ) -> Result<WriteGuard<'_, Box<dyn AnyPool>>> {
        let (id, lock) = self.pool_lock::<T>()?;
        let (mut entities, mut pool, mut filters) =
            sync::acquire_all((Write(&self.entities), Write(lock), Write(&self.filters)));

        let record = entities.get_mut(entity)?;
        downcast_mut::<T>(&mut **pool).insert(entity, value)?;
        record.set(id, true);
        filters.mark_component_add(id, entity, record);

        log::trace!("Attached {} to {entity:?}", any::type_name::<T>());
        Ok(pool)
    }

    /// Detaches a component and returns its value.
    pub fn destroy_component<T: Component>(&self, entity: Entity) -> Result<T> {
        let (id, lock) = self.pool_lock::<T>()?;
        let (mut entities, mut pool, mut filters) =
            sync::acquire_all((Write(&self.entities), Write(lock), Write(&self.filters)));

        let record = entities.get_mut(entity)?;
        let value = downcast_mut::<T>(&mut **pool)
            .remove(entity)
            .ok_or(Error::MissingComponent { entity, comp: any::type_name::<T>() })?;
        record.set(id, false);
        filters.mark_component_erase(id, entity, record);

        log::trace!("Detached {} from {entity:?}", any::type_name::<T>());
        Ok(value)
    }

    /// Returns shared access to a component.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<ComponentRef<'_, T>> {
        let (_, lock) = self.pool_lock::<T>()?;
        let (entities, pool) = sync::acquire_all((Read(&self.entities), Read(lock)));
        entities.get(entity)?;
        drop(entities);

        ReadGuard::try_map(pool, |pool| downcast_ref::<T>(&**pool).get(entity))
            .map_err(|_| Error::MissingComponent { entity, comp: any::type_name::<T>() })
    }

    /// Returns exclusive access to a component.
    pub fn get_component_mut<T: Component>(&self, entity: Entity) -> Result<ComponentMut<'_, T>> {
        let (_, lock) = self.pool_lock::<T>()?;
        let (entities, pool) = sync::acquire_all((Read(&self.entities), Write(lock)));
        entities.get(entity)?;
        drop(entities);

        WriteGuard::try_map(pool, |pool| downcast_mut::<T>(&mut **pool).get_mut(entity))
            .map_err(|_| Error::MissingComponent { entity, comp: any::type_name::<T>() })
    }

    /// Whether an entity has a component of type `T`.
    pub fn has_component<T: Component>(&self, entity: Entity) -> Result<bool> {
        let id = self.comp_id::<T>()?;
        Ok(self.entities.read().get(entity)?.has(id))
    }

    /// Returns the type names of the components of an entity, in registration order.
    pub fn composition(&self, entity: Entity) -> Result<Vec<&'static str>> {
        let entities = self.entities.read();
        Ok(entities.get(entity)?.comps().map(|comp| self.types.name(comp)).collect())
    }

    /// Returns shared access to the whole pool of `T`.
    pub fn pool<T: Component>(&self) -> Result<ReadGuard<'_, Pool<T>>> {
        let (_, lock) = self.pool_lock::<T>()?;
        Ok(ReadGuard::map(lock.read(), |pool| downcast_ref::<T>(&**pool)))
    }

    /// Returns exclusive access to the whole pool of `T`.
    ///
    /// Component values may be changed through the guard, but not added or removed.
    pub fn pool_mut<T: Component>(&self) -> Result<WriteGuard<'_, Pool<T>>> {
        let (_, lock) = self.pool_lock::<T>()?;
        Ok(WriteGuard::map(lock.write(), |pool| downcast_mut::<T>(&mut **pool)))
    }

    /// Number of live filters.
    pub fn filter_count(&self) -> usize { self.filters.read().len() }

    /// Returns a filter for `required` with one more reference.
    ///
    /// `required` must be canonical.
    pub(crate) fn add_query(&self, required: Vec<CompId>) -> FilterId {
        let (entities, mut filters) =
            sync::acquire_all((Read(&self.entities), Write(&self.filters)));
        filters.add_query(required, &entities)
    }

    pub(crate) fn add_filter_reference(&self, id: FilterId) {
        self.filters.write().add_reference(id);
    }

    pub(crate) fn remove_filter_reference(&self, id: FilterId) -> bool {
        self.filters.write().remove_reference(id)
    }

    /// Copies the cached entities of a filter.
    pub(crate) fn filter_entities(&self, id: FilterId) -> Vec<Entity> {
        self.filters.read().entities(id).iter().copied().collect()
    }

    pub(crate) fn filter_len(&self, id: FilterId) -> usize {
        self.filters.read().entities(id).len()
    }

    pub(crate) fn filter_contains(&self, id: FilterId, entity: Entity) -> bool {
        self.filters.read().entities(id).contains(&entity)
    }

    pub(crate) fn filter_refcount(&self, id: FilterId) -> usize {
        self.filters.read().refcount(id)
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let entities = self.entities.read();
        for (index, pool) in self.pools.iter().enumerate() {
            let pool = pool.read();
            for &owner in pool.entities() {
                let record = entities.get(owner).expect("pool entry owned by a dead entity");
                assert!(
                    record.has(CompId(index)),
                    "{owner:?} has an unlisted {}",
                    pool.type_name()
                );
            }
            for entity in entities.iter_alive() {
                let record = entities.get(entity).expect("iter_alive yields live entities");
                assert_eq!(record.has(CompId(index)), pool.contains(entity));
            }
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let types: Vec<_> = (0..self.types.len()).map(|i| self.types.name(CompId(i))).collect();
        f.debug_struct("Registry")
            .field("types", &types)
            .field("entities", &self.entity_count())
            .field("filters", &self.filter_count())
            .finish()
    }
}
