//! Per-entity bookkeeping: liveness, activity, hierarchy links and composition.

use bitvec::prelude::BitVec;
use indexmap::IndexSet;

use super::ealloc::{AllocHint, Ealloc};
use super::Entity;
use crate::comp::CompId;
use crate::Error;

/// The bookkeeping of a live entity.
#[derive(Debug, Default)]
pub(crate) struct Record {
    pub(crate) active:      bool,
    pub(crate) parent:      Option<Entity>,
    pub(crate) children:    IndexSet<Entity>,
    /// Bit `i` is set iff the entity has a live entry in the pool of component `i`.
    pub(crate) composition: BitVec,
}

impl Record {
    pub(crate) fn has(&self, comp: CompId) -> bool {
        self.composition.get(comp.0).map_or(false, |bit| *bit)
    }

    pub(crate) fn set(&mut self, comp: CompId, present: bool) {
        if self.composition.len() <= comp.0 {
            self.composition.resize(comp.0 + 1, false);
        }
        self.composition.set(comp.0, present);
    }

    /// Iterates over the component types the entity currently has.
    pub(crate) fn comps(&self) -> impl Iterator<Item = CompId> + '_ {
        self.composition.iter_ones().map(CompId)
    }
}

/// Stores the records of all entities, indexed by id.
#[derive(Debug, Default)]
pub(crate) struct Table {
    ealloc:  Ealloc,
    alive:   BitVec,
    records: Vec<Record>,
}

impl Table {
    /// Whether `entity` is currently alive.
    pub(crate) fn is_alive(&self, entity: Entity) -> bool {
        self.alive.get(entity.to_primitive()).map_or(false, |bit| *bit)
    }

    pub(crate) fn get(&self, entity: Entity) -> Result<&Record, Error> {
        if !self.is_alive(entity) {
            return Err(Error::DeadEntity(entity));
        }
        Ok(&self.records[entity.to_primitive()])
    }

    pub(crate) fn get_mut(&mut self, entity: Entity) -> Result<&mut Record, Error> {
        if !self.is_alive(entity) {
            return Err(Error::DeadEntity(entity));
        }
        Ok(&mut self.records[entity.to_primitive()])
    }

    /// Allocates an id and initializes an active record with an empty composition.
    ///
    /// The caller is responsible for linking the new entity into its parent.
    pub(crate) fn spawn(&mut self, parent: Option<Entity>, hint: AllocHint) -> Entity {
        let entity = self.ealloc.allocate(hint);
        let index = entity.to_primitive();

        if self.records.len() <= index {
            self.records.resize_with(index + 1, Record::default);
        }
        if self.alive.len() <= index {
            self.alive.resize(index + 1, false);
        }

        debug_assert!(!self.alive[index], "allocated {entity:?} is still alive");
        self.alive.set(index, true);
        self.records[index] = Record { active: true, parent, ..Record::default() };

        entity
    }

    /// Clears the record of `entity` and recycles its id.
    ///
    /// The record must already be unlinked from the hierarchy and have no components.
    pub(crate) fn despawn(&mut self, entity: Entity) -> Record {
        let index = entity.to_primitive();
        assert!(self.is_alive(entity), "{entity:?} is despawned twice");

        let record = std::mem::take(&mut self.records[index]);
        debug_assert!(record.composition.not_any(), "{entity:?} still has components");

        self.alive.set(index, false);
        self.ealloc.deallocate(entity);
        record
    }

    /// Iterates over all live entities in id order.
    pub(crate) fn iter_alive(&self) -> impl Iterator<Item = Entity> + '_ {
        self.alive.iter_ones().map(Entity::from_primitive)
    }

    /// Number of live entities, including the world.
    pub(crate) fn len(&self) -> usize { self.alive.count_ones() }
}
