//! The filter registry caches the entities matching each required component set.
//!
//! A filter is created with one full scan over live entities.
//! After that, the registry is notified of every composition change
//! and updates only the filters whose required set contains the changed type,
//! so cached lists never need another scan.
//!
//! Filters with the same required set are shared and reference-counted;
//! the last [`remove_reference`](Filters::remove_reference) tears the cache down.

use std::collections::HashMap;

use bitvec::prelude::BitVec;
use indexmap::IndexSet;
use itertools::Itertools;

use crate::comp::CompId;
use crate::entity::table::{Record, Table};
use crate::Entity;


/// Identifies a cached filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilterId(usize);

/// Sorts and deduplicates a set of component types.
pub(crate) fn canonicalize(types: impl IntoIterator<Item = CompId>) -> Vec<CompId> {
    types.into_iter().sorted().dedup().collect()
}

#[derive(Debug)]
struct Filter {
    required: Vec<CompId>,
    mask:     BitVec,
    refcount: usize,
    cache:    IndexSet<Entity>,
}

impl Filter {
    fn matches(&self, record: &Record) -> bool {
        self.mask.iter_ones().all(|comp| record.has(CompId(comp)))
    }

    /// Inserts or removes `entity` according to its full current composition.
    fn refresh(&mut self, entity: Entity, record: &Record) {
        if self.matches(record) {
            self.cache.insert(entity);
        } else {
            self.cache.swap_remove(&entity);
        }
    }
}

/// Stores all filters of a registry.
#[derive(Debug, Default)]
pub(crate) struct Filters {
    slots:      Vec<Option<Filter>>,
    free_slots: Vec<usize>,
    by_types:   HashMap<Vec<CompId>, FilterId>,
    /// `by_comp[c]` lists the filters whose required set contains `c`.
    by_comp:    Vec<Vec<FilterId>>,
    /// Filters with an empty required set, which match every live entity.
    unfiltered: Vec<FilterId>,
}

impl Filters {
    pub(crate) fn new(comp_count: usize) -> Self {
        Self { by_comp: vec![Vec::new(); comp_count], ..Self::default() }
    }

    fn filter(&self, id: FilterId) -> &Filter {
        self.slots.get(id.0).and_then(Option::as_ref).expect("FilterId refers to a dropped filter")
    }

    fn filter_mut(&mut self, id: FilterId) -> &mut Filter {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .expect("FilterId refers to a dropped filter")
    }

    /// Returns the existing filter with exactly this required set.
    ///
    /// `required` must be canonical.
    pub(crate) fn query_id(&self, required: &[CompId]) -> Option<FilterId> {
        self.by_types.get(required).copied()
    }

    /// Returns a filter for `required` with one more reference,
    /// creating it with a full scan over `entities` if it does not exist yet.
    ///
    /// `required` must be canonical.
    pub(crate) fn add_query(&mut self, required: Vec<CompId>, entities: &Table) -> FilterId {
        if let Some(id) = self.query_id(&required) {
            self.add_reference(id);
            return id;
        }

        let mut mask = BitVec::new();
        for &comp in &required {
            if mask.len() <= comp.0 {
                mask.resize(comp.0 + 1, false);
            }
            mask.set(comp.0, true);
        }

        let mut filter = Filter { required, mask, refcount: 1, cache: IndexSet::new() };
        for entity in entities.iter_alive() {
            let record = entities.get(entity).expect("iter_alive yields live entities");
            if filter.matches(record) {
                filter.cache.insert(entity);
            }
        }

        let index = match self.free_slots.pop() {
            Some(index) => index,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        let id = FilterId(index);

        log::trace!(
            "Created {id:?} for {:?} with {} entities",
            filter.required,
            filter.cache.len()
        );

        match filter.required.is_empty() {
            true => self.unfiltered.push(id),
            false => {
                for &comp in &filter.required {
                    self.by_comp[comp.0].push(id);
                }
            }
        }
        self.by_types.insert(filter.required.clone(), id);
        self.slots[index] = Some(filter);

        id
    }

    /// Adds a reference to an existing filter.
    pub(crate) fn add_reference(&mut self, id: FilterId) { self.filter_mut(id).refcount += 1; }

    /// Removes a reference from a filter, dropping it when no references remain.
    ///
    /// Returns whether the filter was dropped.
    pub(crate) fn remove_reference(&mut self, id: FilterId) -> bool {
        let filter = self.filter_mut(id);
        filter.refcount -= 1;
        if filter.refcount > 0 {
            return false;
        }

        let filter = self.slots[id.0].take().expect("checked above");
        log::trace!("Dropped {id:?} for {:?}", filter.required);

        self.by_types.remove(&filter.required);
        match filter.required.is_empty() {
            true => self.unfiltered.retain(|&other| other != id),
            false => {
                for comp in &filter.required {
                    self.by_comp[comp.0].retain(|&other| other != id);
                }
            }
        }
        self.free_slots.push(id.0);

        true
    }

    /// Updates the filters that require `comp` after it was added to `entity`.
    pub(crate) fn mark_component_add(&mut self, comp: CompId, entity: Entity, record: &Record) {
        self.refresh_comp(comp, entity, record);
    }

    /// Updates the filters that require `comp` after it was erased from `entity`.
    pub(crate) fn mark_component_erase(&mut self, comp: CompId, entity: Entity, record: &Record) {
        self.refresh_comp(comp, entity, record);
    }

    fn refresh_comp(&mut self, comp: CompId, entity: Entity, record: &Record) {
        let Self { slots, by_comp, .. } = self;
        for id in &by_comp[comp.0] {
            let filter = slots[id.0].as_mut().expect("indexed filters are alive");
            filter.refresh(entity, record);
        }
    }

    /// Adds a newly spawned entity, which has no components yet,
    /// to the filters that require nothing.
    pub(crate) fn mark_entity_spawn(&mut self, entity: Entity) {
        let Self { slots, unfiltered, .. } = self;
        for id in unfiltered.iter() {
            let filter = slots[id.0].as_mut().expect("indexed filters are alive");
            filter.cache.insert(entity);
        }
    }

    /// Adds a fully constructed entity to every filter it matches.
    ///
    /// This is the batched replacement for one `mark_component_add` per component.
    pub(crate) fn mark_entity_creation(&mut self, entity: Entity, record: &Record) {
        for filter in self.slots.iter_mut().flatten() {
            filter.refresh(entity, record);
        }
    }

    /// Removes an entity from every filter.
    pub(crate) fn mark_entity_destruction(&mut self, entity: Entity) {
        for filter in self.slots.iter_mut().flatten() {
            filter.cache.swap_remove(&entity);
        }
    }

    /// The cached entities of a filter.
    pub(crate) fn entities(&self, id: FilterId) -> &IndexSet<Entity> { &self.filter(id).cache }

    /// The canonical required set of a filter.
    #[cfg(test)]
    pub(crate) fn required(&self, id: FilterId) -> &[CompId] { &self.filter(id).required }

    /// The number of references to a filter.
    pub(crate) fn refcount(&self, id: FilterId) -> usize { self.filter(id).refcount }

    /// The number of live filters.
    pub(crate) fn len(&self) -> usize { self.by_types.len() }

    /// Number of filters that contain an entity; used to check destruction.
    #[cfg(test)]
    pub(crate) fn count_containing(&self, entity: Entity) -> usize {
        self.slots.iter().flatten().filter(|filter| filter.cache.contains(&entity)).count()
    }
}
