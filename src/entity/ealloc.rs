//! Manages entity ID allocation and recycling.

use std::collections::BTreeSet;

use super::Entity;

/// Fine-tunes which recycled id is handed out.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocHint {
    /// Prefer the recycled id closest to this entity.
    ///
    /// Without a hint, the smallest recycled id is reused first.
    pub near: Option<Entity>,
}

/// Allocates entity ids from a monotonic gauge,
/// reusing deallocated ids before growing the gauge.
#[derive(Debug)]
pub(crate) struct Ealloc {
    /// The next never-allocated id.
    gauge:      Entity,
    /// Deallocated ids available for reuse, sorted to keep tables dense.
    recyclable: BTreeSet<Entity>,
}

impl Default for Ealloc {
    fn default() -> Self { Self { gauge: Entity::WORLD, recyclable: BTreeSet::new() } }
}

impl Ealloc {
    /// Allocates an id, preferring recycled ids.
    pub(crate) fn allocate(&mut self, hint: AllocHint) -> Entity {
        if let Some(id) = self.poll_recyclable(hint) {
            return id;
        }

        let id = self.gauge;
        self.gauge = self.gauge.add(1);
        id
    }

    fn poll_recyclable(&mut self, hint: AllocHint) -> Option<Entity> {
        let selected = match hint.near {
            Some(near) => {
                let left = self.recyclable.range(..near).next_back().copied();
                let right = self.recyclable.range(near..).next().copied();

                match (left, right) {
                    (Some(left), Some(right)) => {
                        Some(if near.distance(left) <= near.distance(right) { left } else { right })
                    }
                    (left, right) => left.or(right),
                }
            }
            None => self.recyclable.first().copied(),
        }?;

        self.recyclable.remove(&selected);
        Some(selected)
    }

    /// Returns an id to the allocator.
    ///
    /// # Panics
    /// Panics if the id was never allocated or is already deallocated.
    pub(crate) fn deallocate(&mut self, id: Entity) {
        assert!(id < self.gauge, "{id:?} was never allocated");
        if !self.recyclable.insert(id) {
            panic!("{id:?} is deallocated twice");
        }
    }

    /// The upper bound (exclusive) of all ids allocated so far.
    #[cfg(test)]
    pub(crate) fn gauge(&self) -> Entity { self.gauge }

    /// Number of ids waiting to be reused.
    #[cfg(test)]
    pub(crate) fn recyclable_len(&self) -> usize { self.recyclable.len() }
}
