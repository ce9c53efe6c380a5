//! Entities are opaque identities that own components.
//!
//! An entity is just a positive integer.
//! Id 0 is never allocated, and id 1 is the world root, which exists as long as the registry.
//! Parent and child links are stored as ids and resolved through the registry,
//! so destroying an entity never leaves a dangling pointer behind.

use std::fmt;
use std::num::NonZeroU32;

pub(crate) mod ealloc;
pub use ealloc::AllocHint;

pub(crate) mod table;


/// The primitive scalar type used to index entity-keyed tables.
pub type Primitive = usize;

/// A handle to an entity.
///
/// The handle does not keep the entity alive.
/// Operations on a destroyed entity fail with [`Error::DeadEntity`](crate::Error::DeadEntity).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity(NonZeroU32);

impl Entity {
    /// The root entity that owns every entity created without an explicit parent.
    pub const WORLD: Entity = match NonZeroU32::new(1) {
        Some(id) => Entity(id),
        None => unreachable!(),
    };

    /// Reinterprets a raw id as an entity handle.
    ///
    /// Returns `None` for the invalid id 0.
    /// The returned handle may refer to an entity that is not alive.
    pub fn from_raw(id: u32) -> Option<Self> { NonZeroU32::new(id).map(Self) }

    /// Returns the raw id of the entity.
    pub fn id(self) -> u32 { self.0.get() }

    /// Whether this is the world root.
    pub fn is_world(self) -> bool { self == Self::WORLD }

    pub(crate) fn from_primitive(i: Primitive) -> Self {
        i.try_into().ok().and_then(Self::from_raw).expect("Invalid entity index")
    }

    pub(crate) fn to_primitive(self) -> Primitive {
        self.0.get().try_into().expect("usize >= u32")
    }

    /// Returns the entity `count` ids after this one.
    pub(crate) fn add(self, count: u32) -> Self {
        self.0.checked_add(count).map(Self).expect("entity id overflow")
    }

    /// Returns the distance between two ids.
    pub(crate) fn distance(self, other: Self) -> u32 { self.id().abs_diff(other.id()) }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "Entity({})", self.0) }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "#{}", self.0) }
}
