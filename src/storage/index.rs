//! The archetype arena and the entity location index.

use super::archetype::{Archetype, ArchetypeId};
use crate::bitmask::Bitmask;
use crate::entity::Entity;
use crate::error::EcsError;
use crate::hash::{ArchetypeKeyHasher, EntityHasher};
use bit_set::BitSet;
use std::collections::HashMap;
use tracing::debug;

/// Owns every archetype and maps component-set keys to their unique
/// instance.
///
/// Archetypes are arena-allocated; edges between them refer to slots by
/// [ArchetypeId] rather than by pointer, which keeps the inherently
/// cyclic graph free of ownership ambiguity and makes unlinking O(1).
/// The `version` counter increments whenever the set of archetypes
/// changes and anchors query cache validity.
#[derive(Debug)]
pub struct Archetypes {
    slots: Vec<Option<Archetype>>,
    free: Vec<u32>,
    by_key: HashMap<u64, ArchetypeId, ArchetypeKeyHasher>,
    version: u64,
    emptied: BitSet,
}

impl Default for Archetypes {
    fn default() -> Self {
        Self::new()
    }
}

impl Archetypes {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_key: HashMap::default(),
            version: 0,
            emptied: BitSet::new(),
        }
    }

    /// The current structural version. Bumped on every archetype
    /// insertion and removal.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Looks up the archetype for a component set, creating it on first
    /// need.
    pub fn get_or_insert(&mut self, bitmask: Bitmask) -> ArchetypeId {
        let key = bitmask.archetype_key();
        if let Some(id) = self.by_key.get(&key) {
            return *id;
        }

        let id = match self.free.pop() {
            Some(index) => ArchetypeId(index),
            None => {
                self.slots.push(None);
                ArchetypeId((self.slots.len() - 1) as u32)
            }
        };
        self.slots[id.index()] = Some(Archetype::new(id, bitmask));
        self.by_key.insert(key, id);
        self.version += 1;
        debug!(archetype = id.0, components = ?bitmask, "created archetype");
        id
    }

    /// Returns the archetype for a component set, if it exists.
    pub fn lookup(&self, bitmask: &Bitmask) -> Option<ArchetypeId> {
        self.by_key.get(&bitmask.archetype_key()).copied()
    }

    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Like [get](Self::get), but a missing slot is an internal error.
    pub fn archetype(&self, id: ArchetypeId) -> Result<&Archetype, EcsError> {
        self.get(id)
            .ok_or(EcsError::Archetype("archetype slot is vacant"))
    }

    /// Like [get_mut](Self::get_mut), but a missing slot is an internal
    /// error.
    pub fn archetype_mut(&mut self, id: ArchetypeId) -> Result<&mut Archetype, EcsError> {
        self.get_mut(id)
            .ok_or(EcsError::Archetype("archetype slot is vacant"))
    }

    /// Mutably borrows two distinct archetypes at once.
    pub fn pair_mut(
        &mut self,
        a: ArchetypeId,
        b: ArchetypeId,
    ) -> Result<(&mut Archetype, &mut Archetype), EcsError> {
        if a == b {
            return Err(EcsError::Archetype("pair borrow of a single archetype"));
        }
        let (a_slot, b_slot) = if a.index() < b.index() {
            let (low, high) = self.slots.split_at_mut(b.index());
            (low[a.index()].as_mut(), high[0].as_mut())
        } else {
            let (low, high) = self.slots.split_at_mut(a.index());
            (high[0].as_mut(), low[b.index()].as_mut())
        };
        match (a_slot, b_slot) {
            (Some(a_slot), Some(b_slot)) => Ok((a_slot, b_slot)),
            _ => Err(EcsError::Archetype("archetype slot is vacant")),
        }
    }

    /// Iterates all live archetypes.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Records that an archetype's last row was removed. Cleanup
    /// revisits the mark and tears the archetype down if it is still
    /// empty.
    pub fn mark_emptied(&mut self, id: ArchetypeId) {
        self.emptied.insert(id.index());
    }

    /// Drains the emptied marks, keeping only those that still point at
    /// a live, empty archetype.
    pub fn take_emptied(&mut self) -> Vec<ArchetypeId> {
        let marks: Vec<usize> = self.emptied.iter().collect();
        self.emptied.clear();
        marks
            .into_iter()
            .map(|index| ArchetypeId(index as u32))
            .filter(|id| self.get(*id).is_some_and(Archetype::is_empty))
            .collect()
    }

    /// Removes an archetype from the arena, returning it for edge
    /// teardown.
    pub fn release(&mut self, id: ArchetypeId) -> Option<Archetype> {
        let archetype = self.slots.get_mut(id.index()).and_then(Option::take)?;
        self.by_key.remove(&archetype.bitmask().archetype_key());
        self.free.push(id.0);
        self.version += 1;
        Some(archetype)
    }
}

/// Maps each live entity to the archetype holding its row.
///
/// Entities between their first component and despawn always have an
/// entry here; an entity whose last component was removed is live but
/// unassigned and has none.
#[derive(Debug, Default)]
pub struct LocationMap {
    map: HashMap<Entity, ArchetypeId, EntityHasher>,
}

impl LocationMap {
    pub fn get(&self, entity: Entity) -> Option<ArchetypeId> {
        self.map.get(&entity).copied()
    }

    pub fn set(&mut self, entity: Entity, archetype: ArchetypeId) {
        self.map.insert(entity, archetype);
    }

    pub fn remove(&mut self, entity: Entity) -> Option<ArchetypeId> {
        self.map.remove(&entity)
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.map.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
