//! Archetypes are buckets of entities which all carry exactly the same
//! set of components.
//!
//! Entities in the same archetype have their component values stored in
//! parallel columns, one column per component id, addressed by the
//! entity's row. All query filtering happens at the archetype level;
//! decisions are never made per-entity.

use super::{Column, DirtyFlags, Value};
use crate::bitmask::{Bitmask, ComponentId};
use crate::entity::Entity;
use crate::error::EcsError;
use crate::hash::{ComponentIdHasher, EntityHasher};
use crate::storage::edge::EdgeId;
use std::collections::HashMap;

/// The index of an archetype slot in the archetype arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A collection of entities which all have identical component sets.
#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    bitmask: Bitmask,
    entities: Vec<Entity>,
    rows: HashMap<Entity, usize, EntityHasher>,
    columns: HashMap<ComponentId, Column, ComponentIdHasher>,
    dirty: DirtyFlags,
    /// Cached transitions out of this archetype, keyed by the added
    /// component.
    pub(crate) add_edges: HashMap<ComponentId, EdgeId, ComponentIdHasher>,
    /// Cached transitions out of this archetype, keyed by the removed
    /// component. The edge stored here points *from* the smaller
    /// archetype, so the destination of the removal is the edge's
    /// `from` end.
    pub(crate) remove_edges: HashMap<ComponentId, EdgeId, ComponentIdHasher>,
    /// Head of the doubly-linked list of edges whose `to` end is this
    /// archetype. Only walked during cleanup.
    pub(crate) incoming: Option<EdgeId>,
}

impl Archetype {
    pub(crate) fn new(id: ArchetypeId, bitmask: Bitmask) -> Self {
        Self {
            id,
            bitmask,
            entities: Vec::new(),
            rows: HashMap::default(),
            columns: HashMap::default(),
            dirty: DirtyFlags::default(),
            add_edges: HashMap::default(),
            remove_edges: HashMap::default(),
            incoming: None,
        }
    }

    /// Returns the archetype's arena index.
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Returns the component set shared by every resident entity.
    pub fn bitmask(&self) -> &Bitmask {
        &self.bitmask
    }

    /// Returns a slice of all resident entities, in row order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Number of live rows.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns the row currently holding the given entity.
    pub fn row_of(&self, entity: Entity) -> Option<usize> {
        self.rows.get(&entity).copied()
    }

    /// Returns the entity at the given row.
    pub fn entity_at(&self, row: usize) -> Option<Entity> {
        self.entities.get(row).copied()
    }

    /// Returns the accumulated change flags.
    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    /// Returns the column for a component, if it has been allocated.
    pub(crate) fn column(&self, component: ComponentId) -> Option<&Column> {
        self.columns.get(&component)
    }

    /// Reads the cell at `(component, row)`. Absent columns and vacated
    /// slots read as `Null`.
    pub(crate) fn cell(&self, component: ComponentId, row: usize) -> Option<&Value> {
        self.columns.get(&component).and_then(|column| column.get(row))
    }

    /// Takes the cell at `(component, row)`, leaving `Null`. Absent
    /// columns yield `Null`.
    pub(crate) fn take_cell(&mut self, component: ComponentId, row: usize) -> Value {
        match self.columns.get_mut(&component) {
            Some(column) => column.take(row),
            None => Value::Null,
        }
    }

    /// Writes the cell at `(component, row)`, allocating the column on
    /// first write. Writing `Null` into a column that was never
    /// allocated is skipped so empty columns stay unallocated.
    pub(crate) fn put_cell(&mut self, component: ComponentId, row: usize, value: Value) {
        debug_assert!(self.bitmask.contains(component));
        if value.is_null() && !self.columns.contains_key(&component) {
            return;
        }
        self.columns
            .entry(component)
            .or_default()
            .write(row, value);
    }

    /// Appends a row for the entity and pads every allocated column to
    /// cover it. Cell values are written separately.
    pub(crate) fn push_row(&mut self, entity: Entity) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        self.rows.insert(entity, row);
        for column in self.columns.values_mut() {
            column.ensure(row + 1);
        }
        self.dirty.mark(DirtyFlags::ADDITION);
        row
    }

    /// Removes the entity's row bookkeeping with a swap-and-pop,
    /// assuming the caller has already handled every column. Returns
    /// the entity that was backfilled into the vacated row, if any.
    pub(crate) fn finish_remove_row(&mut self, entity: Entity) -> Result<Option<Entity>, EcsError> {
        let row = self
            .rows
            .remove(&entity)
            .ok_or(EcsError::Archetype("removed entity has no row"))?;
        self.entities.swap_remove(row);
        self.dirty.mark(DirtyFlags::REMOVAL);
        if row < self.entities.len() {
            let moved = self.entities[row];
            self.rows.insert(moved, row);
            Ok(Some(moved))
        } else {
            Ok(None)
        }
    }

    /// Appends the entity with one value per component in the set.
    pub(crate) fn append(
        &mut self,
        entity: Entity,
        values: impl IntoIterator<Item = (ComponentId, Value)>,
    ) -> usize {
        let row = self.push_row(entity);
        for (component, value) in values {
            self.put_cell(component, row, value);
        }
        row
    }

    /// Overwrites one value in place. The component must be part of the
    /// archetype's set.
    pub(crate) fn write_value(
        &mut self,
        entity: Entity,
        component: ComponentId,
        value: Value,
    ) -> Result<(), EcsError> {
        if !self.bitmask.contains(component) {
            return Err(EcsError::Archetype("update outside the component set"));
        }
        let row = self
            .rows
            .get(&entity)
            .copied()
            .ok_or(EcsError::Archetype("updated entity has no row"))?;
        self.columns
            .entry(component)
            .or_default()
            .write(row, value);
        self.dirty.mark(DirtyFlags::UPDATE);
        Ok(())
    }

    /// Reads the entity's value for a component. Vacated slots read as
    /// `None`.
    pub fn value(&self, entity: Entity, component: ComponentId) -> Option<&Value> {
        let row = self.row_of(entity)?;
        self.cell(component, row).filter(|value| !value.is_null())
    }

    /// Removes the entity's row entirely, discarding its values and
    /// backfilling from the last row. Returns the backfilled entity, if
    /// any.
    pub(crate) fn swap_remove(&mut self, entity: Entity) -> Result<Option<Entity>, EcsError> {
        let row = self
            .rows
            .get(&entity)
            .copied()
            .ok_or(EcsError::Archetype("removed entity has no row"))?;
        let last = self.entities.len() - 1;
        for column in self.columns.values_mut() {
            column.take(row);
            if row < last {
                let backfill = column.take(last);
                column.write(row, backfill);
            }
        }
        self.finish_remove_row(entity)
    }

    /// Drops every cached edge reference. Used when the archetype is
    /// torn down.
    pub(crate) fn clear_edges(&mut self) {
        self.add_edges.clear();
        self.remove_edges.clear();
        self.incoming = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(id: u32) -> ComponentId {
        ComponentId::new(id)
    }

    fn archetype(ids: &[u32]) -> Archetype {
        let mut mask = Bitmask::empty();
        for id in ids {
            mask.set(c(*id));
        }
        Archetype::new(ArchetypeId(0), mask)
    }

    fn assert_rows_coherent(archetype: &Archetype) {
        for (row, entity) in archetype.entities().iter().enumerate() {
            assert_eq!(archetype.row_of(*entity), Some(row));
        }
        for column in archetype.columns.values() {
            assert!(column.len() >= archetype.len());
        }
    }

    #[test]
    fn append_writes_all_columns() {
        let mut archetype = archetype(&[1, 2]);
        let entity = Entity::pack(0, 0);
        let row = archetype.append(
            entity,
            [(c(1), Value::Int(10)), (c(2), Value::Int(20))],
        );
        assert_eq!(row, 0);
        assert_eq!(archetype.value(entity, c(1)), Some(&Value::Int(10)));
        assert_eq!(archetype.value(entity, c(2)), Some(&Value::Int(20)));
        assert!(archetype.dirty().contains(DirtyFlags::ADDITION));
        assert_rows_coherent(&archetype);
    }

    #[test]
    fn swap_remove_backfills_the_vacated_row() {
        let mut archetype = archetype(&[1]);
        let entities: Vec<Entity> = (0..3).map(|id| Entity::pack(id, 0)).collect();
        for (index, entity) in entities.iter().enumerate() {
            archetype.append(*entity, [(c(1), Value::Int(index as i64))]);
        }

        let moved = archetype.swap_remove(entities[0]).unwrap();
        assert_eq!(moved, Some(entities[2]));
        assert_eq!(archetype.len(), 2);
        assert_eq!(archetype.value(entities[2], c(1)), Some(&Value::Int(2)));
        assert_eq!(archetype.value(entities[1], c(1)), Some(&Value::Int(1)));
        assert!(archetype.dirty().contains(DirtyFlags::REMOVAL));
        assert_rows_coherent(&archetype);
    }

    #[test]
    fn swap_remove_of_the_last_row_needs_no_backfill() {
        let mut archetype = archetype(&[1]);
        let a = Entity::pack(0, 0);
        let b = Entity::pack(1, 0);
        archetype.append(a, [(c(1), Value::Int(1))]);
        archetype.append(b, [(c(1), Value::Int(2))]);

        let moved = archetype.swap_remove(b).unwrap();
        assert_eq!(moved, None);
        assert_eq!(archetype.len(), 1);
        assert_eq!(archetype.value(a, c(1)), Some(&Value::Int(1)));
        assert_rows_coherent(&archetype);
    }

    #[test]
    fn update_marks_the_update_flag() {
        let mut archetype = archetype(&[1]);
        let entity = Entity::pack(0, 0);
        archetype.append(entity, [(c(1), Value::Int(1))]);
        archetype
            .write_value(entity, c(1), Value::Int(2))
            .unwrap();
        assert_eq!(archetype.value(entity, c(1)), Some(&Value::Int(2)));
        assert!(archetype.dirty().contains(DirtyFlags::UPDATE));
    }

    #[test]
    fn update_outside_the_set_is_rejected() {
        let mut archetype = archetype(&[1]);
        let entity = Entity::pack(0, 0);
        archetype.append(entity, [(c(1), Value::Int(1))]);
        assert!(archetype.write_value(entity, c(2), Value::Int(2)).is_err());
    }
}
