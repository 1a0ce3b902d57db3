//! Iteration over the rows matched by a query.

use super::archetype_matches;
use crate::bitmask::{Bitmask, ComponentId};
use crate::entity::Entity;
use crate::error::EcsError;
use crate::storage::archetype::{Archetype, ArchetypeId};
use crate::storage::{Column, Value, NULL};
use crate::world::World;
use smallvec::SmallVec;

/// A filtered view over the archetypes matching a query.
///
/// The view is a read-only snapshot: it borrows the world, so the
/// borrow checker rules out mutation while any view or its rows are
/// alive. Refinements ([with](Self::with), [without](Self::without),
/// [any](Self::any)) narrow the already-retained archetype list and are
/// not cached.
#[derive(Debug)]
pub struct QueryView<'w> {
    world: &'w World,
    components: SmallVec<[ComponentId; 5]>,
    include: Bitmask,
    exclude: Bitmask,
    any: Bitmask,
    archetypes: Vec<ArchetypeId>,
}

impl<'w> QueryView<'w> {
    pub(crate) fn new(
        world: &'w World,
        components: SmallVec<[ComponentId; 5]>,
        include: Bitmask,
        archetypes: Vec<ArchetypeId>,
    ) -> Self {
        Self {
            world,
            components,
            include,
            exclude: Bitmask::empty(),
            any: Bitmask::empty(),
            archetypes,
        }
    }

    /// Requires every listed component to be present. The projected
    /// columns stay as declared by the original `query` call.
    pub fn with(mut self, components: &[ComponentId]) -> Result<Self, EcsError> {
        for component in self.world.admit_components(components)? {
            self.include.set(component);
        }
        self.refilter();
        Ok(self)
    }

    /// Rejects archetypes holding any of the listed components.
    pub fn without(mut self, components: &[ComponentId]) -> Result<Self, EcsError> {
        for component in self.world.admit_components(components)? {
            self.exclude.set(component);
        }
        self.refilter();
        Ok(self)
    }

    /// Requires at least one of the listed components, accumulated
    /// across calls.
    pub fn any(mut self, components: &[ComponentId]) -> Result<Self, EcsError> {
        for component in self.world.admit_components(components)? {
            self.any.set(component);
        }
        self.refilter();
        Ok(self)
    }

    fn refilter(&mut self) {
        let world = self.world;
        let (include, exclude, any) = (self.include, self.exclude, self.any);
        self.archetypes.retain(|id| {
            world
                .archetypes()
                .get(*id)
                .is_some_and(|archetype| {
                    archetype_matches(archetype.bitmask(), &include, &exclude, &any)
                })
        });
    }

    /// Number of archetypes the view currently retains.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Returns `true` if no archetype matched.
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Returns an iterator over the matched rows in archetype-major
    /// order: every row of one archetype is yielded before the next
    /// archetype is visited.
    pub fn view(&self) -> Rows<'w> {
        Rows {
            world: self.world,
            components: self.components.clone(),
            archetypes: self.archetypes.clone().into_iter(),
            current: None,
            row: 0,
        }
    }
}

impl<'a, 'w> IntoIterator for &'a QueryView<'w> {
    type Item = Row<'w>;
    type IntoIter = Rows<'w>;

    fn into_iter(self) -> Self::IntoIter {
        self.view()
    }
}

/// One matched entity together with its projected component values.
#[derive(Debug)]
pub struct Row<'w> {
    entity: Entity,
    values: SmallVec<[&'w Value; 5]>,
}

impl<'w> Row<'w> {
    /// The entity this row belongs to.
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Returns the value of the i-th projected component, `None` when
    /// the slot is vacant.
    pub fn get(&self, index: usize) -> Option<&'w Value> {
        self.values
            .get(index)
            .copied()
            .filter(|value| !value.is_null())
    }

    /// All projected values in declared order. Vacant slots read as
    /// [Value::Null].
    pub fn values(&self) -> &[&'w Value] {
        &self.values
    }
}

/// The archetype-major row iterator produced by
/// [QueryView::view].
pub struct Rows<'w> {
    world: &'w World,
    components: SmallVec<[ComponentId; 5]>,
    archetypes: std::vec::IntoIter<ArchetypeId>,
    current: Option<Cursor<'w>>,
    row: usize,
}

struct Cursor<'w> {
    archetype: &'w Archetype,
    /// Column references resolved once per archetype; `None` when the
    /// column was never allocated.
    columns: SmallVec<[Option<&'w Column>; 5]>,
}

impl<'w> Rows<'w> {
    fn advance(&mut self) -> bool {
        loop {
            let Some(id) = self.archetypes.next() else {
                self.current = None;
                return false;
            };
            let Some(archetype) = self.world.archetypes().get(id) else {
                continue;
            };
            if archetype.is_empty() {
                continue;
            }
            let columns = self
                .components
                .iter()
                .map(|component| archetype.column(*component))
                .collect();
            self.current = Some(Cursor { archetype, columns });
            self.row = 0;
            return true;
        }
    }
}

impl<'w> Iterator for Rows<'w> {
    type Item = Row<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &self.current {
                Some(cursor) if self.row < cursor.archetype.len() => {
                    let row = self.row;
                    self.row += 1;
                    let entity = cursor.archetype.entity_at(row)?;
                    let values = cursor
                        .columns
                        .iter()
                        .map(|column| {
                            column.and_then(|column| column.get(row)).unwrap_or(&NULL)
                        })
                        .collect();
                    return Some(Row { entity, values });
                }
                _ => {
                    if !self.advance() {
                        return None;
                    }
                }
            }
        }
    }
}
