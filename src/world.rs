//! Contains the [World] entity collection.

use crate::bitmask::{query_key, Bitmask, ComponentId};
use crate::config::WorldOptions;
use crate::entity::{Allocator, Entity};
use crate::error::EcsError;
use crate::event::{CacheKind, Event, EventSender, Subscribers};
use crate::profile::Profiler;
use crate::query::view::QueryView;
use crate::query::{archetype_matches, QueryCache};
use crate::storage::archetype::ArchetypeId;
use crate::storage::edge::{EdgeGraph, TransitionId, TransitionInfo};
use crate::storage::index::{Archetypes, LocationMap};
use crate::storage::Value;
use crate::transition;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, span, Level};

/// A container of entities.
///
/// Each entity is identified by an [Entity] handle and may carry one
/// value per [ComponentId]. Entities with identical component sets
/// share an archetype, and changing an entity's set moves it between
/// archetypes along cached graph edges.
///
/// The world is single-threaded: every operation completes
/// synchronously, and the borrow checker rules out mutation while a
/// query view is being iterated.
///
/// # Examples
///
/// ```
/// # fn main() -> Result<(), phalanx::EcsError> {
/// use phalanx::{ComponentId, World};
///
/// const POSITION: ComponentId = ComponentId::new(1);
/// const HEALTH: ComponentId = ComponentId::new(2);
///
/// let mut world = World::new();
/// let player = world.entity()?;
/// world.set(player, POSITION, 3.5)?.set(player, HEALTH, 100)?;
///
/// for row in world.query(&[POSITION, HEALTH])?.view() {
///     assert_eq!(row.entity(), player);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct World {
    debug_mode: bool,
    allocator: Allocator,
    locations: LocationMap,
    archetypes: Archetypes,
    edges: EdgeGraph,
    queries: Mutex<QueryCache>,
    subscribers: Subscribers,
    profiler: Profiler,
}

impl Default for World {
    fn default() -> Self {
        Self::with_options(WorldOptions::default())
    }
}

impl World {
    /// Creates a world with the process-wide configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a world with explicit [options](WorldOptions).
    pub fn with_options(options: WorldOptions) -> Self {
        let (debug_mode, profiling_mode) = options.resolve();
        Self {
            debug_mode,
            allocator: Allocator::new(),
            locations: LocationMap::default(),
            archetypes: Archetypes::new(),
            edges: EdgeGraph::new(),
            queries: Mutex::new(QueryCache::default()),
            subscribers: Subscribers::default(),
            profiler: Profiler::new(profiling_mode),
        }
    }

    /// Returns the number of live entities.
    pub fn len(&self) -> usize {
        self.allocator.live()
    }

    /// Returns `true` if the world contains no entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the handle addresses a live entity.
    pub fn contains(&self, entity: Entity) -> bool {
        self.allocator.contains(entity)
    }

    /// Issues a fresh entity handle. The entity starts unassigned, with
    /// no components and no archetype.
    pub fn entity(&mut self) -> Result<Entity, EcsError> {
        let started = self.profiler.start();
        let entity = self.allocator.allocate()?;
        self.profiler.record("entity", started);
        Ok(entity)
    }

    /// Returns the entity's id to the free list and clears its row.
    ///
    /// A stale handle is an error in debug mode and a silent no-op
    /// otherwise, so despawning the same handle twice is harmless in
    /// release configurations.
    pub fn despawn(&mut self, entity: Entity) -> Result<&mut Self, EcsError> {
        let started = self.profiler.start();
        let Some(id) = self.admit_entity(entity)? else {
            return Ok(self);
        };
        if let Some(archetype_id) = self.locations.remove(entity) {
            let archetype = self.archetypes.archetype_mut(archetype_id)?;
            archetype.swap_remove(entity)?;
            if archetype.is_empty() {
                self.archetypes.mark_emptied(archetype_id);
            }
        }
        self.allocator.deallocate(id);
        self.profiler.record("despawn", started);
        Ok(self)
    }

    /// Writes a component value, moving the entity to the archetype
    /// with the component added if it did not carry it before.
    pub fn set(
        &mut self,
        entity: Entity,
        component: ComponentId,
        value: impl Into<Value>,
    ) -> Result<&mut Self, EcsError> {
        let started = self.profiler.start();
        if self.admit_entity(entity)?.is_none() {
            return Ok(self);
        }
        if !self.admit_component(component)? {
            return Ok(self);
        }
        let value = value.into();
        let echo = (!self.subscribers.is_empty()).then(|| value.clone());

        match self.locations.get(entity) {
            None => {
                let destination = self.archetypes.get_or_insert(Bitmask::single(component));
                let info = TransitionInfo::first_assignment(destination, component);
                transition::move_entity(
                    &mut self.archetypes,
                    &mut self.locations,
                    entity,
                    &info,
                    Some((component, value)),
                )?;
                self.subscribers
                    .send(Event::Transition(entity, None, Some(destination)));
            }
            Some(current) => {
                let resident = self
                    .archetypes
                    .archetype(current)?
                    .bitmask()
                    .contains(component);
                if resident {
                    self.archetypes
                        .archetype_mut(current)?
                        .write_value(entity, component, value)?;
                } else {
                    let (destination, transition) = self.add_transition(current, component)?;
                    self.edges.note_use(transition);
                    transition::move_entity(
                        &mut self.archetypes,
                        &mut self.locations,
                        entity,
                        self.edges.transition(transition)?,
                        Some((component, value)),
                    )?;
                    if self.archetypes.archetype(current)?.is_empty() {
                        self.archetypes.mark_emptied(current);
                    }
                    self.subscribers
                        .send(Event::Transition(entity, Some(current), Some(destination)));
                }
            }
        }

        if let Some(value) = echo {
            self.subscribers.send(Event::Set(entity, component, value));
        }
        self.profiler.record("set", started);
        Ok(self)
    }

    /// Detaches a component from the entity, moving it to the archetype
    /// with the component removed. A no-op when the entity does not
    /// carry the component.
    pub fn remove(
        &mut self,
        entity: Entity,
        component: ComponentId,
    ) -> Result<&mut Self, EcsError> {
        let started = self.profiler.start();
        if self.admit_entity(entity)?.is_none() {
            return Ok(self);
        }
        if !self.admit_component(component)? {
            return Ok(self);
        }
        let Some(current) = self.locations.get(entity) else {
            return Ok(self);
        };
        let mask = *self.archetypes.archetype(current)?.bitmask();
        if !mask.contains(component) {
            return Ok(self);
        }

        if mask.without(component).is_empty() {
            // Last component: the entity stays live but unassigned, and
            // no empty-set archetype is ever synthesized.
            let archetype = self.archetypes.archetype_mut(current)?;
            archetype.swap_remove(entity)?;
            if archetype.is_empty() {
                self.archetypes.mark_emptied(current);
            }
            self.locations.remove(entity);
            self.subscribers
                .send(Event::Transition(entity, Some(current), None));
        } else {
            let (destination, transition) = self.remove_transition(current, component)?;
            self.edges.note_use(transition);
            transition::move_entity(
                &mut self.archetypes,
                &mut self.locations,
                entity,
                self.edges.transition(transition)?,
                None,
            )?;
            if self.archetypes.archetype(current)?.is_empty() {
                self.archetypes.mark_emptied(current);
            }
            self.subscribers
                .send(Event::Transition(entity, Some(current), Some(destination)));
        }
        self.profiler.record("remove", started);
        Ok(self)
    }

    /// Reads the entity's value for a component. Returns `None` when
    /// the entity does not carry the component; a stale handle is an
    /// error in debug mode and reads as `None` otherwise.
    pub fn has(
        &self,
        entity: Entity,
        component: ComponentId,
    ) -> Result<Option<&Value>, EcsError> {
        if self.admit_entity(entity)?.is_none() {
            return Ok(None);
        }
        if !self.admit_component(component)? {
            return Ok(None);
        }
        Ok(self
            .locations
            .get(entity)
            .and_then(|id| self.archetypes.get(id))
            .and_then(|archetype| archetype.value(entity, component)))
    }

    /// Returns the entity's current component set in ascending id
    /// order.
    pub fn component_ids(&self, entity: Entity) -> Result<Vec<ComponentId>, EcsError> {
        if self.admit_entity(entity)?.is_none() {
            return Ok(Vec::new());
        }
        Ok(self
            .locations
            .get(entity)
            .and_then(|id| self.archetypes.get(id))
            .map(|archetype| archetype.bitmask().iter().collect())
            .unwrap_or_default())
    }

    /// Builds a view over all archetypes carrying every listed
    /// component, projecting the listed columns in declared order.
    ///
    /// The matching archetype list is cached per include mask and
    /// reused until the set of archetypes changes.
    pub fn query(&self, components: &[ComponentId]) -> Result<QueryView<'_>, EcsError> {
        let started = self.profiler.start();
        if components.is_empty() {
            return Err(EcsError::InvalidOperation(
                "query requires at least one component",
            ));
        }
        let admitted = self.admit_components(components)?;
        if admitted.is_empty() {
            return Err(EcsError::Query("no valid component to match"));
        }
        let mut include = Bitmask::empty();
        for component in &admitted {
            include.set(*component);
        }
        let none = Bitmask::empty();
        let key = query_key(&include, &none);
        let version = self.archetypes.version();

        let cached = self.queries.lock().lookup(key, version);
        let archetypes = match cached {
            Some(archetypes) => archetypes,
            None => {
                let archetypes: Vec<ArchetypeId> = self
                    .archetypes
                    .iter()
                    .filter(|archetype| {
                        archetype_matches(archetype.bitmask(), &include, &none, &none)
                    })
                    .map(|archetype| archetype.id())
                    .collect();
                self.queries.lock().insert(key, archetypes.clone(), version);
                self.subscribers.send(Event::Cached(CacheKind::Query, key));
                archetypes
            }
        };

        self.profiler.record("query", started);
        Ok(QueryView::new(self, admitted, include, archetypes))
    }

    /// Tears down empty archetypes, unlinking every edge touching them
    /// and dropping cache entries that refer to them, then discards the
    /// query cache wholesale.
    ///
    /// Also fails with [EcsError::IdSpaceExhausted] once the id space
    /// has no issuable id left.
    pub fn cleanup(&mut self) -> Result<&mut Self, EcsError> {
        let started = self.profiler.start();
        let span = span!(Level::TRACE, "cleanup");
        let _guard = span.enter();

        if self.allocator.exhausted() {
            return Err(EcsError::IdSpaceExhausted);
        }

        let dead = self.archetypes.take_emptied();
        self.edges.prune_cache(&dead);
        let mut unlinked = 0;
        for id in &dead {
            if let Some(mut archetype) = self.archetypes.release(*id) {
                unlinked += self.edges.dissolve(&mut self.archetypes, &mut archetype);
            }
        }
        self.queries.lock().clear();

        debug!(
            archetypes = dead.len(),
            edges = unlinked,
            "cleanup pass complete"
        );
        self.subscribers.send(Event::Cleanup);
        self.profiler.record("cleanup", started);
        Ok(self)
    }

    /// Subscribes to world [events](Event). Senders that report
    /// themselves dead are dropped.
    pub fn subscribe<S: EventSender + 'static>(&self, sender: S) {
        self.subscribers.push(Arc::new(sender));
    }

    /// Returns the latency collector. Empty unless profiling mode is
    /// on.
    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub(crate) fn archetypes(&self) -> &Archetypes {
        &self.archetypes
    }

    /// Validates a handle according to the error propagation policy:
    /// `Ok(None)` silently skips the call in release mode where debug
    /// mode reports the error.
    fn admit_entity(&self, entity: Entity) -> Result<Option<u32>, EcsError> {
        match self.allocator.validate(entity) {
            Ok(id) => Ok(Some(id)),
            Err(error) if self.debug_mode => Err(error),
            Err(_) => Ok(None),
        }
    }

    /// Validates a component id the same way.
    fn admit_component(&self, component: ComponentId) -> Result<bool, EcsError> {
        if component.in_range() {
            Ok(true)
        } else if self.debug_mode {
            Err(EcsError::InvalidComponent(component.get()))
        } else {
            Ok(false)
        }
    }

    /// Filters a component list the same way, dropping out-of-range ids
    /// in release mode.
    pub(crate) fn admit_components(
        &self,
        components: &[ComponentId],
    ) -> Result<SmallVec<[ComponentId; 5]>, EcsError> {
        let mut admitted = SmallVec::new();
        for component in components {
            if component.in_range() {
                admitted.push(*component);
            } else if self.debug_mode {
                return Err(EcsError::InvalidComponent(component.get()));
            }
        }
        Ok(admitted)
    }

    /// Resolves the destination and cached transition for adding a
    /// component, creating the target archetype, the edge and the cache
    /// entry on first use.
    fn add_transition(
        &mut self,
        from: ArchetypeId,
        component: ComponentId,
    ) -> Result<(ArchetypeId, TransitionId), EcsError> {
        let cached_edge = self
            .archetypes
            .archetype(from)?
            .add_edges
            .get(&component)
            .copied();
        let (destination, transition) = match cached_edge {
            Some(edge) => {
                let edge = self.edges.edge(edge)?;
                (edge.to, edge.transition)
            }
            None => {
                let mask = self.archetypes.archetype(from)?.bitmask().with(component);
                let destination = self.archetypes.get_or_insert(mask);
                let edge = self
                    .edges
                    .connect(&mut self.archetypes, from, destination, component)?;
                (destination, self.edges.edge(edge)?.transition)
            }
        };

        let key = EdgeGraph::key_between(&self.archetypes, from, destination)?;
        if self.edges.cached(key).is_none() {
            self.edges.cache_insert(key, destination, transition);
            self.subscribers
                .send(Event::Cached(CacheKind::Transition, key));
        }
        Ok((destination, transition))
    }

    /// Resolves the destination and cached transition for removing a
    /// component. The canonical edge points from the smaller archetype,
    /// so the removal's destination is the edge's `from` end; the
    /// remove-direction transition record is cached separately under
    /// its own key.
    fn remove_transition(
        &mut self,
        from: ArchetypeId,
        component: ComponentId,
    ) -> Result<(ArchetypeId, TransitionId), EcsError> {
        let cached_edge = self
            .archetypes
            .archetype(from)?
            .remove_edges
            .get(&component)
            .copied();
        let destination = match cached_edge {
            Some(edge) => self.edges.edge(edge)?.from,
            None => {
                let mask = self
                    .archetypes
                    .archetype(from)?
                    .bitmask()
                    .without(component);
                let destination = self.archetypes.get_or_insert(mask);
                self.edges
                    .connect(&mut self.archetypes, destination, from, component)?;
                destination
            }
        };

        let key = EdgeGraph::key_between(&self.archetypes, from, destination)?;
        let transition = match self.edges.cached(key) {
            Some((_, transition)) => transition,
            None => {
                let info = TransitionInfo::between(
                    from,
                    self.archetypes.archetype(from)?.bitmask(),
                    destination,
                    self.archetypes.archetype(destination)?.bitmask(),
                );
                let transition = self.edges.intern(info);
                self.edges.cache_insert(key, destination, transition);
                self.subscribers
                    .send(Event::Cached(CacheKind::Transition, key));
                transition
            }
        };
        Ok((destination, transition))
    }
}
