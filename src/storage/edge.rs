//! The add/remove edge graph over archetypes and the transition cache.
//!
//! Every edge is stored once, in its add direction: `from` is the
//! smaller component set, `to` is `from` plus one component. The same
//! edge serves the reverse removal, which is why it is registered in
//! `from.add_edges` and `to.remove_edges` simultaneously. Edges exist
//! only for transitions that have actually been exercised; the graph is
//! never completed eagerly.

use super::archetype::ArchetypeId;
use super::index::Archetypes;
use crate::bitmask::{transition_key, Bitmask, ComponentId};
use crate::error::EcsError;
use crate::hash::CacheKeyHasher;
use itertools::{merge_join_by, EitherOrBoth};
use smallvec::SmallVec;
use std::collections::HashMap;

/// The index of an edge slot in the edge arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EdgeId(u32);

impl EdgeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The index of a transition record in the transition arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TransitionId(u32);

impl TransitionId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Cached metadata for one direction of an archetype move.
///
/// Derivable from the two bitmasks alone; cached so the hot path never
/// recomputes the component lists. All lists are in ascending id order,
/// which fixes the column iteration order of the move.
#[derive(Debug, Clone)]
pub struct TransitionInfo {
    pub source: Option<ArchetypeId>,
    pub destination: ArchetypeId,
    /// Components present on both sides; their columns are copied.
    pub shared: SmallVec<[ComponentId; 8]>,
    /// Components only on the destination; values are supplied by the
    /// caller.
    pub added: SmallVec<[ComponentId; 8]>,
    /// Components only on the source; their values are discarded.
    pub removed: SmallVec<[ComponentId; 8]>,
    /// Number of moves that used this record.
    pub uses: u64,
}

impl TransitionInfo {
    /// Computes the component lists for a move between two sets.
    pub fn between(
        source: ArchetypeId,
        source_mask: &Bitmask,
        destination: ArchetypeId,
        destination_mask: &Bitmask,
    ) -> Self {
        let mut shared = SmallVec::new();
        let mut added = SmallVec::new();
        let mut removed = SmallVec::new();
        for pair in merge_join_by(source_mask.iter(), destination_mask.iter(), |a, b| {
            a.get().cmp(&b.get())
        }) {
            match pair {
                EitherOrBoth::Both(component, _) => shared.push(component),
                EitherOrBoth::Left(component) => removed.push(component),
                EitherOrBoth::Right(component) => added.push(component),
            }
        }
        Self {
            source: Some(source),
            destination,
            shared,
            added,
            removed,
            uses: 0,
        }
    }

    /// The degenerate transition assigning a fresh entity its first
    /// component. Never cached.
    pub fn first_assignment(destination: ArchetypeId, component: ComponentId) -> Self {
        Self {
            source: None,
            destination,
            shared: SmallVec::new(),
            added: SmallVec::from_slice(&[component]),
            removed: SmallVec::new(),
            uses: 0,
        }
    }
}

/// A directed link between two archetypes that differ by exactly one
/// component, plus its position in the incoming list at `to`.
#[derive(Debug)]
pub struct Edge {
    pub from: ArchetypeId,
    pub to: ArchetypeId,
    pub component: ComponentId,
    /// The cached add-direction transition (`from` → `to`).
    pub transition: TransitionId,
    prev: Option<EdgeId>,
    next: Option<EdgeId>,
}

/// Arena storage for edges and transition records, plus the
/// key-addressed transition cache.
#[derive(Debug, Default)]
pub struct EdgeGraph {
    edges: Vec<Option<Edge>>,
    free_edges: Vec<u32>,
    transitions: Vec<Option<TransitionInfo>>,
    free_transitions: Vec<u32>,
    cache: HashMap<u128, (ArchetypeId, TransitionId), CacheKeyHasher>,
}

impl EdgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edge(&self, id: EdgeId) -> Result<&Edge, EcsError> {
        self.edges
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(EcsError::Transition("edge slot is vacant"))
    }

    fn edge_mut(&mut self, id: EdgeId) -> Result<&mut Edge, EcsError> {
        self.edges
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(EcsError::Transition("edge slot is vacant"))
    }

    pub fn transition(&self, id: TransitionId) -> Result<&TransitionInfo, EcsError> {
        self.transitions
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(EcsError::Transition("transition slot is vacant"))
    }

    /// Bumps the frequency counter of a cached transition.
    pub fn note_use(&mut self, id: TransitionId) {
        if let Some(Some(info)) = self.transitions.get_mut(id.index()) {
            info.uses += 1;
        }
    }

    /// Stores a transition record and returns its arena index.
    pub fn intern(&mut self, info: TransitionInfo) -> TransitionId {
        match self.free_transitions.pop() {
            Some(index) => {
                self.transitions[index as usize] = Some(info);
                TransitionId(index)
            }
            None => {
                self.transitions.push(Some(info));
                TransitionId((self.transitions.len() - 1) as u32)
            }
        }
    }

    fn release_transition(&mut self, id: TransitionId) {
        if let Some(slot) = self.transitions.get_mut(id.index()) {
            if slot.take().is_some() {
                self.free_transitions.push(id.0);
            }
        }
    }

    /// Looks up a cached transition by its packed key.
    pub fn cached(&self, key: u128) -> Option<(ArchetypeId, TransitionId)> {
        self.cache.get(&key).copied()
    }

    /// Inserts a transition into the cache. The caller announces the
    /// insertion through the observation channel.
    pub fn cache_insert(&mut self, key: u128, destination: ArchetypeId, id: TransitionId) {
        self.cache.insert(key, (destination, id));
    }

    /// Creates the canonical add-direction edge `from` → `to` labelled
    /// with `component`, registers it on both endpoints, and splices it
    /// into the incoming list at `to`.
    pub fn connect(
        &mut self,
        archetypes: &mut Archetypes,
        from: ArchetypeId,
        to: ArchetypeId,
        component: ComponentId,
    ) -> Result<EdgeId, EcsError> {
        let (from_mask, to_mask) = {
            let (from_archetype, to_archetype) = archetypes.pair_mut(from, to)?;
            (*from_archetype.bitmask(), *to_archetype.bitmask())
        };
        debug_assert_eq!(from_mask.with(component).archetype_key(), to_mask.archetype_key());

        let transition = self.intern(TransitionInfo::between(from, &from_mask, to, &to_mask));
        let id = match self.free_edges.pop() {
            Some(index) => EdgeId(index),
            None => {
                self.edges.push(None);
                EdgeId((self.edges.len() - 1) as u32)
            }
        };

        let (from_archetype, to_archetype) = archetypes.pair_mut(from, to)?;
        let head = to_archetype.incoming;
        self.edges[id.index()] = Some(Edge {
            from,
            to,
            component,
            transition,
            prev: None,
            next: head,
        });
        if let Some(head) = head {
            self.edge_mut(head)?.prev = Some(id);
        }
        to_archetype.incoming = Some(id);
        from_archetype.add_edges.insert(component, id);
        to_archetype.remove_edges.insert(component, id);
        Ok(id)
    }

    /// Tears down every edge touching a released archetype, fixing up
    /// the surviving endpoints. Returns the number of edges removed.
    pub fn dissolve(
        &mut self,
        archetypes: &mut Archetypes,
        dead: &mut super::archetype::Archetype,
    ) -> usize {
        let mut removed = 0;

        // Edges terminating at the dead archetype: walk its incoming
        // list and detach each one from its origin's add map.
        let mut cursor = dead.incoming;
        while let Some(id) = cursor {
            let edge = match self.edges.get_mut(id.index()).and_then(Option::take) {
                Some(edge) => edge,
                None => break,
            };
            cursor = edge.next;
            if let Some(origin) = archetypes.get_mut(edge.from) {
                origin.add_edges.remove(&edge.component);
            }
            self.release_transition(edge.transition);
            self.free_edges.push(id.0);
            removed += 1;
        }

        // Edges originating at the dead archetype: each lives in some
        // neighbour's incoming list and remove map.
        for (_, id) in dead.add_edges.drain() {
            let edge = match self.edges.get_mut(id.index()).and_then(Option::take) {
                Some(edge) => edge,
                None => continue,
            };
            if let Some(neighbour) = archetypes.get_mut(edge.to) {
                neighbour.remove_edges.remove(&edge.component);
                if neighbour.incoming == Some(id) {
                    neighbour.incoming = edge.next;
                }
            }
            if let Some(prev) = edge.prev {
                if let Ok(previous) = self.edge_mut(prev) {
                    previous.next = edge.next;
                }
            }
            if let Some(next) = edge.next {
                if let Ok(following) = self.edge_mut(next) {
                    following.prev = edge.prev;
                }
            }
            self.release_transition(edge.transition);
            self.free_edges.push(id.0);
            removed += 1;
        }

        dead.clear_edges();
        removed
    }

    /// Drops cache entries whose transition touches any of the released
    /// archetypes and frees the transition records that only the cache
    /// still referenced.
    pub fn prune_cache(&mut self, dead: &[ArchetypeId]) {
        let transitions = &self.transitions;
        let mut stale: Vec<TransitionId> = Vec::new();
        self.cache.retain(|_, (destination, id)| {
            let touches_dead = dead.contains(destination)
                || transitions
                    .get(id.index())
                    .and_then(Option::as_ref)
                    .map_or(true, |info| {
                        info.source.is_some_and(|source| dead.contains(&source))
                            || dead.contains(&info.destination)
                    });
            if touches_dead {
                stale.push(*id);
            }
            !touches_dead
        });
        for id in stale {
            self.release_transition(id);
        }
    }

    /// Builds the packed key for a move between two archetypes.
    pub fn key_between(
        archetypes: &Archetypes,
        source: ArchetypeId,
        destination: ArchetypeId,
    ) -> Result<u128, EcsError> {
        let source_mask = archetypes.archetype(source)?.bitmask();
        let destination_mask = archetypes.archetype(destination)?.bitmask();
        Ok(transition_key(source_mask, destination_mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(id: u32) -> ComponentId {
        ComponentId::new(id)
    }

    fn mask(ids: &[u32]) -> Bitmask {
        let mut mask = Bitmask::empty();
        for id in ids {
            mask.set(c(*id));
        }
        mask
    }

    #[test]
    fn transition_lists_partition_the_union() {
        let info = TransitionInfo::between(
            ArchetypeId(0),
            &mask(&[1, 2, 40]),
            ArchetypeId(1),
            &mask(&[2, 3, 40]),
        );
        assert_eq!(info.shared.as_slice(), &[c(2), c(40)]);
        assert_eq!(info.added.as_slice(), &[c(3)]);
        assert_eq!(info.removed.as_slice(), &[c(1)]);
    }

    #[test]
    fn connect_registers_both_directions() {
        let mut archetypes = Archetypes::new();
        let from = archetypes.get_or_insert(mask(&[1]));
        let to = archetypes.get_or_insert(mask(&[1, 2]));

        let mut graph = EdgeGraph::new();
        let id = graph.connect(&mut archetypes, from, to, c(2)).unwrap();

        assert_eq!(archetypes.get(from).unwrap().add_edges.get(&c(2)), Some(&id));
        assert_eq!(archetypes.get(to).unwrap().remove_edges.get(&c(2)), Some(&id));
        assert_eq!(archetypes.get(to).unwrap().incoming, Some(id));

        let edge = graph.edge(id).unwrap();
        assert_eq!(edge.from, from);
        assert_eq!(edge.to, to);
        let info = graph.transition(edge.transition).unwrap();
        assert_eq!(info.added.as_slice(), &[c(2)]);
        assert!(info.removed.is_empty());
    }

    #[test]
    fn dissolve_unlinks_every_touching_edge() {
        let mut archetypes = Archetypes::new();
        let solo = archetypes.get_or_insert(mask(&[1]));
        let pair = archetypes.get_or_insert(mask(&[1, 2]));
        let triple = archetypes.get_or_insert(mask(&[1, 2, 3]));

        let mut graph = EdgeGraph::new();
        graph.connect(&mut archetypes, solo, pair, c(2)).unwrap();
        graph.connect(&mut archetypes, pair, triple, c(3)).unwrap();

        let mut dead = archetypes.release(pair).unwrap();
        let removed = graph.dissolve(&mut archetypes, &mut dead);
        assert_eq!(removed, 2);

        assert!(archetypes.get(solo).unwrap().add_edges.is_empty());
        assert!(archetypes.get(triple).unwrap().remove_edges.is_empty());
        assert_eq!(archetypes.get(triple).unwrap().incoming, None);
    }

    #[test]
    fn incoming_list_splices_at_the_head() {
        let mut archetypes = Archetypes::new();
        let a = archetypes.get_or_insert(mask(&[1]));
        let b = archetypes.get_or_insert(mask(&[2]));
        let target = archetypes.get_or_insert(mask(&[1, 2]));

        let mut graph = EdgeGraph::new();
        let first = graph.connect(&mut archetypes, a, target, c(2)).unwrap();
        let second = graph.connect(&mut archetypes, b, target, c(1)).unwrap();

        assert_eq!(archetypes.get(target).unwrap().incoming, Some(second));
        assert_eq!(graph.edge(second).unwrap().next, Some(first));
        assert_eq!(graph.edge(first).unwrap().prev, Some(second));
    }
}
