//! Entity handles and the generational id allocator.

use crate::error::EcsError;
use std::fmt;

/// Number of bits holding the dense numeric id.
const ID_BITS: u32 = 24;

/// Mask extracting the dense numeric id from a packed handle.
const ID_MASK: u32 = (1 << ID_BITS) - 1;

/// The highest generation value before the counter wraps to zero.
pub const MAX_GENERATION: u8 = u8::MAX;

/// An opaque handle for an entity.
///
/// The low 24 bits hold a dense numeric id; the high 8 bits hold a
/// generation counter. The generation is bumped each time the id is
/// despawned, so handles held across a despawn fail validation instead
/// of silently addressing the id's next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Entity(u32);

impl Entity {
    pub(crate) fn pack(id: u32, generation: u8) -> Self {
        Entity((generation as u32) << ID_BITS | id)
    }

    /// Returns the dense numeric id.
    pub fn id(self) -> u32 {
        self.0 & ID_MASK
    }

    /// Returns the handle's generation.
    pub fn generation(self) -> u8 {
        (self.0 >> ID_BITS) as u8
    }

    /// Returns the packed representation.
    pub fn to_bits(self) -> u32 {
        self.0
    }

    /// Reconstructs a handle from its packed representation.
    pub fn from_bits(bits: u32) -> Self {
        Entity(bits)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}v{}", self.id(), self.generation())
    }
}

/// Issues and recycles entity ids.
///
/// Ids below the high-water mark are reused from a free list; fresh ids
/// allocate sequentially. A recycled id keeps the generation it was
/// given when it was despawned, so the reissued handle is exactly one
/// generation ahead of the stale one.
///
/// The generation counter wraps after 256 recycles of the same id, so a
/// handle held across that many despawn/respawn cycles of its id can
/// alias the live occupant. Widening the handle would change the packed
/// format; callers that hold handles that long should subscribe to
/// world events instead.
#[derive(Debug, Default)]
pub struct Allocator {
    generations: Vec<u8>,
    free: Vec<u32>,
    next: u32,
}

impl Allocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a handle, reusing the free list's tail before touching
    /// fresh id space.
    pub fn allocate(&mut self) -> Result<Entity, EcsError> {
        if let Some(id) = self.free.pop() {
            return Ok(Entity::pack(id, self.generations[id as usize]));
        }
        if self.next > ID_MASK {
            return Err(EcsError::IdSpaceExhausted);
        }
        let id = self.next;
        self.next += 1;
        self.generations.push(0);
        Ok(Entity::pack(id, 0))
    }

    /// Returns the id to the free list and bumps its generation so the
    /// old handle goes stale.
    pub fn deallocate(&mut self, id: u32) {
        let generation = &mut self.generations[id as usize];
        *generation = generation.wrapping_add(1);
        self.free.push(id);
    }

    /// Extracts the dense id from a handle, failing when the id was
    /// never issued or the generation does not match.
    pub fn validate(&self, entity: Entity) -> Result<u32, EcsError> {
        let id = entity.id();
        match self.generations.get(id as usize) {
            Some(generation) if *generation == entity.generation() => Ok(id),
            _ => Err(EcsError::InvalidEntity(entity)),
        }
    }

    /// Returns `true` if the handle addresses a live entity.
    pub fn contains(&self, entity: Entity) -> bool {
        self.validate(entity).is_ok()
    }

    /// Returns the live generation for an id, or `None` when the id was
    /// never issued.
    pub fn live_generation(&self, id: u32) -> Option<u8> {
        self.generations.get(id as usize).copied()
    }

    /// Number of ids ever issued.
    pub fn high_water(&self) -> u32 {
        self.next
    }

    /// Number of live ids.
    pub fn live(&self) -> usize {
        self.next as usize - self.free.len()
    }

    /// Returns `true` when no fresh id can ever be issued again.
    pub fn exhausted(&self) -> bool {
        self.next > ID_MASK && self.free.is_empty()
    }
}
