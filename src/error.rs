//! The error taxonomy shared by every public world operation.

use crate::entity::Entity;
use thiserror::Error;

/// An error type which describes why a world operation failed.
///
/// The first three variants are user errors and are reported only when
/// debug mode is on; with debug mode off the offending call becomes a
/// silent no-op instead. The remaining variants indicate an internal
/// invariant violation or resource exhaustion and always surface.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EcsError {
    /// The handle decodes to an id that was never issued, or its
    /// generation does not match the id's live generation.
    #[error("the entity handle {0} is stale or unknown")]
    InvalidEntity(Entity),

    /// The component id falls outside the supported range.
    #[error("component id {0} is outside the range 1..={max}", max = crate::bitmask::MAX_COMPONENT_ID)]
    InvalidComponent(u32),

    /// A public operation was misused, for example a query built from
    /// an empty component list.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// Row/column bookkeeping inside an archetype went out of sync.
    /// This is a bug in the library, not a user error.
    #[error("archetype storage invariant violated: {0}")]
    Archetype(&'static str),

    /// An entity move between archetypes violated an invariant.
    /// This is a bug in the library, not a user error.
    #[error("transition invariant violated: {0}")]
    Transition(&'static str),

    /// A query was composed in a way that cannot be evaluated.
    #[error("malformed query: {0}")]
    Query(&'static str),

    /// The 24-bit entity id space has been exhausted.
    #[error("the entity id space is exhausted")]
    IdSpaceExhausted,
}
