//! Moves entities between archetypes.
//!
//! A move is the only operation that touches two archetypes at once: it
//! appends a row at the destination, copies every shared column value
//! across, swap-and-pops the source row, and writes the newly added
//! value. Observers see the whole sequence as one step; the world emits
//! its transition event only after the move returns.

use crate::bitmask::ComponentId;
use crate::entity::Entity;
use crate::error::EcsError;
use crate::storage::archetype::Archetype;
use crate::storage::edge::TransitionInfo;
use crate::storage::index::{Archetypes, LocationMap};
use crate::storage::Value;
use smallvec::SmallVec;
use tracing::trace;

/// Size of the staging buffer used by the batched column move.
const SCRATCH_CAPACITY: usize = 16;

/// Shared-component count above which the batched move is considered.
const BATCH_THRESHOLD: usize = 3;

/// Moves an entity along a transition, copying shared columns and
/// writing the newly added value, if any.
///
/// Shared columns are visited in the ascending order recorded by the
/// transition, so the batched and generic paths produce identical
/// layouts. With no source archetype (the entity's first component)
/// only the destination side runs.
pub(crate) fn move_entity(
    archetypes: &mut Archetypes,
    locations: &mut LocationMap,
    entity: Entity,
    transition: &TransitionInfo,
    new_value: Option<(ComponentId, Value)>,
) -> Result<(), EcsError> {
    let destination = transition.destination;

    let source = match transition.source {
        None => {
            archetypes.archetype_mut(destination)?.append(entity, new_value);
            locations.set(entity, destination);
            return Ok(());
        }
        Some(source) if source == destination => {
            return Err(EcsError::Transition("source and destination coincide"));
        }
        Some(source) => source,
    };

    let (src, dst) = archetypes.pair_mut(source, destination)?;
    let from_row = src
        .row_of(entity)
        .ok_or(EcsError::Transition("moved entity has no source row"))?;
    let last = src.len() - 1;
    let needs_backfill = from_row < last;
    let to_row = dst.push_row(entity);

    if batched_move_applies(src, transition, from_row) {
        move_shared_batched(src, dst, transition, from_row, to_row, last, needs_backfill);
    } else {
        move_shared(src, dst, transition, from_row, to_row, last, needs_backfill);
    }

    // Values of removed components are discarded, but their columns
    // still need the swap-and-pop to stay row coherent.
    for component in &transition.removed {
        src.take_cell(*component, from_row);
        if needs_backfill {
            let backfill = src.take_cell(*component, last);
            src.put_cell(*component, from_row, backfill);
        }
    }

    src.finish_remove_row(entity)?;

    if let Some((component, value)) = new_value {
        debug_assert!(transition.added.contains(&component));
        dst.put_cell(component, to_row, value);
    }

    locations.set(entity, destination);
    trace!(entity = %entity, from = source.0, to = destination.0, "moved entity");
    Ok(())
}

/// The batched path applies when enough columns are shared and the
/// first shared value is a machine number, which makes a run of
/// homogeneous small moves likely.
fn batched_move_applies(src: &Archetype, transition: &TransitionInfo, from_row: usize) -> bool {
    transition.shared.len() > BATCH_THRESHOLD
        && transition
            .shared
            .first()
            .and_then(|component| src.cell(*component, from_row))
            .is_some_and(Value::is_numeric)
}

fn move_shared(
    src: &mut Archetype,
    dst: &mut Archetype,
    transition: &TransitionInfo,
    from_row: usize,
    to_row: usize,
    last: usize,
    needs_backfill: bool,
) {
    for component in &transition.shared {
        let value = src.take_cell(*component, from_row);
        dst.put_cell(*component, to_row, value);
        if needs_backfill {
            let backfill = src.take_cell(*component, last);
            src.put_cell(*component, from_row, backfill);
        }
    }
}

/// Stages the moved row through a fixed-size scratch buffer, writing
/// destination cells a chunk at a time. Must stay behaviorally
/// indistinguishable from [move_shared].
fn move_shared_batched(
    src: &mut Archetype,
    dst: &mut Archetype,
    transition: &TransitionInfo,
    from_row: usize,
    to_row: usize,
    last: usize,
    needs_backfill: bool,
) {
    let mut scratch: SmallVec<[Value; SCRATCH_CAPACITY]> = SmallVec::new();
    for chunk in transition.shared.chunks(SCRATCH_CAPACITY) {
        scratch.clear();
        for component in chunk {
            scratch.push(src.take_cell(*component, from_row));
            if needs_backfill {
                let backfill = src.take_cell(*component, last);
                src.put_cell(*component, from_row, backfill);
            }
        }
        for (component, value) in chunk.iter().zip(scratch.drain(..)) {
            dst.put_cell(*component, to_row, value);
        }
    }
}
