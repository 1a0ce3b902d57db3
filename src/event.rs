//! Observation channels fanning out structural changes to external
//! collaborators.
//!
//! Firings are fire-and-forget with no back-pressure: a full or
//! disconnected sender never stalls the mutation that triggered the
//! event. Events are emitted strictly after the mutation completes, so
//! an observer never sees a half-applied move.

use crate::bitmask::ComponentId;
use crate::entity::Entity;
use crate::storage::archetype::ArchetypeId;
use crate::storage::Value;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;

/// Which cache accepted a new entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Transition,
    Query,
}

/// Events emitted by a world to subscribers. See `World::subscribe`.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A value was written by a `set` call, whether in place or as part
    /// of a move.
    Set(Entity, ComponentId, Value),
    /// An entity moved between archetypes. `None` stands for the
    /// unassigned state on either side.
    Transition(Entity, Option<ArchetypeId>, Option<ArchetypeId>),
    /// A transition or query cache accepted a new entry under the given
    /// packed key.
    Cached(CacheKind, u128),
    /// A cleanup pass completed.
    Cleanup,
}

/// Describes a type which can receive world events.
pub trait EventSender: Send + Sync {
    /// Delivers the event to the listener. Returns `true` if the sender
    /// is still alive.
    fn send(&self, event: Event) -> bool;
}

impl EventSender for crossbeam_channel::Sender<Event> {
    fn send(&self, event: Event) -> bool {
        !matches!(
            self.try_send(event),
            Err(crossbeam_channel::TrySendError::Disconnected(_))
        )
    }
}

/// The world's subscriber list.
///
/// Senders that report themselves dead are dropped during the firing
/// that discovered them.
#[derive(Default)]
pub(crate) struct Subscribers {
    senders: Mutex<Vec<Arc<dyn EventSender>>>,
}

impl Subscribers {
    pub fn push(&self, sender: Arc<dyn EventSender>) {
        self.senders.lock().push(sender);
    }

    pub fn is_empty(&self) -> bool {
        self.senders.lock().is_empty()
    }

    pub fn send(&self, event: Event) {
        let mut senders = self.senders.lock();
        for index in (0..senders.len()).rev() {
            if !senders[index].send(event.clone()) {
                senders.swap_remove(index);
            }
        }
    }
}

impl Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.senders.lock().len())
            .finish()
    }
}
