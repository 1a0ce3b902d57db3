//! Phalanx is an archetype-based entity component store for dynamic,
//! caller-assigned component ids.
//!
//! Entities with identical component sets share an *archetype*: a
//! bucket of parallel columns, one per component, addressed by the
//! entity's row. Adding or removing a component moves the entity's row
//! to the neighbouring archetype along a cached graph edge, so repeated
//! transitions between the same two sets never recompute which columns
//! to copy. Queries filter at the archetype level only and iterate the
//! matching buckets row by row.
//!
//! The store is a passive, single-threaded data structure: it schedules
//! nothing, persists nothing, and completes every operation
//! synchronously. External collaborators observe changes through the
//! [event](event) channels.
//!
//! # Examples
//!
//! ```
//! # fn main() -> Result<(), phalanx::EcsError> {
//! use phalanx::{ComponentId, Value, World};
//!
//! const POSITION: ComponentId = ComponentId::new(1);
//! const VELOCITY: ComponentId = ComponentId::new(2);
//! const FROZEN: ComponentId = ComponentId::new(3);
//!
//! let mut world = World::new();
//!
//! let a = world.entity()?;
//! world.set(a, POSITION, 0.0)?.set(a, VELOCITY, 1.5)?;
//!
//! let b = world.entity()?;
//! world.set(b, POSITION, 10.0)?.set(b, FROZEN, true)?;
//!
//! // Moving bodies: must have a velocity, must not be frozen.
//! let view = world.query(&[POSITION, VELOCITY])?.without(&[FROZEN])?;
//! for row in view.view() {
//!     assert_eq!(row.entity(), a);
//!     assert_eq!(row.get(1), Some(&Value::Float(1.5)));
//! }
//! # Ok(())
//! # }
//! ```

pub mod bitmask;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
mod hash;
pub mod profile;
pub mod query;
pub mod storage;
mod transition;
pub mod world;

pub use bitmask::{Bitmask, ComponentId};
pub use config::{Config, WorldOptions};
pub use entity::Entity;
pub use error::EcsError;
pub use event::{CacheKind, Event, EventSender};
pub use profile::{OpStats, Profiler};
pub use query::{QueryView, Row, Rows};
pub use storage::{OpaqueValue, Value};
pub use world::World;
