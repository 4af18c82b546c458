//! The event log and latest-projection synchronization core.
//!
//! This module provides:
//! - Event records and the latest-projection derivation (`event`)
//! - Search criteria and the caller-facing query form (`criteria`)
//! - The append-only log store and the projection store (`store`)
//! - The orchestration facade tying them together (`service`)

pub mod criteria;
pub mod event;
pub mod service;
pub mod store;

pub use criteria::{EventCriteria, EventCriteriaBuilder, EventQuery};
pub use event::{
    Event, EventId, EventProperty, EventType, LatestEvent, NewEvent, NewEventBuilder,
    ReferenceType, DYNAMIC_KEY_SUFFIX,
};
pub use service::{EventService, EventView, LocalOriginResolver, OriginResolver, UserLookup};
pub use store::{EventStore, LatestProjectionStore};
