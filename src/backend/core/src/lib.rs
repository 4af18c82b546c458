//! # gatesync core
//!
//! Synchronization core of the gatesync control plane: distributes
//! configuration changes (API definitions, dictionaries, organization
//! settings) to a fleet of independently-polling gateway nodes.
//!
//! ## Architecture
//!
//! - **Event log**: append-only, searchable record of every
//!   configuration change
//! - **Latest projection**: per-resource pointer to the most recent
//!   relevant event, what gateway nodes actually poll
//! - **Payload assembly**: version-correct deployable snapshots built
//!   from live plans and flows
//! - **Key escaping**: reversible property-key transformation for
//!   backends with restricted document keys
//! - **Repositories**: pluggable in-memory, PostgreSQL and MongoDB
//!   backends behind opaque keyed CRUD traits
//!
//! The transport to gateway nodes is out of scope: nodes pull the
//! projection themselves; this crate only keeps the log and the
//! projection correct.

pub mod config;
pub mod error;
pub mod events;
pub mod metadata;
pub mod model;
pub mod pagination;
pub mod payload;
pub mod repository;
pub mod telemetry;

pub use error::{ErrorCode, GatesyncError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{ErrorCode, GatesyncError, Result};
    pub use crate::events::{
        Event, EventCriteria, EventId, EventProperty, EventQuery, EventService, EventStore,
        EventType, EventView, LatestEvent, LatestProjectionStore, LocalOriginResolver, NewEvent,
        OriginResolver, ReferenceType, UserLookup,
    };
    pub use crate::model::{Api, DebugApi, DefinitionVersion, Dictionary, Organization, User};
    pub use crate::pagination::{Page, Pageable, SortOrder};
    pub use crate::payload::{EventPayload, FlowSource, PayloadAssembler, PlanSource};
    pub use crate::repository::{
        EventRepository, InMemoryEventRepository, InMemoryLatestEventRepository,
        LatestEventRepository, PostgresEventRepository, PostgresLatestEventRepository,
    };
}
