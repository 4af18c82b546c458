//! Opaque keyed document repositories backing the log and the
//! projection.
//!
//! The core only ever talks to these traits; which backend sits behind
//! them is a deployment decision. Three implementations ship:
//! - [`memory`]: in-process, for tests and embedded single-node use
//! - [`postgres`]: relational, via sqlx
//! - [`mongo`]: document store, behind the `mongodb` cargo feature

pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::events::criteria::EventCriteria;
use crate::events::event::{Event, EventId, LatestEvent, ReferenceType};
use crate::pagination::{Page, Pageable, SortOrder};

pub use memory::{InMemoryEventRepository, InMemoryLatestEventRepository};
#[cfg(feature = "mongodb")]
pub use mongo::{MongoEventRepository, MongoLatestEventRepository};
pub use postgres::{PostgresEventRepository, PostgresLatestEventRepository};

/// Keyed CRUD over the append-only log's documents.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Persist a fully-formed event. Fails if the id already exists —
    /// the log never overwrites.
    async fn create(&self, event: Event) -> Result<Event>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Event>>;

    /// Search the log. Without `pageable` the whole match set is
    /// returned as a single page.
    async fn search(
        &self,
        criteria: &EventCriteria,
        pageable: Option<Pageable>,
        order: SortOrder,
    ) -> Result<Page<Event>>;

    /// Remove one event. Removing an unknown id is a no-op.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Remove every event carrying the given resource reference,
    /// returning the ids that were removed.
    async fn delete_by_reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<EventId>>;
}

/// Keyed CRUD over the latest-projection documents. No search: lookups
/// are always by exact key.
#[async_trait]
pub trait LatestEventRepository: Send + Sync {
    /// Insert or replace the entry for the record's key. Replacement is
    /// wholesale, never a field-by-field merge.
    async fn create_or_update(&self, latest: LatestEvent) -> Result<LatestEvent>;

    async fn find_by_key(&self, key: &str) -> Result<Option<LatestEvent>>;

    /// Remove the entry for `key`. Removing an unknown key is a no-op.
    async fn delete(&self, key: &str) -> Result<()>;
}
