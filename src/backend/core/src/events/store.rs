//! The append-only event store and the latest-projection store.
//!
//! Both are thin semantic layers over the opaque repositories: the event
//! store owns id and timestamp assignment plus the default sort order,
//! the projection store owns the idempotent-replace contract.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::events::criteria::EventCriteria;
use crate::events::event::{Event, EventId, LatestEvent, NewEvent, ReferenceType};
use crate::pagination::{Page, Pageable, SortOrder};
use crate::repository::{EventRepository, LatestEventRepository};

// ═══════════════════════════════════════════════════════════════════════════════
// Event Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Append-only, searchable log of configuration change events.
#[derive(Clone)]
pub struct EventStore {
    repository: Arc<dyn EventRepository>,
}

impl EventStore {
    pub fn new(repository: Arc<dyn EventRepository>) -> Self {
        Self { repository }
    }

    /// Append an event to the log.
    ///
    /// A missing id is filled with a fresh random UUID string — two
    /// appends never share an id — and missing timestamps are stamped
    /// now, with `updated_at == created_at`. Caller-supplied values are
    /// kept as-is.
    #[instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn append(&self, event: NewEvent) -> Result<Event> {
        let id = event.id.unwrap_or_else(EventId::random);
        let created_at = event.created_at.unwrap_or_else(Utc::now);

        let stored = self
            .repository
            .create(Event::from_parts(
                id,
                event.event_type,
                event.payload,
                event.parent_id,
                event.properties,
                event.environments,
                created_at,
                created_at,
            ))
            .await?;

        debug!(event_id = %stored.id(), "event appended");
        Ok(stored)
    }

    /// Look up one event. Absence is not an error at this layer.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Event>> {
        self.repository.find_by_id(id).await
    }

    /// Return every matching event, unordered.
    pub async fn search(&self, criteria: &EventCriteria) -> Result<Vec<Event>> {
        Ok(self
            .repository
            .search(criteria, None, SortOrder::default())
            .await?
            .content)
    }

    /// Return one page of matching events, newest first.
    pub async fn search_page(
        &self,
        criteria: &EventCriteria,
        pageable: Pageable,
    ) -> Result<Page<Event>> {
        self.search_page_sorted(criteria, pageable, SortOrder::Descending)
            .await
    }

    /// Return one page of matching events in the given order.
    pub async fn search_page_sorted(
        &self,
        criteria: &EventCriteria,
        pageable: Pageable,
        order: SortOrder,
    ) -> Result<Page<Event>> {
        self.repository.search(criteria, Some(pageable), order).await
    }

    /// Remove one event from the log.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.repository.delete(id).await
    }

    /// Remove every event referencing the given resource, returning the
    /// removed ids.
    #[instrument(skip(self))]
    pub async fn delete_by_reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<EventId>> {
        self.repository
            .delete_by_reference(reference_type, reference_id)
            .await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Latest Projection Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-resource pointer to the most recent relevant event.
///
/// Gateway nodes read only this store; the log is for history. The
/// projection is a derived cache: rebuildable from the log, replaced
/// wholesale on every change, at most one entry per resource key.
#[derive(Clone)]
pub struct LatestProjectionStore {
    repository: Arc<dyn LatestEventRepository>,
}

impl LatestProjectionStore {
    pub fn new(repository: Arc<dyn LatestEventRepository>) -> Self {
        Self { repository }
    }

    /// Insert or replace the entry for the record's key. Idempotent:
    /// re-upserting the same record is a no-op in effect.
    #[instrument(skip(self, latest), fields(key = %latest.key()))]
    pub async fn upsert(&self, latest: LatestEvent) -> Result<LatestEvent> {
        debug!("create or update latest event");
        self.repository.create_or_update(latest).await
    }

    /// Exact-key lookup — the gateway poll path.
    pub async fn find(&self, key: &str) -> Result<Option<LatestEvent>> {
        self.repository.find_by_key(key).await
    }

    /// Remove the entry for `key`; absent keys are a no-op.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.repository.delete(key).await
    }
}
