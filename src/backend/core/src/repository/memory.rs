//! In-process repositories.
//!
//! Back the stores for tests and for embedded single-node deployments
//! where the control plane keeps its log in memory.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{GatesyncError, Result};
use crate::events::criteria::EventCriteria;
use crate::events::event::{Event, EventId, LatestEvent, ReferenceType};
use crate::pagination::{Page, Pageable, SortOrder};
use crate::repository::{EventRepository, LatestEventRepository};

// ═══════════════════════════════════════════════════════════════════════════════
// Event Log
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory event log repository.
#[derive(Default)]
pub struct InMemoryEventRepository {
    events: RwLock<HashMap<String, Event>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events, across all resources.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn create(&self, event: Event) -> Result<Event> {
        let mut events = self.events.write();
        let id = event.id().as_str().to_string();
        if events.contains_key(&id) {
            return Err(GatesyncError::storage(format!(
                "event {} already exists",
                id
            )));
        }
        events.insert(id, event.clone());
        Ok(event)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Event>> {
        Ok(self.events.read().get(id).cloned())
    }

    async fn search(
        &self,
        criteria: &EventCriteria,
        pageable: Option<Pageable>,
        order: SortOrder,
    ) -> Result<Page<Event>> {
        let mut matches: Vec<Event> = self
            .events
            .read()
            .values()
            .filter(|event| criteria.matches(event))
            .cloned()
            .collect();

        // Tie-break on id so paging over same-instant events is stable.
        matches.sort_by(|a, b| {
            let by_time = a.created_at().cmp(&b.created_at());
            let forward = by_time.then_with(|| a.id().as_str().cmp(b.id().as_str()));
            match order {
                SortOrder::Ascending => forward,
                SortOrder::Descending => forward.reverse(),
            }
        });

        let total = matches.len() as u64;
        match pageable {
            Some(pageable) => {
                let content = pageable.paginate_iter(matches.into_iter());
                Ok(Page::new(content, pageable.page, pageable.size, total))
            }
            None => Ok(Page::new(matches, 1, total.max(1), total)),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.events.write().remove(id);
        Ok(())
    }

    async fn delete_by_reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<EventId>> {
        let mut events = self.events.write();
        let removed: Vec<EventId> = events
            .values()
            .filter(|event| {
                event.properties().get(reference_type.property_key())
                    == Some(&reference_id.to_string())
            })
            .map(|event| event.id().clone())
            .collect();

        for id in &removed {
            events.remove(id.as_str());
        }
        Ok(removed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Latest Projection
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory latest-projection repository.
#[derive(Default)]
pub struct InMemoryLatestEventRepository {
    entries: RwLock<HashMap<String, LatestEvent>>,
}

impl InMemoryLatestEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of projection entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl LatestEventRepository for InMemoryLatestEventRepository {
    async fn create_or_update(&self, latest: LatestEvent) -> Result<LatestEvent> {
        self.entries
            .write()
            .insert(latest.key().to_string(), latest.clone());
        Ok(latest)
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<LatestEvent>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::{EventType, NewEvent};
    use crate::events::store::EventStore;
    use std::sync::Arc;

    fn store_with_repo() -> (EventStore, Arc<InMemoryEventRepository>) {
        let repository = Arc::new(InMemoryEventRepository::new());
        (EventStore::new(repository.clone()), repository)
    }

    #[tokio::test]
    async fn test_append_assigns_distinct_ids_and_equal_timestamps() {
        let (store, _) = store_with_repo();

        let first = store
            .append(NewEvent::builder(EventType::ApiDeployed).build())
            .await
            .unwrap();
        let second = store
            .append(NewEvent::builder(EventType::ApiDeployed).build())
            .await
            .unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(first.created_at(), first.updated_at());
    }

    #[tokio::test]
    async fn test_create_refuses_duplicate_id() {
        let (store, _) = store_with_repo();
        let new = |id: &str| {
            NewEvent::builder(EventType::ApiDeployed)
                .id(crate::events::event::EventId::new(id))
                .build()
        };

        store.append(new("evt-dup")).await.unwrap();
        let error = store.append(new("evt-dup")).await.unwrap_err();
        assert_eq!(error.code(), crate::error::ErrorCode::StorageError);
    }

    #[tokio::test]
    async fn test_unpaged_search_returns_all_matches() {
        let (store, repository) = store_with_repo();
        for _ in 0..3 {
            store
                .append(NewEvent::builder(EventType::ApiDeployed).build())
                .await
                .unwrap();
        }

        let page = repository
            .search(&EventCriteria::builder().build(), None, SortOrder::default())
            .await
            .unwrap();
        assert_eq!(page.content.len(), 3);
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_latest_upsert_replaces_wholesale() {
        let repository = InMemoryLatestEventRepository::new();
        let (store, _) = store_with_repo();

        let first = store
            .append(NewEvent::builder(EventType::ApiDeployed).build())
            .await
            .unwrap();
        let second = store
            .append(NewEvent::builder(EventType::ApiStopped).build())
            .await
            .unwrap();

        repository
            .create_or_update(LatestEvent::for_resource("a1", &first))
            .await
            .unwrap();
        repository
            .create_or_update(LatestEvent::for_resource("a1", &second))
            .await
            .unwrap();

        assert_eq!(repository.len(), 1);
        let entry = repository.find_by_key("a1").await.unwrap().unwrap();
        assert_eq!(entry.event().event_type(), EventType::ApiStopped);
        assert_eq!(
            entry.originating_event_id(),
            Some(second.id().as_str())
        );
    }

    #[tokio::test]
    async fn test_latest_delete_is_noop_when_absent() {
        let repository = InMemoryLatestEventRepository::new();
        repository.delete("missing").await.unwrap();
        assert!(repository.is_empty());
    }
}
