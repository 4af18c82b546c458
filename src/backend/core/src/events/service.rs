//! The event service facade.
//!
//! Orchestrates snapshot assembly, log appends and projection upserts,
//! and owns the invariants tying log entries to projection entries.
//!
//! Concurrency: every operation runs synchronously within its calling
//! request; nothing is retried or queued internally. The append-then-
//! upsert sequence is not transactional, so under concurrent writers for
//! one resource the projection is last-writer-wins and only eventually
//! consistent with the log's creation-time order. Strict ordering needs
//! external per-resource serialization, which is not this core's job.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{GatesyncError, Result};
use crate::events::criteria::{EventCriteria, EventQuery};
use crate::events::event::{Event, EventProperty, EventType, LatestEvent, NewEvent};
use crate::events::store::{EventStore, LatestProjectionStore};
use crate::model::{Api, DebugApi, Dictionary, Organization, User};
use crate::pagination::{Page, Pageable};
use crate::payload::{EventPayload, PayloadAssembler};

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborators
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolves user ids found on events to user records.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn find_by_id(&self, user_id: &str) -> Result<User>;
}

/// Resolves the producing node's own network origin.
///
/// Resolution failure aborts event creation entirely (fail closed):
/// an event whose origin cannot be established is never persisted.
pub trait OriginResolver: Send + Sync {
    fn resolve(&self) -> std::io::Result<String>;
}

/// Resolves the origin from the default-route local interface address.
///
/// The connect never sends traffic; it only asks the OS which local
/// address would be used.
pub struct LocalOriginResolver;

impl OriginResolver for LocalOriginResolver {
    fn resolve(&self) -> std::io::Result<String> {
        let socket = std::net::UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect(("8.8.8.8", 80))?;
        Ok(socket.local_addr()?.ip().to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Read Model
// ═══════════════════════════════════════════════════════════════════════════════

/// An event as returned to callers: the stored record plus the resolved
/// acting user, when one is recorded on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventView {
    pub event: Event,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Facade over the event log and the latest projection.
pub struct EventService {
    events: EventStore,
    latest: LatestProjectionStore,
    assembler: PayloadAssembler,
    users: Arc<dyn UserLookup>,
    origin: Arc<dyn OriginResolver>,
}

impl EventService {
    pub fn new(
        events: EventStore,
        latest: LatestProjectionStore,
        assembler: PayloadAssembler,
        users: Arc<dyn UserLookup>,
        origin: Arc<dyn OriginResolver>,
    ) -> Self {
        Self {
            events,
            latest,
            assembler,
            users,
            origin,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookup & search
    // ─────────────────────────────────────────────────────────────────────────

    /// Find one event by id; absence is an [`EventNotFound`] error at
    /// this surface.
    ///
    /// [`EventNotFound`]: crate::error::ErrorCode::EventNotFound
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<EventView> {
        debug!("find event by id");
        let event = self
            .events
            .find_by_id(id)
            .await?
            .ok_or_else(|| GatesyncError::event_not_found(id))?;
        Ok(self.enrich(event).await)
    }

    /// Paged search, newest first.
    ///
    /// Filters are overlaid only when provided; the environment scope is
    /// applied as given.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, types, properties))]
    pub async fn search_page(
        &self,
        types: Option<&[EventType]>,
        properties: Option<&HashMap<String, String>>,
        from: Option<i64>,
        to: Option<i64>,
        pageable: Pageable,
        environments: &[String],
    ) -> Result<Page<EventView>> {
        let mut builder = EventCriteria::builder();
        if let Some(from) = from {
            builder = builder.from(from);
        }
        if let Some(to) = to {
            builder = builder.to(to);
        }
        if let Some(types) = types {
            builder = builder.types(types.iter().copied());
        }
        if let Some(properties) = properties {
            builder = builder.properties(properties);
        }
        builder = builder.environments(environments.iter().cloned());

        let page = self.events.search_page(&builder.build(), pageable).await?;

        let mut content = Vec::with_capacity(page.content.len());
        for event in page.content {
            content.push(self.enrich(event).await);
        }
        Ok(Page::new(content, page.page, page.size, page.total))
    }

    /// Unpaged search scoped to the caller's environment.
    #[instrument(skip(self, query))]
    pub async fn search(&self, query: &EventQuery, environment_id: &str) -> Result<Vec<EventView>> {
        debug!(?query, "search events");
        let criteria = query_to_criteria(query, environment_id);
        let events = self.events.search(&criteria).await?;

        let mut views = Vec::with_capacity(events.len());
        for event in events {
            views.push(self.enrich(event).await);
        }
        Ok(views)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Creation
    // ─────────────────────────────────────────────────────────────────────────

    /// Record an API change known only by id (start, stop, undeploy
    /// signals). Attaches the `api_id` property and refreshes the
    /// projection when the id is known.
    #[instrument(skip(self, properties))]
    pub async fn create_api_event(
        &self,
        environments: &HashSet<String>,
        event_type: EventType,
        api_id: Option<&str>,
        properties: Option<&HashMap<String, String>>,
    ) -> Result<EventView> {
        let mut event_properties = copied(properties);
        if let Some(api_id) = api_id {
            event_properties.insert(EventProperty::ApiId.key().to_string(), api_id.to_string());
        }

        let event = self
            .create_event(environments, event_type, None, event_properties)
            .await?;

        if let Some(api_id) = api_id {
            self.upsert_latest(LatestEvent::for_resource(api_id, &event))
                .await?;
        }
        Ok(self.enrich(event).await)
    }

    /// Record an API deployment: assemble the deployable snapshot, log
    /// it, and point the projection at it.
    ///
    /// The api id used for both the `api_id` property and the projection
    /// key is taken from the assembled snapshot, not from the caller's
    /// record, so a transformed assembly is reflected consistently.
    #[instrument(skip(self, api, properties), fields(api_id = %api.id))]
    pub async fn create_api_snapshot_event(
        &self,
        environments: &HashSet<String>,
        event_type: EventType,
        api: &Api,
        properties: Option<&HashMap<String, String>>,
    ) -> Result<EventView> {
        let mut event_properties = copied(properties);

        let snapshot = self.assembler.assemble_api(api).await?;
        let snapshot_id = snapshot.id.clone();
        event_properties.insert(EventProperty::ApiId.key().to_string(), snapshot_id.clone());

        let event = self
            .create_event(
                environments,
                event_type,
                Some(EventPayload::Api(snapshot)),
                event_properties,
            )
            .await?;

        self.upsert_latest(LatestEvent::for_resource(snapshot_id, &event))
            .await?;
        Ok(self.enrich(event).await)
    }

    /// Record a debug run. Carries the debug snapshot but no resource
    /// property, and never touches the projection.
    #[instrument(skip(self, debug_api, properties))]
    pub async fn create_debug_api_event(
        &self,
        environments: &HashSet<String>,
        event_type: EventType,
        debug_api: &DebugApi,
        properties: Option<&HashMap<String, String>>,
    ) -> Result<EventView> {
        let event = self
            .create_event(
                environments,
                event_type,
                Some(EventPayload::DebugApi(debug_api.clone())),
                copied(properties),
            )
            .await?;
        Ok(self.enrich(event).await)
    }

    /// Record a dictionary change with its full snapshot.
    #[instrument(skip(self, dictionary), fields(dictionary_id = %dictionary.id))]
    pub async fn create_dictionary_event(
        &self,
        environments: &HashSet<String>,
        event_type: EventType,
        dictionary: &Dictionary,
    ) -> Result<EventView> {
        let mut event_properties = HashMap::new();
        event_properties.insert(
            EventProperty::DictionaryId.key().to_string(),
            dictionary.id.clone(),
        );

        let event = self
            .create_event(
                environments,
                event_type,
                Some(EventPayload::Dictionary(dictionary.clone())),
                event_properties,
            )
            .await?;

        self.upsert_latest(LatestEvent::for_resource(dictionary.id.clone(), &event))
            .await?;
        Ok(self.enrich(event).await)
    }

    /// Record a start/stop signal for a dictionary's dynamic provider.
    ///
    /// Carries no payload; the projection entry lives under its own
    /// derived key (`<dictionary-id>-dynamic`) so it never collides with
    /// the dictionary's content projection.
    #[instrument(skip(self))]
    pub async fn create_dynamic_dictionary_event(
        &self,
        environments: &HashSet<String>,
        event_type: EventType,
        dictionary_id: &str,
    ) -> Result<EventView> {
        let mut event_properties = HashMap::new();
        event_properties.insert(
            EventProperty::DictionaryId.key().to_string(),
            dictionary_id.to_string(),
        );

        let event = self
            .create_event(environments, event_type, None, event_properties)
            .await?;

        self.upsert_latest(LatestEvent::for_dynamic_resource(dictionary_id, &event))
            .await?;
        Ok(self.enrich(event).await)
    }

    /// Record an organization settings change.
    #[instrument(skip(self, organization), fields(organization_id = %organization.id))]
    pub async fn create_organization_event(
        &self,
        environments: &HashSet<String>,
        event_type: EventType,
        organization: &Organization,
    ) -> Result<EventView> {
        let mut event_properties = HashMap::new();
        event_properties.insert(
            EventProperty::OrganizationId.key().to_string(),
            organization.id.clone(),
        );

        let event = self
            .create_event(
                environments,
                event_type,
                Some(EventPayload::Organization(organization.clone())),
                event_properties,
            )
            .await?;

        self.upsert_latest(LatestEvent::for_resource(organization.id.clone(), &event))
            .await?;
        Ok(self.enrich(event).await)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Deletion
    // ─────────────────────────────────────────────────────────────────────────

    /// Delete every event of an API, then its projection entry.
    ///
    /// The log pass deletes one event at a time and aborts on the first
    /// failure: earlier deletions stand, later events remain. Callers
    /// detecting a failure re-query to observe the mixed state; a
    /// re-invocation only sees the still-present events and converges.
    /// The projection delete is an independent final step — its failure
    /// does not undo the log pass.
    #[instrument(skip(self))]
    pub async fn delete_api_events(&self, environment_id: &str, api_id: &str) -> Result<()> {
        let query = EventQuery {
            api: Some(api_id.to_string()),
            ..Default::default()
        };

        for view in self.search(&query, environment_id).await? {
            debug!(event_id = %view.event.id(), "delete event");
            self.events.delete(view.event.id().as_str()).await?;
        }

        debug!("delete latest event");
        self.latest.delete(api_id).await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    /// The generic create step shared by every variant: serialize the
    /// payload, resolve the node origin (fail closed), stamp and append.
    /// Nothing is persisted unless every step succeeds.
    async fn create_event(
        &self,
        environments: &HashSet<String>,
        event_type: EventType,
        payload: Option<EventPayload>,
        properties: HashMap<String, String>,
    ) -> Result<Event> {
        let payload = payload.map(|payload| payload.to_json()).transpose()?;

        let origin = self
            .origin
            .resolve()
            .map_err(GatesyncError::origin_resolution)?;
        debug!(%origin, %event_type, "create event");

        let mut builder = NewEvent::builder(event_type)
            .properties(Some(&properties))
            .property(EventProperty::Origin, origin)
            .environments(environments.iter().cloned());
        if let Some(payload) = payload {
            builder = builder.payload(payload);
        }

        self.events.append(builder.build()).await
    }

    async fn upsert_latest(&self, latest: LatestEvent) -> Result<()> {
        self.latest.upsert(latest).await?;
        Ok(())
    }

    /// Attach the acting user, substituting the synthetic placeholder
    /// when the lookup fails — a missing user never fails a read.
    async fn enrich(&self, event: Event) -> EventView {
        let user = match event.property(EventProperty::User) {
            Some(user_id) if !user_id.is_empty() => {
                match self.users.find_by_id(user_id).await {
                    Ok(user) => Some(user),
                    Err(error) => {
                        warn!(%user_id, %error, "user lookup failed, substituting placeholder");
                        Some(User::system_placeholder(user_id))
                    }
                }
            }
            _ => None,
        };

        EventView { event, user }
    }
}

/// Translate a caller query to criteria. The caller's environment scope
/// is applied unconditionally; everything else only when provided.
fn query_to_criteria(query: &EventQuery, environment_id: &str) -> EventCriteria {
    let mut builder = EventCriteria::builder().environment(environment_id);

    if let Some(from) = query.from {
        builder = builder.from(from);
    }
    if let Some(to) = query.to {
        builder = builder.to(to);
    }
    builder = builder.types(query.types.iter().copied());
    if !query.properties.is_empty() {
        builder = builder.properties(&query.properties);
    }
    if let Some(api) = query.api.as_deref().filter(|api| !api.is_empty()) {
        builder = builder.property(EventProperty::ApiId.key(), api);
    }
    if let Some(id) = query.id.as_deref().filter(|id| !id.is_empty()) {
        builder = builder.property(EventProperty::OriginatingEventId.key(), id);
    }

    builder.build()
}

fn copied(properties: Option<&HashMap<String, String>>) -> HashMap<String, String> {
    properties.cloned().unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_translation_always_scopes_environment() {
        let criteria = query_to_criteria(&EventQuery::default(), "env-1");
        assert_eq!(criteria.environments(), ["env-1".to_string()]);
        assert!(criteria.types().is_empty());
        assert!(criteria.properties().is_empty());
        assert_eq!(criteria.from(), None);
    }

    #[test]
    fn test_query_translation_shortcuts() {
        let query = EventQuery {
            id: Some("evt-7".to_string()),
            api: Some("a1".to_string()),
            from: Some(5),
            to: Some(9),
            types: vec![EventType::ApiDeployed],
            ..Default::default()
        };

        let criteria = query_to_criteria(&query, "env-1");
        assert_eq!(
            criteria.properties().get("api_id"),
            Some(&"a1".to_string())
        );
        assert_eq!(criteria.properties().get("id"), Some(&"evt-7".to_string()));
        assert_eq!(criteria.from(), Some(5));
        assert_eq!(criteria.to(), Some(9));
        assert_eq!(criteria.types(), [EventType::ApiDeployed]);
    }

    #[test]
    fn test_query_translation_ignores_blank_shortcuts() {
        let query = EventQuery {
            id: Some(String::new()),
            api: Some(String::new()),
            ..Default::default()
        };

        let criteria = query_to_criteria(&query, "env-1");
        assert!(criteria.properties().is_empty());
    }
}
