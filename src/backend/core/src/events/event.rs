//! Event records for the configuration change log.
//!
//! An [`Event`] is immutable once stored: there are no setters, and the
//! only way to obtain one is to append a [`NewEvent`] through the store.
//! A [`LatestEvent`] is the derived per-resource projection record —
//! structurally an event whose id is the resource key instead of a
//! generated id.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::payload::EventPayload;

/// Suffix appended to a dictionary id to key the projection entry of its
/// dynamic-provider lifecycle. Stable: changing it orphans existing
/// projection rows.
pub const DYNAMIC_KEY_SUFFIX: &str = "-dynamic";

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifier of an event record.
///
/// Log entries carry a generated UUID string; projection entries reuse
/// the resource key, so the id is an opaque string rather than a UUID
/// type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Event Types
// ═══════════════════════════════════════════════════════════════════════════════

/// The kind of configuration change an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    ApiDeployed,
    ApiUndeployed,
    ApiStarted,
    ApiStopped,
    ApiDebugged,
    DictionaryDeployed,
    DictionaryUndeployed,
    DictionaryStarted,
    DictionaryStopped,
    OrganizationDeployed,
}

impl EventType {
    /// The stable wire tag, as persisted and matched by search criteria.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ApiDeployed => "API_DEPLOYED",
            Self::ApiUndeployed => "API_UNDEPLOYED",
            Self::ApiStarted => "API_STARTED",
            Self::ApiStopped => "API_STOPPED",
            Self::ApiDebugged => "API_DEBUGGED",
            Self::DictionaryDeployed => "DICTIONARY_DEPLOYED",
            Self::DictionaryUndeployed => "DICTIONARY_UNDEPLOYED",
            Self::DictionaryStarted => "DICTIONARY_STARTED",
            Self::DictionaryStopped => "DICTIONARY_STOPPED",
            Self::OrganizationDeployed => "ORGANIZATION_DEPLOYED",
        }
    }

    /// Parse a stable wire tag.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "API_DEPLOYED" => Some(Self::ApiDeployed),
            "API_UNDEPLOYED" => Some(Self::ApiUndeployed),
            "API_STARTED" => Some(Self::ApiStarted),
            "API_STOPPED" => Some(Self::ApiStopped),
            "API_DEBUGGED" => Some(Self::ApiDebugged),
            "DICTIONARY_DEPLOYED" => Some(Self::DictionaryDeployed),
            "DICTIONARY_UNDEPLOYED" => Some(Self::DictionaryUndeployed),
            "DICTIONARY_STARTED" => Some(Self::DictionaryStarted),
            "DICTIONARY_STOPPED" => Some(Self::DictionaryStopped),
            "ORGANIZATION_DEPLOYED" => Some(Self::OrganizationDeployed),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Well-known Properties
// ═══════════════════════════════════════════════════════════════════════════════

/// Well-known keys of the event property map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventProperty {
    /// Id of the API the event refers to.
    ApiId,
    /// Id of the dictionary the event refers to.
    DictionaryId,
    /// Id of the organization the event refers to.
    OrganizationId,
    /// Network address of the control-plane node that produced the event.
    Origin,
    /// Id of the user who triggered the change.
    User,
    /// On projection entries: the true id of the originating log event.
    OriginatingEventId,
    /// Monotonic per-resource deployment counter, maintained by callers.
    DeploymentNumber,
}

impl EventProperty {
    /// The stable property-map key.
    pub const fn key(&self) -> &'static str {
        match self {
            Self::ApiId => "api_id",
            Self::DictionaryId => "dictionary_id",
            Self::OrganizationId => "organization_id",
            Self::Origin => "origin",
            Self::User => "user",
            Self::OriginatingEventId => "id",
            Self::DeploymentNumber => "deployment_number",
        }
    }
}

/// Reference kinds usable for bulk deletion from the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceType {
    Api,
    Dictionary,
    Organization,
}

impl ReferenceType {
    /// The property key that carries this reference on an event.
    pub const fn property_key(&self) -> &'static str {
        match self {
            Self::Api => EventProperty::ApiId.key(),
            Self::Dictionary => EventProperty::DictionaryId.key(),
            Self::Organization => EventProperty::OrganizationId.key(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Event
// ═══════════════════════════════════════════════════════════════════════════════

/// One immutable entry of the configuration change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,

    #[serde(rename = "type")]
    event_type: EventType,

    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<EventId>,

    #[serde(default)]
    properties: HashMap<String, String>,

    #[serde(default)]
    environments: HashSet<String>,

    created_at: DateTime<Utc>,

    updated_at: DateTime<Utc>,
}

impl Event {
    /// Assemble a stored event from its persisted parts. Stores are the
    /// only constructors; everything else goes through [`NewEvent`].
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: EventId,
        event_type: EventType,
        payload: Option<String>,
        parent_id: Option<EventId>,
        properties: HashMap<String, String>,
        environments: HashSet<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            event_type,
            payload,
            parent_id,
            properties,
            environments,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// The serialized snapshot, absent for pure signals.
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// Parse the payload into its typed form.
    pub fn parse_payload(&self) -> Result<Option<EventPayload>> {
        self.payload
            .as_deref()
            .map(EventPayload::from_json)
            .transpose()
    }

    pub fn parent_id(&self) -> Option<&EventId> {
        self.parent_id.as_ref()
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Look up a well-known property.
    pub fn property(&self, property: EventProperty) -> Option<&str> {
        self.properties.get(property.key()).map(String::as_str)
    }

    pub fn environments(&self) -> &HashSet<String> {
        &self.environments
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NewEvent
// ═══════════════════════════════════════════════════════════════════════════════

/// An event that has not been appended yet.
///
/// Id and timestamps are usually left unset and stamped by the store;
/// deterministic writers (tests, replication) may supply their own.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub(crate) id: Option<EventId>,
    pub(crate) event_type: EventType,
    pub(crate) payload: Option<String>,
    pub(crate) parent_id: Option<EventId>,
    pub(crate) properties: HashMap<String, String>,
    pub(crate) environments: HashSet<String>,
    pub(crate) created_at: Option<DateTime<Utc>>,
}

impl NewEvent {
    pub fn builder(event_type: EventType) -> NewEventBuilder {
        NewEventBuilder {
            inner: NewEvent {
                id: None,
                event_type,
                payload: None,
                parent_id: None,
                properties: HashMap::new(),
                environments: HashSet::new(),
                created_at: None,
            },
        }
    }
}

/// Builder for [`NewEvent`].
#[derive(Debug, Clone)]
pub struct NewEventBuilder {
    inner: NewEvent,
}

impl NewEventBuilder {
    /// Supply an explicit id instead of a store-generated one.
    pub fn id(mut self, id: EventId) -> Self {
        self.inner.id = Some(id);
        self
    }

    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.inner.payload = Some(payload.into());
        self
    }

    pub fn parent_id(mut self, parent_id: EventId) -> Self {
        self.inner.parent_id = Some(parent_id);
        self
    }

    /// Copy the caller's property map. The caller's map is never
    /// aliased or mutated; `None` means no properties.
    pub fn properties(mut self, properties: Option<&HashMap<String, String>>) -> Self {
        if let Some(properties) = properties {
            self.inner.properties.extend(
                properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        self
    }

    pub fn property(mut self, property: EventProperty, value: impl Into<String>) -> Self {
        self.inner
            .properties
            .insert(property.key().to_string(), value.into());
        self
    }

    pub fn environments(mut self, environments: impl IntoIterator<Item = String>) -> Self {
        self.inner.environments.extend(environments);
        self
    }

    /// Supply an explicit creation timestamp instead of a store-stamped
    /// one.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.inner.created_at = Some(created_at);
        self
    }

    pub fn build(self) -> NewEvent {
        self.inner
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LatestEvent
// ═══════════════════════════════════════════════════════════════════════════════

/// The per-resource projection record: the most recent relevant event,
/// re-keyed by the resource.
///
/// Constructors enforce the projection invariants: the id is the
/// resource key, and the `id` property always carries the originating
/// event's true id. Same field shape as [`Event`] at rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LatestEvent(Event);

impl LatestEvent {
    /// Derive the projection record for `key` from a stored event.
    pub fn for_resource(key: impl Into<String>, event: &Event) -> Self {
        let mut inner = event.clone();
        inner.properties.insert(
            EventProperty::OriginatingEventId.key().to_string(),
            event.id.to_string(),
        );
        inner.id = EventId::new(key);
        Self(inner)
    }

    /// Derive the projection record for the dynamic-provider lifecycle
    /// of a dictionary: keyed by the dictionary id plus
    /// [`DYNAMIC_KEY_SUFFIX`].
    pub fn for_dynamic_resource(key: &str, event: &Event) -> Self {
        Self::for_resource(format!("{}{}", key, DYNAMIC_KEY_SUFFIX), event)
    }

    /// Rehydrate a projection record read back from a repository.
    pub(crate) fn from_stored(event: Event) -> Self {
        Self(event)
    }

    /// The projection key (the wrapped record's id).
    pub fn key(&self) -> &str {
        self.0.id.as_str()
    }

    /// The true id of the originating log event.
    pub fn originating_event_id(&self) -> Option<&str> {
        self.0.property(EventProperty::OriginatingEventId)
    }

    pub fn event(&self) -> &Event {
        &self.0
    }

    pub fn into_event(self) -> Event {
        self.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn stored_event(id: &str) -> Event {
        let now = Utc::now();
        Event::from_parts(
            EventId::new(id),
            EventType::ApiDeployed,
            None,
            None,
            HashMap::from([("api_id".to_string(), "a1".to_string())]),
            HashSet::from(["env-1".to_string()]),
            now,
            now,
        )
    }

    #[test]
    fn test_event_type_wire_tags_round_trip() {
        for event_type in [
            EventType::ApiDeployed,
            EventType::DictionaryStopped,
            EventType::OrganizationDeployed,
        ] {
            assert_eq!(EventType::parse(event_type.as_str()), Some(event_type));
            let json = serde_json::to_string(&event_type).unwrap();
            assert_eq!(json, format!("\"{}\"", event_type.as_str()));
        }
        assert_eq!(EventType::parse("NOT_A_TYPE"), None);
    }

    #[test]
    fn test_builder_copies_caller_properties() {
        let mut caller_map = HashMap::from([("k".to_string(), "v".to_string())]);

        let new_event = NewEvent::builder(EventType::ApiDeployed)
            .properties(Some(&caller_map))
            .property(EventProperty::ApiId, "a1")
            .build();

        caller_map.insert("k".to_string(), "changed".to_string());
        caller_map.insert("late".to_string(), "entry".to_string());

        assert_eq!(new_event.properties.get("k"), Some(&"v".to_string()));
        assert!(!new_event.properties.contains_key("late"));
        assert_eq!(new_event.properties.get("api_id"), Some(&"a1".to_string()));
    }

    #[test]
    fn test_builder_none_properties_means_empty() {
        let new_event = NewEvent::builder(EventType::ApiUndeployed)
            .properties(None)
            .build();
        assert!(new_event.properties.is_empty());
    }

    #[test]
    fn test_latest_event_rewrites_id_and_pins_origin() {
        let event = stored_event("evt-1");
        let latest = LatestEvent::for_resource("a1", &event);

        assert_eq!(latest.key(), "a1");
        assert_eq!(latest.originating_event_id(), Some("evt-1"));
        // Everything else carries over unchanged.
        assert_eq!(latest.event().event_type(), EventType::ApiDeployed);
        assert_eq!(latest.event().property(EventProperty::ApiId), Some("a1"));
    }

    #[test]
    fn test_dynamic_latest_key_has_suffix() {
        let event = stored_event("evt-2");
        let latest = LatestEvent::for_dynamic_resource("dict-9", &event);
        assert_eq!(latest.key(), "dict-9-dynamic");
    }

    #[test]
    fn test_event_serde_shape() {
        let event = stored_event("evt-3");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["id"], "evt-3");
        assert_eq!(value["type"], "API_DEPLOYED");
        assert!(value.get("payload").is_none());

        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
