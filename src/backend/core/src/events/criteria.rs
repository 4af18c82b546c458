//! Search criteria for the event log.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::events::event::{Event, EventType};

// ═══════════════════════════════════════════════════════════════════════════════
// Criteria
// ═══════════════════════════════════════════════════════════════════════════════

/// Filter predicate for log searches.
///
/// Semantics:
/// - the time window is half-open, `[from, to)`, in epoch milliseconds,
///   unbounded on any missing side;
/// - `types` are OR-matched;
/// - `properties` are AND-matched exact equalities;
/// - `environments` is a membership test: an event matches when its
///   environment set intersects the scoping set. An empty scoping set
///   applies no environment constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventCriteria {
    from: Option<i64>,
    to: Option<i64>,
    types: Vec<EventType>,
    properties: HashMap<String, String>,
    environments: Vec<String>,
}

impl EventCriteria {
    pub fn builder() -> EventCriteriaBuilder {
        EventCriteriaBuilder::default()
    }

    pub fn from(&self) -> Option<i64> {
        self.from
    }

    pub fn to(&self) -> Option<i64> {
        self.to
    }

    pub fn types(&self) -> &[EventType] {
        &self.types
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    pub fn environments(&self) -> &[String] {
        &self.environments
    }

    /// Reference matching semantics, used by the in-memory repository.
    /// Backend repositories translate the same predicate to their native
    /// query language.
    pub fn matches(&self, event: &Event) -> bool {
        let created = event.created_at().timestamp_millis();
        if let Some(from) = self.from {
            if created < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if created >= to {
                return false;
            }
        }

        if !self.types.is_empty() && !self.types.contains(&event.event_type()) {
            return false;
        }

        for (key, value) in &self.properties {
            if event.properties().get(key) != Some(value) {
                return false;
            }
        }

        if !self.environments.is_empty()
            && !self
                .environments
                .iter()
                .any(|environment| event.environments().contains(environment))
        {
            return false;
        }

        true
    }
}

/// Builder for [`EventCriteria`].
#[derive(Debug, Clone, Default)]
pub struct EventCriteriaBuilder {
    inner: EventCriteria,
}

impl EventCriteriaBuilder {
    /// Inclusive lower bound, epoch milliseconds.
    pub fn from(mut self, from: i64) -> Self {
        self.inner.from = Some(from);
        self
    }

    /// Exclusive upper bound, epoch milliseconds.
    pub fn to(mut self, to: i64) -> Self {
        self.inner.to = Some(to);
        self
    }

    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.inner.types.push(event_type);
        self
    }

    pub fn types(mut self, types: impl IntoIterator<Item = EventType>) -> Self {
        self.inner.types.extend(types);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.properties.insert(key.into(), value.into());
        self
    }

    pub fn properties(mut self, properties: &HashMap<String, String>) -> Self {
        self.inner.properties.extend(
            properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.inner.environments.push(environment.into());
        self
    }

    pub fn environments(mut self, environments: impl IntoIterator<Item = String>) -> Self {
        self.inner.environments.extend(environments);
        self
    }

    pub fn build(self) -> EventCriteria {
        self.inner
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Query
// ═══════════════════════════════════════════════════════════════════════════════

/// Caller-facing search form, translated to [`EventCriteria`] by the
/// facade (which adds the caller's environment scope unconditionally).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    /// Exact-id shortcut (matches the `id` property).
    pub id: Option<String>,
    /// API shortcut (matches the `api_id` property).
    pub api: Option<String>,
    pub types: Vec<EventType>,
    pub properties: HashMap<String, String>,
    /// Inclusive lower bound, epoch milliseconds.
    pub from: Option<i64>,
    /// Exclusive upper bound, epoch milliseconds.
    pub to: Option<i64>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::{EventId, EventProperty};
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn event_at(millis: i64) -> Event {
        let at = chrono::Utc.timestamp_millis_opt(millis).unwrap();
        Event::from_parts(
            EventId::new("evt"),
            EventType::ApiDeployed,
            None,
            None,
            HashMap::from([
                (EventProperty::ApiId.key().to_string(), "a1".to_string()),
                (EventProperty::Origin.key().to_string(), "10.0.0.1".to_string()),
            ]),
            HashSet::from(["env-1".to_string()]),
            at,
            at,
        )
    }

    #[test]
    fn test_time_window_is_half_open() {
        let criteria = EventCriteria::builder().from(1_000).to(2_000).build();

        assert!(!criteria.matches(&event_at(999)));
        assert!(criteria.matches(&event_at(1_000)));
        assert!(criteria.matches(&event_at(1_999)));
        assert!(!criteria.matches(&event_at(2_000)));
    }

    #[test]
    fn test_missing_bounds_are_unbounded() {
        let only_from = EventCriteria::builder().from(1_000).build();
        assert!(only_from.matches(&event_at(i64::MAX / 2)));

        let only_to = EventCriteria::builder().to(1_000).build();
        assert!(only_to.matches(&event_at(0)));
    }

    #[test]
    fn test_types_match_by_or() {
        let criteria = EventCriteria::builder()
            .event_type(EventType::ApiUndeployed)
            .event_type(EventType::ApiDeployed)
            .build();
        assert!(criteria.matches(&event_at(0)));

        let other = EventCriteria::builder()
            .event_type(EventType::DictionaryDeployed)
            .build();
        assert!(!other.matches(&event_at(0)));
    }

    #[test]
    fn test_properties_match_by_and() {
        let both = EventCriteria::builder()
            .property("api_id", "a1")
            .property("origin", "10.0.0.1")
            .build();
        assert!(both.matches(&event_at(0)));

        let one_wrong = EventCriteria::builder()
            .property("api_id", "a1")
            .property("origin", "10.0.0.2")
            .build();
        assert!(!one_wrong.matches(&event_at(0)));
    }

    #[test]
    fn test_environments_match_by_intersection() {
        let overlapping = EventCriteria::builder()
            .environment("env-1")
            .environment("env-2")
            .build();
        assert!(overlapping.matches(&event_at(0)));

        let disjoint = EventCriteria::builder().environment("env-3").build();
        assert!(!disjoint.matches(&event_at(0)));

        let unconstrained = EventCriteria::builder().build();
        assert!(unconstrained.matches(&event_at(0)));
    }
}
