//! Event payload schemas and snapshot assembly.

pub mod assembler;

use serde::{Deserialize, Serialize};

use crate::model::{Api, DebugApi, Dictionary, Organization};

pub use assembler::{FlowSource, PayloadAssembler, PlanSource};

/// The payload carried by an event, as a tagged union over the known
/// snapshot schemas.
///
/// Events are persisted with the payload already serialized; parsing it
/// back through this enum gives readers typed access without matching on
/// type strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Api(Api),
    Dictionary(Dictionary),
    Organization(Organization),
    DebugApi(DebugApi),
}

impl EventPayload {
    /// Serialize to the canonical JSON form stored on an event.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the canonical JSON form stored on an event.
    pub fn from_json(raw: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Organization;

    #[test]
    fn test_payload_round_trip_keeps_kind_tag() {
        let payload = EventPayload::Organization(Organization {
            id: "org-1".to_string(),
            name: "default".to_string(),
            description: None,
            hrids: vec!["default".to_string()],
        });

        let raw = payload.to_json().unwrap();
        assert!(raw.contains("\"kind\":\"organization\""));

        let parsed = EventPayload::from_json(&raw).unwrap();
        assert_eq!(parsed, payload);
    }
}
