//! API records and the two deployable definition generations.
//!
//! The control plane stores an API's management definition without plans
//! or flows; those live in their own collections and are merged in when a
//! deployable snapshot is assembled. Two incompatible definition schemas
//! coexist in the fleet, selected by [`DefinitionVersion`]; a snapshot is
//! always rendered entirely in one generation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ═══════════════════════════════════════════════════════════════════════════════
// API Record
// ═══════════════════════════════════════════════════════════════════════════════

/// Which definition schema generation an API is authored in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefinitionVersion {
    #[serde(rename = "2.0.0")]
    #[default]
    V2,
    #[serde(rename = "4.0.0")]
    V4,
}

/// An API as stored by the control plane.
///
/// `definition` holds the management definition JSON, which carries no
/// plans or flows; the assembled snapshot embedded in a deploy event
/// replaces it with the full gateway definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Api {
    pub id: String,
    pub name: String,
    pub version: String,

    #[serde(default)]
    pub definition_version: DefinitionVersion,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<DateTime<Utc>>,

    /// Fields of the record this core does not interpret.
    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

impl Api {
    /// Parse the stored definition into its typed, generation-correct
    /// form. The generation is decided by `definition_version`, never by
    /// sniffing fields.
    pub fn parse_definition(&self) -> Result<Option<ApiDefinition>> {
        let Some(raw) = self.definition.as_deref() else {
            return Ok(None);
        };
        let definition = match self.definition_version {
            DefinitionVersion::V2 => ApiDefinition::V2(serde_json::from_str(raw)?),
            DefinitionVersion::V4 => ApiDefinition::V4(serde_json::from_str(raw)?),
        };
        Ok(Some(definition))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Plans
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle status shared by both plan generations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    #[default]
    Staging,
    Published,
    Deprecated,
    Closed,
}

/// A plan in the v2 definition schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanV2 {
    pub id: String,
    pub name: String,
    pub security: String,

    #[serde(default)]
    pub status: PlanStatus,

    #[serde(default)]
    pub order: i32,

    /// Path-keyed policy chains.
    #[serde(default)]
    pub paths: HashMap<String, Value>,

    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

/// A plan in the v4 definition schema. Flows are attached to the plan
/// itself rather than keyed by path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanV4 {
    pub id: String,
    pub name: String,
    pub security: String,

    #[serde(default)]
    pub status: PlanStatus,

    #[serde(default)]
    pub flows: Vec<FlowV4>,

    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Flows
// ═══════════════════════════════════════════════════════════════════════════════

/// An ordered processing flow in the v2 schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowV2 {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

/// An ordered processing flow in the v4 schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowV4 {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

// ═══════════════════════════════════════════════════════════════════════════════
// Definitions
// ═══════════════════════════════════════════════════════════════════════════════

/// The v2 gateway definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionV2 {
    pub id: String,
    pub name: String,
    pub version: String,

    #[serde(default)]
    pub plans: Vec<PlanV2>,

    #[serde(default)]
    pub flows: Vec<FlowV2>,

    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

/// The v4 gateway definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionV4 {
    pub id: String,
    pub name: String,

    #[serde(rename = "apiVersion")]
    pub api_version: String,

    #[serde(default)]
    pub plans: Vec<PlanV4>,

    #[serde(default)]
    pub flows: Vec<FlowV4>,

    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

/// A parsed definition of either generation.
///
/// The two schemas are never mixed in one value; which variant applies
/// is decided by the owning [`Api::definition_version`], not by sniffing
/// fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiDefinition {
    V2(DefinitionV2),
    V4(DefinitionV4),
}

impl ApiDefinition {
    /// The id carried inside the definition.
    pub fn id(&self) -> &str {
        match self {
            Self::V2(definition) => &definition.id,
            Self::V4(definition) => &definition.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_version_wire_tags() {
        assert_eq!(
            serde_json::to_string(&DefinitionVersion::V2).unwrap(),
            "\"2.0.0\""
        );
        assert_eq!(
            serde_json::to_string(&DefinitionVersion::V4).unwrap(),
            "\"4.0.0\""
        );
    }

    #[test]
    fn test_unknown_definition_fields_survive_round_trip() {
        let raw = r#"{
            "id": "api-1",
            "name": "echo",
            "version": "1.0",
            "proxy": {"virtual_hosts": [{"path": "/echo"}]}
        }"#;

        let definition: DefinitionV2 = serde_json::from_str(raw).unwrap();
        assert!(definition.extras.contains_key("proxy"));
        assert!(definition.plans.is_empty());

        let rendered = serde_json::to_value(&definition).unwrap();
        assert_eq!(rendered["proxy"]["virtual_hosts"][0]["path"], "/echo");
    }

    #[test]
    fn test_plan_status_wire_tags() {
        assert_eq!(
            serde_json::to_string(&PlanStatus::Closed).unwrap(),
            "\"CLOSED\""
        );
    }

    #[test]
    fn test_parse_definition_follows_the_version_tag() {
        let api = Api {
            id: "api-1".to_string(),
            name: "echo".to_string(),
            version: "1.0".to_string(),
            definition_version: DefinitionVersion::V2,
            definition: Some(r#"{"id":"api-1","name":"echo","version":"1.0"}"#.to_string()),
            deployed_at: None,
            extras: Default::default(),
        };

        match api.parse_definition().unwrap() {
            Some(ApiDefinition::V2(definition)) => assert_eq!(definition.id, "api-1"),
            other => panic!("expected a v2 definition, got {:?}", other),
        }

        let undefined = Api {
            definition: None,
            ..api
        };
        assert!(undefined.parse_definition().unwrap().is_none());
    }
}
