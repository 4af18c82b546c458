//! Dictionary records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a dictionary's entries are maintained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DictionaryType {
    /// Entries edited by operators.
    #[default]
    Manual,
    /// Entries refreshed by the gateway from an external provider; the
    /// refresh loop is driven by start/stop events.
    Dynamic,
}

/// A key/value dictionary distributed to gateway nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dictionary {
    pub id: String,
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "type", default)]
    pub dictionary_type: DictionaryType,

    #[serde(default)]
    pub properties: HashMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}
