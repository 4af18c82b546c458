//! Organization records.

use serde::{Deserialize, Serialize};

/// Organization-level settings distributed to gateway nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Human-readable ids, addressable alternatives to `id`.
    #[serde(default)]
    pub hrids: Vec<String>,
}
