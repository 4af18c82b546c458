//! Debug-run records.
//!
//! A debug run ships an API definition plus a canned request to a single
//! gateway, which executes it and reports the observed response through a
//! follow-up event. Debug runs never touch the latest projection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The request a gateway replays during a debug run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugRequest {
    pub path: String,
    pub method: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// The response observed by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugResponse {
    pub status: u16,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// A debug-run snapshot: the definition under test plus the request to
/// replay, and the response once the gateway filled it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugApi {
    /// Serialized gateway definition under test.
    pub definition: String,

    pub request: DebugRequest,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<DebugResponse>,
}
