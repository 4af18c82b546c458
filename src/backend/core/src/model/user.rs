//! User references attached to read events.

use serde::{Deserialize, Serialize};

/// Source tag of the placeholder substituted when a user lookup fails.
pub const SYSTEM_USER_SOURCE: &str = "system";

/// A resolved reference to the user who triggered an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,

    /// Identity provider the user came from.
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl User {
    /// Synthetic placeholder used when the acting user cannot be
    /// resolved; event reads must not fail on a missing user.
    pub fn system_placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: SYSTEM_USER_SOURCE.to_string(),
            display_name: None,
        }
    }
}
