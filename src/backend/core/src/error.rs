//! Error handling for the gatesync core.
//!
//! This module provides:
//! - A single crate-wide error type with machine-readable codes
//! - Helper constructors for the common failure shapes
//! - Conversions from backend and serialization errors
//!
//! Lookup misses are only errors at the facade layer; stores return
//! `Option` and callers branch on presence.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A specialized Result type for gatesync operations.
pub type Result<T> = std::result::Result<T, GatesyncError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by callers for programmatic
/// error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// An event lookup by id found nothing.
    EventNotFound,
    /// A backend create/find/search/delete call failed.
    StorageError,
    /// A payload or definition could not be (de)serialized.
    SerializationError,
    /// The producing node's origin address could not be resolved.
    OriginResolutionFailed,
    /// A caller-supplied argument was rejected.
    InvalidInput,
}

impl ErrorCode {
    /// Check if a failed call may succeed when repeated by the caller.
    ///
    /// The core itself never retries; this is advisory for callers.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageError | Self::OriginResolutionFailed)
    }

    /// Get the error category for grouping in logs.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::EventNotFound => "lookup",
            Self::StorageError => "storage",
            Self::SerializationError => "serialization",
            Self::OriginResolutionFailed => "origin",
            Self::InvalidInput => "validation",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The error type for the gatesync core.
#[derive(Error, Debug)]
#[error("[{code}] {message}")]
pub struct GatesyncError {
    /// Machine-readable error code
    code: ErrorCode,

    /// Human-readable message
    message: Cow<'static, str>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl GatesyncError {
    /// Create a new error with code and message.
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attach a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Create an event-not-found error.
    pub fn event_not_found(id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::EventNotFound, format!("event not found: {}", id))
    }

    /// Create a storage error with context.
    pub fn storage(context: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::StorageError, context)
    }

    /// Create a validation error.
    pub fn invalid_input(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create an origin resolution error.
    pub fn origin_resolution(source: std::io::Error) -> Self {
        Self::new(
            ErrorCode::OriginResolutionFailed,
            "failed to resolve the local node's origin address",
        )
        .with_source(source)
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check whether this error represents a lookup miss.
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::EventNotFound
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for GatesyncError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(ErrorCode::SerializationError, "failed to process JSON data").with_source(error)
    }
}

impl From<sqlx::Error> for GatesyncError {
    fn from(error: sqlx::Error) -> Self {
        Self::new(ErrorCode::StorageError, "database operation failed").with_source(error)
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for GatesyncError {
    fn from(error: mongodb::error::Error) -> Self {
        Self::new(ErrorCode::StorageError, "document store operation failed").with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let error = GatesyncError::event_not_found("evt-1");
        assert_eq!(error.code(), ErrorCode::EventNotFound);
        assert!(error.is_not_found());
        assert!(!error.code().is_retryable());
    }

    #[test]
    fn test_storage_error_is_retryable() {
        let error = GatesyncError::storage("insert failed");
        assert!(error.code().is_retryable());
        assert_eq!(error.code().category(), "storage");
    }

    #[test]
    fn test_display_includes_code_and_message() {
        let error = GatesyncError::event_not_found("evt-42");
        let rendered = format!("{}", error);
        assert!(rendered.contains("EventNotFound"));
        assert!(rendered.contains("evt-42"));
    }

    #[test]
    fn test_serde_json_conversion() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json");
        let error: GatesyncError = bad.unwrap_err().into();
        assert_eq!(error.code(), ErrorCode::SerializationError);
        assert!(std::error::Error::source(&error).is_some());
    }
}
