//! Error types and error handling utilities
//!
//! All subsystems in this crate report through [`CoreError`]. Boundary crates
//! map these into their own error vocabulary (HTTP status codes, database
//! errors) instead of leaking internal wording upstream.

use thiserror::Error;

/// Core result type used throughout the application
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    /// Validation errors (bad phone, bad id, bad payload shape)
    #[error("validation error: {0}")]
    Validation(String),

    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A domain invariant was violated (fatal for the affected campaign)
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// External service errors (provider, Redis)
    #[error("{service} error: {message}")]
    External { service: &'static str, message: String },

    /// Storage-layer errors surfaced through the store trait
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        CoreError::Invariant(message.into())
    }

    pub fn external(service: &'static str, message: impl Into<String>) -> Self {
        CoreError::External {
            service,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        CoreError::Storage(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CoreError::Internal(message.into())
    }

    /// Whether the operation that produced this error may succeed on retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::External { .. } | CoreError::Storage(_)
        )
    }

    /// Whether a webhook-driven caller should silently drop this error
    /// instead of failing the provider response
    pub fn is_droppable(&self) -> bool {
        matches!(
            self,
            CoreError::NotFound { .. } | CoreError::Validation(_)
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<wacast_whatsapp::CloudApiError> for CoreError {
    fn from(err: wacast_whatsapp::CloudApiError) -> Self {
        CoreError::external("cloud api", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_formats_entity_and_id() {
        let error = CoreError::not_found("campaign", "abc");
        assert_eq!(error.to_string(), "campaign not found: abc");
    }

    #[test]
    fn retryable_classification() {
        assert!(CoreError::external("redis", "connection refused").is_retryable());
        assert!(CoreError::storage("timeout").is_retryable());
        assert!(!CoreError::validation("bad phone").is_retryable());
        assert!(!CoreError::invariant("template needs parameters").is_retryable());
    }

    #[test]
    fn droppable_classification() {
        assert!(CoreError::not_found("message", "pm1").is_droppable());
        assert!(CoreError::validation("bad payload").is_droppable());
        assert!(!CoreError::internal("boom").is_droppable());
    }
}
