//! Error types for k6hub-core

use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Errors raised by the dispatch service and fleet management operations
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Script not found: {0}")]
    ScriptNotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl DispatchError {
    /// True for the not-found family of errors
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::AgentNotFound(_) | Self::TaskNotFound(_) | Self::ScriptNotFound(_)
        )
    }
}

impl From<AuthError> for DispatchError {
    fn from(err: AuthError) -> Self {
        Self::Unauthorized(err.to_string())
    }
}

/// A string did not name a known variant of an enum
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_errors_display_the_id() {
        let err = DispatchError::AgentNotFound("abc".to_string());
        assert_eq!(err.to_string(), "Agent not found: abc");
        assert!(err.is_not_found());
    }

    #[test]
    fn conflict_is_not_a_not_found() {
        let err = DispatchError::Conflict("agent already online".to_string());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("already online"));
    }

    #[test]
    fn store_error_converts() {
        let err: DispatchError = StoreError::LockPoisoned.into();
        assert!(matches!(err, DispatchError::Store(_)));
    }

    #[test]
    fn auth_error_becomes_unauthorized() {
        let err: DispatchError = AuthError::MissingToken.into();
        assert!(matches!(err, DispatchError::Unauthorized(_)));
    }

    #[test]
    fn parse_enum_error_display() {
        let err = ParseEnumError::new("task status", "exploded");
        assert_eq!(err.to_string(), "unknown task status: exploded");
    }
}
