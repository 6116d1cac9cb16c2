//! Storage error types

use thiserror::Error;

/// Errors for fleet storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Duplicate value: {0}")]
    Duplicate(String),
}

impl StoreError {
    /// Map a UNIQUE constraint failure to [`StoreError::Duplicate`]
    pub(crate) fn from_unique(err: rusqlite::Error, what: impl Into<String>) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Self::Duplicate(what.into())
            }
            _ => Self::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::Duplicate("hostname h1".into());
        assert_eq!(err.to_string(), "Duplicate value: hostname h1");
    }

    #[test]
    fn test_non_unique_failure_stays_database_error() {
        let err = StoreError::from_unique(rusqlite::Error::QueryReturnedNoRows, "x");
        assert!(matches!(err, StoreError::Database(_)));
    }
}
