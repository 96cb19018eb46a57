//! Database error types

use thiserror::Error;
use wacast_core::CoreError;

/// Database operation result type
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Database-specific error types
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("invalid stored value: {0}")]
    InvalidValue(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sea_orm::DbErr> for DatabaseError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err {
            sea_orm::DbErr::ConnectionAcquire(e) => DatabaseError::Connection(e.to_string()),
            sea_orm::DbErr::Conn(e) => DatabaseError::Connection(e.to_string()),
            sea_orm::DbErr::RecordNotFound(msg) => DatabaseError::NotFound(msg),
            sea_orm::DbErr::Query(e) => DatabaseError::Query(e.to_string()),
            sea_orm::DbErr::Exec(e) => DatabaseError::Query(e.to_string()),
            sea_orm::DbErr::Migration(msg) => DatabaseError::Migration(msg),
            other => DatabaseError::Query(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        DatabaseError::Serialization(err.to_string())
    }
}

impl From<DatabaseError> for CoreError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(id) => CoreError::not_found("row", id),
            other => CoreError::storage(other.to_string()),
        }
    }
}

/// Whether an insert failed on a unique constraint, i.e. a concurrent
/// writer won the race and the existing row should be re-read
pub fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    let text = err.to_string();
    text.contains("duplicate key") || text.contains("unique constraint")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_into_core_not_found() {
        let core: CoreError = DatabaseError::NotFound("campaign xyz".to_string()).into();
        assert!(matches!(core, CoreError::NotFound { .. }));
    }

    #[test]
    fn query_errors_map_into_core_storage() {
        let core: CoreError = DatabaseError::Query("timeout".to_string()).into();
        assert!(matches!(core, CoreError::Storage(_)));
    }
}
