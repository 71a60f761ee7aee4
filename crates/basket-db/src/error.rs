//! # Database Errors
//!
//! ```text
//! sqlx::Error ──► DbError ──► EngineError::Database ──► "Something went wrong"
//!                    │
//!                    └── DbError::Invalid ──► EngineError::Validation
//!                                              (shown to the shopper)
//! ```
//!
//! Constraint failures are classified with `DatabaseError::kind()`; a busy
//! database (`SQLITE_BUSY`, `SQLITE_LOCKED`) becomes `TransactionFailed` so
//! the engine can report it as retryable.

use basket_core::ValidationError;
use sqlx::error::ErrorKind as SqlxErrorKind;
use thiserror::Error;

/// SQLite primary result codes for a contended write lock.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Whether an (extended) SQLite result code is BUSY or LOCKED.
fn is_contention(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index refused the write (campaign code, single-use code).
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Referenced row is missing (single-use code for an unknown campaign,
    /// dated discount for an unknown customer).
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// SQL error or CHECK constraint.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The write lock could not be taken or the transaction did not
    /// commit. Retryable.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// A stored value could not be read back (e.g. malformed decimal TEXT).
    #[error("Corrupt {field} value: '{value}'")]
    Corrupt { field: String, value: String },

    /// A write refused before reaching SQLite, such as stock in a unit
    /// incompatible with its key.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn corrupt(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::Corrupt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.kind() {
                    SqlxErrorKind::UniqueViolation => {
                        // "UNIQUE constraint failed: campaigns.code"
                        let field = message
                            .rsplit(": ")
                            .next()
                            .unwrap_or("unknown")
                            .to_string();
                        DbError::duplicate(field, "unknown")
                    }
                    SqlxErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation { message },
                    _ if is_contention(db_err.code().as_deref()) => {
                        DbError::TransactionFailed(message)
                    }
                    _ => DbError::QueryFailed(message),
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            sqlx::Error::Io(e) => DbError::ConnectionFailed(e.to_string()),

            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[test]
    fn test_pool_errors() {
        assert!(matches!(
            DbError::from(sqlx::Error::RowNotFound),
            DbError::NotFound { .. }
        ));
        assert!(matches!(
            DbError::from(sqlx::Error::PoolTimedOut),
            DbError::PoolExhausted
        ));
        assert!(matches!(
            DbError::from(sqlx::Error::PoolClosed),
            DbError::ConnectionFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_constraint_errors_are_classified() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let insert = "INSERT INTO price_groups (id, name) VALUES ('g-1', 'Gold')";
        sqlx::query(insert).execute(db.pool()).await.unwrap();
        let err: DbError = sqlx::query(insert).execute(db.pool()).await.unwrap_err().into();
        match err {
            DbError::UniqueViolation { field, .. } => assert_eq!(field, "price_groups.id"),
            other => panic!("expected unique violation, got {other:?}"),
        }

        let err: DbError = sqlx::query(
            "INSERT INTO single_use_codes (code, campaign_id) VALUES ('X-1', 'missing')",
        )
        .execute(db.pool())
        .await
        .unwrap_err()
        .into();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }

    #[test]
    fn test_busy_codes() {
        assert!(is_contention(Some("5")));
        assert!(is_contention(Some("517")));
        assert!(is_contention(Some("6")));
        assert!(!is_contention(Some("19")));
        assert!(!is_contention(None));
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            DbError::not_found("Campaign", "c-1").to_string(),
            "Campaign not found: c-1"
        );
        assert_eq!(
            DbError::corrupt("quantity", "1,5").to_string(),
            "Corrupt quantity value: '1,5'"
        );
    }
}
