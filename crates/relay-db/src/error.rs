//! Database error types.
//!
//! Lookup misses and uniqueness violations are named per entity, so callers
//! map them to their own surfaces without string matching.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("tenant {0} not found")]
    TenantNotFound(String),

    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("no tenant matches the presented API key")]
    UnknownApiKey,

    #[error("tenant {0} already exists")]
    TenantExists(String),

    #[error("idempotency key {0:?} is already bound to another job")]
    IdempotencyKeyTaken(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;
