//! Broker error types.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("invalid job state: {0}")]
    InvalidJobState(String),

    #[error("lease for job {0} not found or token mismatch")]
    LeaseNotFound(Uuid),

    #[error("lease expired: {0}")]
    LeaseExpired(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
