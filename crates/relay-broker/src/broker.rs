//! The broker handle shared by the API and the background loops.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use relay_db::models::JobEventType;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::config::BrokerConfig;
use crate::metrics::Metrics;

/// Job lifecycle engine backed by PostgreSQL.
///
/// Each operation (`lease`, `dispatch`, `complete`, `fail`, `heartbeat`,
/// `cancel`, `requeue_expired`) is a single transactional unit; the impl
/// blocks live in their own modules.
pub struct JobBroker {
    pool: PgPool,
    config: BrokerConfig,
    metrics: Arc<Metrics>,
}

impl JobBroker {
    pub fn new(pool: PgPool, config: BrokerConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            pool,
            config,
            metrics,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Number of live (unexpired) leases across all tenants.
    pub async fn live_lease_count(&self, now: DateTime<Utc>) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM job_leases WHERE expires_at > $1")
                .bind(now)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

/// Append an audit log entry inside the caller's transaction.
pub(crate) async fn append_event(
    conn: &mut PgConnection,
    job_id: Uuid,
    event_type: JobEventType,
    timestamp: DateTime<Utc>,
    meta: serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO job_events (job_id, event_type, timestamp, meta) VALUES ($1, $2, $3, $4)")
        .bind(job_id)
        .bind(event_type)
        .bind(timestamp)
        .bind(meta)
        .execute(conn)
        .await?;
    Ok(())
}

/// Enqueue an outbox row inside the caller's transaction, so the event is
/// durable exactly when the state change commits.
pub(crate) async fn enqueue_outbox(
    conn: &mut PgConnection,
    event_type: &str,
    payload: serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO outbox_events (event_type, payload) VALUES ($1, $2)")
        .bind(event_type)
        .bind(payload)
        .execute(conn)
        .await?;
    Ok(())
}
