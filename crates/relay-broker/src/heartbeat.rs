//! Lease renewal.

use chrono::{DateTime, Utc};
use relay_db::models::{Job, JobLease};
use tracing::debug;
use uuid::Uuid;

use crate::broker::JobBroker;
use crate::error::{BrokerError, BrokerResult};

impl JobBroker {
    /// Extend a lease, proving ownership with the token.
    ///
    /// The token is the sole authority; no worker-id check is needed. A
    /// lease past its expiry cannot be renewed (the reaper owns it now), and
    /// a job past its `execution_timeout` wall-clock ceiling is refused even
    /// when the rolling lease is still live.
    pub async fn heartbeat(
        &self,
        job_id: Uuid,
        lease_token: Uuid,
        extend_seconds: i64,
    ) -> BrokerResult<DateTime<Utc>> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let lease: JobLease = sqlx::query_as(
            "SELECT * FROM job_leases WHERE job_id = $1 AND lease_token = $2 FOR UPDATE",
        )
        .bind(job_id)
        .bind(lease_token)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(BrokerError::LeaseNotFound(job_id))?;

        if lease.expires_at < now {
            return Err(BrokerError::LeaseExpired(format!(
                "lease for job {} expired at {}",
                job_id, lease.expires_at
            )));
        }

        let job: Job = sqlx::query_as("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_one(&mut *tx)
            .await?;

        if let (Some(timeout), Some(started_at)) = (job.execution_timeout, job.started_at) {
            let runtime = (now - started_at).num_seconds();
            if runtime > i64::from(timeout) {
                return Err(BrokerError::LeaseExpired(format!(
                    "execution timeout exceeded ({runtime}s > {timeout}s)"
                )));
            }
        }

        let new_expires_at = now + chrono::Duration::seconds(extend_seconds);
        sqlx::query(
            "UPDATE job_leases SET expires_at = $2, last_heartbeat_at = $3 WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(new_expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(job_id = %job_id, expires_at = %new_expires_at, "lease renewed");
        Ok(new_expires_at)
    }
}
