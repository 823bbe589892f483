//! User-initiated cancellation.

use chrono::Utc;
use relay_db::models::{Job, JobEventType};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::broker::{append_event, JobBroker};
use crate::error::{BrokerError, BrokerResult};

impl JobBroker {
    /// Cancel a job. Idempotent: terminal jobs are returned unchanged.
    ///
    /// Cancellation kills any live lease, so a worker still holding the
    /// token finds its next heartbeat or completion rejected.
    pub async fn cancel(&self, job_id: Uuid) -> BrokerResult<Job> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(BrokerError::JobNotFound(job_id))?;

        if job.status.is_terminal() {
            return Ok(job);
        }
        let previous_status = job.status;

        let job = sqlx::query_as::<_, Job>(
            "UPDATE jobs SET status = 'canceled', updated_at = $2 WHERE id = $1 RETURNING *",
        )
        .bind(job_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM job_leases WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        append_event(
            &mut tx,
            job_id,
            JobEventType::Canceled,
            now,
            json!({ "previous_status": previous_status }),
        )
        .await?;

        tx.commit().await?;

        debug!(job_id = %job.id, "canceled job");
        Ok(job)
    }
}
