//! Failure reporting: bounded retry with backoff, dead-lettering past the cap.

use chrono::Utc;
use relay_db::models::{Job, JobEventType};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::broker::{append_event, enqueue_outbox, JobBroker};
use crate::error::{BrokerError, BrokerResult};

impl JobBroker {
    /// Record a failed attempt.
    ///
    /// The attempt counter increments; at `max_attempts` the job is routed
    /// to the DLQ, otherwise it returns to `pending` with `available_at`
    /// pushed out by the backoff policy. The lease is deleted either way.
    pub async fn fail(
        &self,
        job_id: Uuid,
        error: &str,
        lease_token: Option<Uuid>,
    ) -> BrokerResult<Job> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(BrokerError::JobNotFound(job_id))?;

        let attempts = job.attempts + 1;
        let dead_lettered = attempts >= job.max_attempts;

        let (job, event_type) = if dead_lettered {
            let job = sqlx::query_as::<_, Job>(
                r#"
                UPDATE jobs SET status = 'dlq', attempts = $2, last_error = $3, updated_at = $4
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(job_id)
            .bind(attempts)
            .bind(error)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            (job, JobEventType::DlqRouted)
        } else {
            let next_run = now + self.config().backoff.delay(attempts);
            let job = sqlx::query_as::<_, Job>(
                r#"
                UPDATE jobs SET status = 'pending', available_at = $2, attempts = $3,
                                last_error = $4, updated_at = $5
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(job_id)
            .bind(next_run)
            .bind(attempts)
            .bind(error)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            (job, JobEventType::Retried)
        };

        sqlx::query("DELETE FROM job_leases WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        append_event(
            &mut tx,
            job_id,
            event_type,
            now,
            json!({
                "error": error,
                "attempts": attempts,
                "max_attempts": job.max_attempts,
                "lease_token": lease_token,
            }),
        )
        .await?;

        let outbox_type = if dead_lettered {
            "JOB_DLQ_ROUTED"
        } else {
            "JOB_RETRIED"
        };
        enqueue_outbox(
            &mut tx,
            outbox_type,
            json!({
                "job_id": job.id,
                "tenant_id": job.tenant_id,
                "error": error,
                "attempts": attempts,
                "available_at": job.available_at,
            }),
        )
        .await?;

        tx.commit().await?;

        self.metrics().record_failure(&job.tenant_id, dead_lettered);
        if dead_lettered {
            info!(job_id = %job.id, attempts, "job exhausted retries, routed to DLQ");
        } else {
            debug!(job_id = %job.id, attempts, next_run = %job.available_at, "job failed, will retry");
        }

        Ok(job)
    }
}
