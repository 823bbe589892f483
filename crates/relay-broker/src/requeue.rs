//! Lease-expiry recovery (the reaper).

use chrono::Utc;
use relay_db::models::{Job, JobEventType, JobLease};
use serde_json::json;
use tracing::{debug, info};

use crate::broker::{append_event, JobBroker};
use crate::error::BrokerResult;

impl JobBroker {
    /// Requeue or dead-letter jobs whose leases have expired.
    ///
    /// Expiry counts as a failed attempt: a poison job that keeps crashing
    /// its workers converges to the DLQ instead of oscillating forever.
    /// Bounded by `limit`; returns the number of jobs recovered.
    pub async fn requeue_expired(&self, limit: i64) -> BrokerResult<u64> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let expired: Vec<JobLease> = sqlx::query_as(
            r#"
            SELECT * FROM job_leases
            WHERE expires_at < $1
            ORDER BY expires_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        if expired.is_empty() {
            return Ok(0);
        }

        let mut recovered = 0u64;
        for lease in &expired {
            let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
                .bind(lease.job_id)
                .fetch_one(&mut *tx)
                .await?;

            let attempts = job.attempts + 1;
            let dead_lettered = attempts >= job.max_attempts;

            let event_type = if dead_lettered {
                sqlx::query(
                    r#"
                    UPDATE jobs SET status = 'dlq', attempts = $2, last_error = 'lease_expired',
                                    updated_at = $3
                    WHERE id = $1
                    "#,
                )
                .bind(job.id)
                .bind(attempts)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                JobEventType::DlqRouted
            } else {
                sqlx::query(
                    r#"
                    UPDATE jobs SET status = 'pending', available_at = $2, attempts = $3,
                                    last_error = 'lease_expired', updated_at = $2
                    WHERE id = $1
                    "#,
                )
                .bind(job.id)
                .bind(now)
                .bind(attempts)
                .execute(&mut *tx)
                .await?;
                JobEventType::Retried
            };

            sqlx::query("DELETE FROM job_leases WHERE job_id = $1")
                .bind(lease.job_id)
                .execute(&mut *tx)
                .await?;

            append_event(
                &mut tx,
                job.id,
                event_type,
                now,
                json!({
                    "reason": "lease_expired",
                    "worker_id": lease.worker_id,
                    "attempts": attempts,
                }),
            )
            .await?;

            debug!(job_id = %job.id, worker_id = %lease.worker_id, dead_lettered, "reaped expired lease");
            recovered += 1;
        }

        tx.commit().await?;

        self.metrics().record_reaped(recovered);
        info!(recovered, "requeued expired leases");
        Ok(recovered)
    }
}
