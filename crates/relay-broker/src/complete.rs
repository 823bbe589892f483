//! Idempotent job completion.

use chrono::Utc;
use relay_db::models::{Job, JobEventType, JobLease, JobStatus};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::broker::{append_event, enqueue_outbox, JobBroker};
use crate::error::{BrokerError, BrokerResult};

impl JobBroker {
    /// Mark a job succeeded and store its result.
    ///
    /// With an `idempotency_key`, replays return the current job and the
    /// first writer's result stays authoritative; the completion ledger row
    /// is inserted with `ON CONFLICT DO NOTHING`, so a concurrent duplicate
    /// resolves to the replay branch instead of aborting the transaction.
    pub async fn complete(
        &self,
        job_id: Uuid,
        result: serde_json::Value,
        lease_token: Option<Uuid>,
        idempotency_key: Option<&str>,
    ) -> BrokerResult<Job> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(BrokerError::JobNotFound(job_id))?;

        if let Some(key) = idempotency_key {
            let already_recorded: Option<(i32,)> = sqlx::query_as(
                "SELECT 1 FROM job_completions WHERE job_id = $1 AND idempotency_key = $2",
            )
            .bind(job_id)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;

            if already_recorded.is_some() {
                debug!(job_id = %job_id, key, "replayed completion");
                return Ok(job);
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO job_completions (job_id, idempotency_key, created_at)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(job_id)
            .bind(key)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() == 0 {
                // A concurrent request recorded the key first; its result wins.
                let fresh = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
                    .bind(job_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .unwrap_or(job);
                return Ok(fresh);
            }
        }

        if job.status == JobStatus::Succeeded {
            return Ok(job);
        }
        if !matches!(job.status, JobStatus::Leased | JobStatus::Running) {
            return Err(BrokerError::InvalidJobState(format!(
                "cannot complete job in state {}",
                job.status
            )));
        }

        if let Some(token) = lease_token {
            let lease: Option<JobLease> = sqlx::query_as(
                "SELECT * FROM job_leases WHERE job_id = $1 AND lease_token = $2",
            )
            .bind(job_id)
            .bind(token)
            .fetch_optional(&mut *tx)
            .await?;
            if lease.is_none() {
                return Err(BrokerError::InvalidJobState(
                    "lease lost or token mismatch".to_string(),
                ));
            }
        }

        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs SET status = 'succeeded', result = $2, updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(&result)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        // Safety net: clear any lease for this job, token or not.
        sqlx::query("DELETE FROM job_leases WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        append_event(
            &mut tx,
            job_id,
            JobEventType::Completed,
            now,
            json!({ "lease_token": lease_token }),
        )
        .await?;

        enqueue_outbox(
            &mut tx,
            "JOB_COMPLETED",
            json!({
                "job_id": job.id,
                "tenant_id": job.tenant_id,
                "result": result,
                "completed_at": now,
            }),
        )
        .await?;

        tx.commit().await?;

        let duration = job
            .started_at
            .map(|started| (now - started).num_milliseconds() as f64 / 1000.0);
        self.metrics().record_completion(&job.tenant_id, duration);
        debug!(job_id = %job.id, "completed job");

        Ok(job)
    }
}
