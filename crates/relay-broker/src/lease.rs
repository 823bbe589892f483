//! Atomic lease claim.
//!
//! The only concurrency-critical invariant in the system (one worker per
//! job) is protected here: an eager `FOR UPDATE SKIP LOCKED` selection of
//! the canonical job row, followed by the state transition and lease insert
//! in the same transaction. Concurrent claimers each see a different row
//! without waiting on each other's locks.

use chrono::{DateTime, Utc};
use relay_core::next_fire_time;
use relay_db::models::{Job, JobEventType, JobLease};
use serde_json::json;
use sqlx::PgConnection;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broker::{append_event, JobBroker};
use crate::error::BrokerResult;

/// A claimed job together with its lease.
#[derive(Debug, Clone)]
pub struct LeasedJob {
    pub job: Job,
    pub lease: JobLease,
}

impl JobBroker {
    /// Atomically claim one eligible job, optionally pinned to a tenant.
    ///
    /// Returns `None` when nothing is claimable. Within one transaction:
    /// select the highest-priority, longest-waiting pending job whose
    /// `available_at` has passed (skipping rows other claimers hold locked),
    /// transition it to `leased`, insert the lease record, append the audit
    /// event, and for recurring jobs insert the next occurrence.
    pub async fn lease(
        &self,
        worker_id: &str,
        tenant_id: Option<&str>,
        lease_duration_seconds: Option<i64>,
    ) -> BrokerResult<Option<LeasedJob>> {
        let duration =
            lease_duration_seconds.unwrap_or(self.config().default_lease_timeout_seconds);
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(duration);
        let lease_token = Uuid::new_v4();

        let mut tx = self.pool().begin().await?;

        let found = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE status = 'pending'
              AND available_at <= $1
              AND ($2::text IS NULL OR tenant_id = $2)
            ORDER BY priority DESC, available_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(found) = found else {
            return Ok(None);
        };

        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs SET status = 'leased', started_at = $2, updated_at = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(found.id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let lease = sqlx::query_as::<_, JobLease>(
            r#"
            INSERT INTO job_leases (job_id, worker_id, lease_token, expires_at, last_heartbeat_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(job.id)
        .bind(worker_id)
        .bind(lease_token)
        .bind(expires_at)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        append_event(
            &mut tx,
            job.id,
            JobEventType::Leased,
            now,
            json!({
                "worker_id": worker_id,
                "lease_token": lease_token,
                "expires_at": expires_at,
            }),
        )
        .await?;

        if job.cron_schedule.is_some() {
            schedule_next_occurrence(&mut tx, &job, now).await?;
        }

        tx.commit().await?;

        let wait = (now - job.available_at).num_milliseconds() as f64 / 1000.0;
        self.metrics().record_lease(&job.tenant_id, wait);
        debug!(job_id = %job.id, worker_id, expires_at = %expires_at, "leased job");

        Ok(Some(LeasedJob { job, lease }))
    }
}

/// Insert the next occurrence of a recurring job.
///
/// The next fire time is computed from the expression anchored at the
/// occurrence that was just claimed, so recurrence does not drift with lease
/// latency. An invalid expression is logged and skipped; it never fails the
/// claim itself.
async fn schedule_next_occurrence(
    conn: &mut PgConnection,
    job: &Job,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let Some(expr) = job.cron_schedule.as_deref() else {
        return Ok(());
    };

    let next_fire = match next_fire_time(expr, job.available_at) {
        Ok(t) => t,
        Err(e) => {
            warn!(job_id = %job.id, error = %e, "skipping cron recurrence");
            return Ok(());
        }
    };

    sqlx::query(
        r#"
        INSERT INTO jobs (id, tenant_id, status, priority, payload, max_attempts,
                          execution_timeout, available_at, cron_schedule, created_at, updated_at)
        VALUES ($1, $2, 'scheduled', $3, $4, $5, $6, $7, $8, $9, $9)
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(&job.tenant_id)
    .bind(job.priority)
    .bind(&job.payload)
    .bind(job.max_attempts)
    .bind(job.execution_timeout)
    .bind(next_fire)
    .bind(expr)
    .bind(now)
    .execute(conn)
    .await?;

    debug!(job_id = %job.id, next_fire = %next_fire, "scheduled next cron occurrence");
    Ok(())
}
