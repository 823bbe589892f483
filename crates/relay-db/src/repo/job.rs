//! Job creation and lookup.
//!
//! Lifecycle transitions (lease, complete, fail, cancel, requeue) live in
//! `relay-broker`; this repository covers the producer-facing surface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Job, JobEvent, JobEventType, JobStatus};
use crate::{DbError, DbResult};

/// Fields supplied by a producer when enqueuing a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub tenant_id: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub idempotency_key: Option<String>,
    pub max_attempts: i32,
    pub execution_timeout: Option<i32>,
    /// Future instants create the job `scheduled`; the ticker promotes it.
    pub available_at: Option<DateTime<Utc>>,
    pub cron_schedule: Option<String>,
}

#[async_trait]
pub trait JobRepo: Send + Sync {
    /// Insert a job and its `created` audit event in one transaction.
    ///
    /// An existing `(tenant_id, idempotency_key)` row is replayed instead of
    /// inserted, including under concurrent duplicate submissions.
    async fn create(&self, job: NewJob) -> DbResult<Job>;
    async fn get_by_id(&self, id: Uuid) -> DbResult<Job>;
    /// The job's audit log, oldest first.
    async fn list_events(&self, job_id: Uuid) -> DbResult<Vec<JobEvent>>;
}

/// PostgreSQL implementation of JobRepo.
pub struct PgJobRepo {
    pool: PgPool,
}

impl PgJobRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_idempotency_key(&self, tenant_id: &str, key: &str) -> DbResult<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE tenant_id = $1 AND idempotency_key = $2",
        )
        .bind(tenant_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }
}

#[async_trait]
impl JobRepo for PgJobRepo {
    async fn create(&self, job: NewJob) -> DbResult<Job> {
        if let Some(key) = &job.idempotency_key {
            if let Some(existing) = self.find_by_idempotency_key(&job.tenant_id, key).await? {
                return Ok(existing);
            }
        }

        let now = Utc::now();
        let available_at = job.available_at.unwrap_or(now);
        let status = if available_at > now {
            JobStatus::Scheduled
        } else {
            JobStatus::Pending
        };

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (id, tenant_id, status, priority, payload, idempotency_key,
                              max_attempts, execution_timeout, available_at, cron_schedule,
                              created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&job.tenant_id)
        .bind(status)
        .bind(job.priority)
        .bind(&job.payload)
        .bind(&job.idempotency_key)
        .bind(job.max_attempts)
        .bind(job.execution_timeout)
        .bind(available_at)
        .bind(&job.cron_schedule)
        .bind(now)
        .fetch_one(&mut *tx)
        .await;

        let inserted = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                // Lost a race with a duplicate submission; the first writer wins.
                drop(tx);
                let key = job.idempotency_key.as_deref().unwrap_or_default();
                return self
                    .find_by_idempotency_key(&job.tenant_id, key)
                    .await?
                    .ok_or_else(|| DbError::IdempotencyKeyTaken(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        sqlx::query(
            "INSERT INTO job_events (job_id, event_type, timestamp, meta) VALUES ($1, $2, $3, '{}')",
        )
        .bind(inserted.id)
        .bind(JobEventType::Created)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Job> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::JobNotFound(id))?;
        Ok(job)
    }

    async fn list_events(&self, job_id: Uuid) -> DbResult<Vec<JobEvent>> {
        let events = sqlx::query_as::<_, JobEvent>(
            "SELECT * FROM job_events WHERE job_id = $1 ORDER BY id ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }
}
