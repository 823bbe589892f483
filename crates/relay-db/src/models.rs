//! Row models and status enums.
//!
//! Statuses are stored as lowercase snake_case text; the enums below are the
//! complete domain, not an extension point.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created with a future `available_at`; promoted to pending by the ticker.
    Scheduled,
    /// Eligible for leasing once `available_at` has passed.
    Pending,
    /// Claimed by a worker under a live lease.
    Leased,
    /// Worker has acknowledged execution start.
    Running,
    Succeeded,
    FailedFinal,
    Canceled,
    /// Dead-lettered after exhausting `max_attempts`.
    Dlq,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::FailedFinal | JobStatus::Canceled | JobStatus::Dlq
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Scheduled => "scheduled",
            JobStatus::Pending => "pending",
            JobStatus::Leased => "leased",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::FailedFinal => "failed_final",
            JobStatus::Canceled => "canceled",
            JobStatus::Dlq => "dlq",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit log entry kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobEventType {
    Created,
    Leased,
    LeaseRenewed,
    Completed,
    Retried,
    DlqRouted,
    Canceled,
}

/// Outbox row lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Published,
}

/// A tenant in the system.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    /// Weighted-fair dispatch share.
    pub weight: i32,
    /// Hard cap on concurrently leased jobs for this tenant.
    pub max_inflight: i32,
    pub api_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub tenant_id: String,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub idempotency_key: Option<String>,
    pub available_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    /// Wall-clock ceiling in seconds, independent of the rolling lease.
    pub execution_timeout: Option<i32>,
    pub last_error: Option<String>,
    pub cron_schedule: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A worker's time-bounded reservation of a job. Owned by the job; deleted on
/// terminal transition or reap.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobLease {
    pub job_id: Uuid,
    pub worker_id: String,
    pub lease_token: Uuid,
    pub expires_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
}

/// Append-only audit log entry; shares the transaction of the state change
/// that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobEvent {
    pub id: i64,
    pub job_id: Uuid,
    pub event_type: JobEventType,
    pub timestamp: DateTime<Utc>,
    pub meta: serde_json::Value,
}

/// Outbox row written transactionally with a state change and published
/// asynchronously.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutboxEvent {
    pub id: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        for s in [
            JobStatus::Succeeded,
            JobStatus::FailedFinal,
            JobStatus::Canceled,
            JobStatus::Dlq,
        ] {
            assert!(s.is_terminal());
        }
        for s in [
            JobStatus::Scheduled,
            JobStatus::Pending,
            JobStatus::Leased,
            JobStatus::Running,
        ] {
            assert!(!s.is_terminal());
        }
    }

    #[test]
    fn status_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::FailedFinal).unwrap(),
            "\"failed_final\""
        );
        assert_eq!(serde_json::to_string(&JobStatus::Dlq).unwrap(), "\"dlq\"");
        assert_eq!(
            serde_json::from_str::<JobStatus>("\"pending\"").unwrap(),
            JobStatus::Pending
        );
    }

    #[test]
    fn event_type_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobEventType::DlqRouted).unwrap(),
            "\"dlq_routed\""
        );
        assert_eq!(
            serde_json::to_string(&JobEventType::LeaseRenewed).unwrap(),
            "\"lease_renewed\""
        );
    }

    #[test]
    fn display_matches_storage_form() {
        assert_eq!(JobStatus::FailedFinal.to_string(), "failed_final");
        assert_eq!(JobStatus::Leased.to_string(), "leased");
    }
}
