//! Producer-facing job endpoints.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use relay_db::models::{Job, JobEvent, JobEventType, JobStatus};
use relay_db::{JobRepo, NewJob};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth;
use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_job))
        .route("/{id}", get(get_job))
        .route("/{id}/cancel", post(cancel_job))
        .route("/{id}/events", get(get_job_events))
}

#[derive(Debug, Deserialize)]
struct CreateJobRequest {
    tenant_id: String,
    payload: serde_json::Value,
    #[serde(default)]
    priority: i32,
    idempotency_key: Option<String>,
    #[serde(default = "default_max_attempts")]
    max_attempts: i32,
    execution_timeout: Option<i32>,
    /// Future instants create the job scheduled rather than pending.
    available_at: Option<DateTime<Utc>>,
    cron_schedule: Option<String>,
}

fn default_max_attempts() -> i32 {
    3
}

#[derive(Debug, Serialize)]
struct JobResponse {
    id: Uuid,
    tenant_id: String,
    status: JobStatus,
    priority: i32,
    payload: serde_json::Value,
    result: Option<serde_json::Value>,
    attempts: i32,
    max_attempts: i32,
    last_error: Option<String>,
    available_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    execution_timeout: Option<i32>,
    cron_schedule: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            tenant_id: job.tenant_id,
            status: job.status,
            priority: job.priority,
            payload: job.payload,
            result: job.result,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            last_error: job.last_error,
            available_at: job.available_at,
            started_at: job.started_at,
            execution_timeout: job.execution_timeout,
            cron_schedule: job.cron_schedule,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

async fn create_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobResponse>), ApiError> {
    let tenant = auth::api_key_tenant(&state, &headers).await?;
    if tenant.id != req.tenant_id {
        return Err(ApiError::Forbidden(
            "API key does not belong to this tenant".to_string(),
        ));
    }

    if !(0..=9).contains(&req.priority) {
        return Err(ApiError::InvalidRequest(
            "priority must be between 0 and 9".to_string(),
        ));
    }
    if req.max_attempts < 1 {
        return Err(ApiError::InvalidRequest(
            "max_attempts must be at least 1".to_string(),
        ));
    }
    if let Some(expr) = &req.cron_schedule {
        relay_core::next_fire_time(expr, Utc::now())
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
    }

    let job = state
        .job_repo
        .create(NewJob {
            tenant_id: req.tenant_id,
            payload: req.payload,
            priority: req.priority,
            idempotency_key: req.idempotency_key,
            max_attempts: req.max_attempts,
            execution_timeout: req.execution_timeout,
            available_at: req.available_at,
            cron_schedule: req.cron_schedule,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(job.into())))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<JobResponse>, ApiError> {
    let tenant = auth::api_key_tenant(&state, &headers).await?;
    let job = fetch_owned_job(&state, id, &tenant.id).await?;
    Ok(Json(job.into()))
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<JobResponse>, ApiError> {
    let tenant = auth::api_key_tenant(&state, &headers).await?;
    fetch_owned_job(&state, id, &tenant.id).await?;

    let job = state.broker.cancel(id).await?;
    Ok(Json(job.into()))
}

#[derive(Debug, Serialize)]
struct JobEventResponse {
    event_type: JobEventType,
    timestamp: DateTime<Utc>,
    meta: serde_json::Value,
}

impl From<JobEvent> for JobEventResponse {
    fn from(event: JobEvent) -> Self {
        Self {
            event_type: event.event_type,
            timestamp: event.timestamp,
            meta: event.meta,
        }
    }
}

async fn get_job_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<JobEventResponse>>, ApiError> {
    let tenant = auth::api_key_tenant(&state, &headers).await?;
    fetch_owned_job(&state, id, &tenant.id).await?;

    let events = state.job_repo.list_events(id).await?;
    Ok(Json(events.into_iter().map(JobEventResponse::from).collect()))
}

/// Look up a job, hiding other tenants' jobs behind a 404.
async fn fetch_owned_job(state: &AppState, id: Uuid, tenant_id: &str) -> Result<Job, ApiError> {
    let job = state.job_repo.get_by_id(id).await?;
    if job.tenant_id != tenant_id {
        return Err(ApiError::NotFound(format!("job {} not found", id)));
    }
    Ok(job)
}
