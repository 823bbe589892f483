//! Worker-facing lease endpoints.
//!
//! Every request body is signed with the tenant key; verification happens
//! against the exact bytes received, so handlers take the raw body and parse
//! after authenticating (same shape as webhook signature checks).

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use relay_broker::LeasedJob;
use relay_db::models::JobStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth;
use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/poll", post(poll))
        .route("/{job_id}/heartbeat", post(heartbeat))
        .route("/{job_id}/complete", post(complete))
        .route("/{job_id}/fail", post(fail))
}

#[derive(Debug, Deserialize)]
struct PollRequest {
    worker_id: String,
    tenant_id: Option<String>,
    lease_duration_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
struct WorkerJob {
    id: Uuid,
    tenant_id: String,
    status: JobStatus,
    priority: i32,
    payload: Value,
    attempts: i32,
    max_attempts: i32,
    execution_timeout: Option<i32>,
}

#[derive(Debug, Serialize)]
struct PollResponse {
    job: WorkerJob,
    lease_token: Uuid,
    expires_at: DateTime<Utc>,
}

impl From<LeasedJob> for PollResponse {
    fn from(leased: LeasedJob) -> Self {
        Self {
            job: WorkerJob {
                id: leased.job.id,
                tenant_id: leased.job.tenant_id,
                status: leased.job.status,
                priority: leased.job.priority,
                payload: leased.job.payload,
                attempts: leased.job.attempts,
                max_attempts: leased.job.max_attempts,
                execution_timeout: leased.job.execution_timeout,
            },
            lease_token: leased.lease.lease_token,
            expires_at: leased.lease.expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    #[allow(dead_code)]
    worker_id: String,
    lease_token: Uuid,
    #[serde(default = "default_extend_seconds")]
    extend_seconds: i64,
}

fn default_extend_seconds() -> i64 {
    60
}

#[derive(Debug, Deserialize)]
struct CompleteRequest {
    #[allow(dead_code)]
    worker_id: String,
    lease_token: Uuid,
    result: Value,
    idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FailRequest {
    #[allow(dead_code)]
    worker_id: String,
    lease_token: Uuid,
    error: String,
}

/// Outcome acknowledgement for complete/fail.
#[derive(Debug, Serialize)]
struct LifecycleAck {
    job_id: Uuid,
    job_status: JobStatus,
}

async fn poll(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Option<PollResponse>>, ApiError> {
    let tenant = auth::worker_tenant(&state, &headers, &body).await?;
    let req: PollRequest = parse_body(&body)?;

    // A pinned poll may only target the signing tenant's queue.
    if let Some(pinned) = &req.tenant_id {
        if *pinned != tenant.id {
            return Err(ApiError::Forbidden(
                "cannot poll another tenant's queue".to_string(),
            ));
        }
    }

    let leased = state
        .broker
        .dispatch(
            &req.worker_id,
            req.tenant_id.as_deref(),
            req.lease_duration_seconds,
        )
        .await?;

    Ok(Json(leased.map(PollResponse::from)))
}

async fn heartbeat(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    auth::worker_tenant(&state, &headers, &body).await?;
    let req: HeartbeatRequest = parse_body(&body)?;

    let expires_at = state
        .broker
        .heartbeat(job_id, req.lease_token, req.extend_seconds)
        .await?;

    Ok(Json(serde_json::json!({ "expires_at": expires_at })))
}

async fn complete(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<LifecycleAck>, ApiError> {
    auth::worker_tenant(&state, &headers, &body).await?;
    let req: CompleteRequest = parse_body(&body)?;

    let job = state
        .broker
        .complete(
            job_id,
            req.result,
            Some(req.lease_token),
            req.idempotency_key.as_deref(),
        )
        .await?;

    Ok(Json(LifecycleAck {
        job_id: job.id,
        job_status: job.status,
    }))
}

async fn fail(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<LifecycleAck>, ApiError> {
    auth::worker_tenant(&state, &headers, &body).await?;
    let req: FailRequest = parse_body(&body)?;

    let job = state
        .broker
        .fail(job_id, &req.error, Some(req.lease_token))
        .await?;

    Ok(Json(LifecycleAck {
        job_id: job.id,
        job_status: job.status,
    }))
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidRequest(format!("invalid JSON: {e}")))
}
