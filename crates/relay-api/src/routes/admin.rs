//! Operator endpoints: tenant administration and manual reaping.
//!
//! These sit behind the deployment's internal network boundary; tenant
//! creation is the bootstrap surface that mints API keys in the first place.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use relay_db::models::Tenant;
use relay_db::{NewTenant, TenantRepo};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/requeue_expired", post(requeue_expired))
        .route("/tenants", get(list_tenants).post(create_tenant))
}

async fn requeue_expired(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let limit = state.broker.config().reaper_batch_limit;
    let count = state.broker.requeue_expired(limit).await?;
    Ok(Json(json!({ "requeued_count": count })))
}

#[derive(Debug, Deserialize)]
struct CreateTenantRequest {
    id: String,
    name: String,
    #[serde(default = "default_weight")]
    weight: i32,
    #[serde(default = "default_max_inflight")]
    max_inflight: i32,
    /// Omitted keys are minted server-side and returned once here.
    api_key: Option<String>,
}

fn default_weight() -> i32 {
    1
}

fn default_max_inflight() -> i32 {
    100
}

#[derive(Debug, Serialize)]
struct TenantResponse {
    id: String,
    name: String,
    weight: i32,
    max_inflight: i32,
    api_key: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<Tenant> for TenantResponse {
    fn from(tenant: Tenant) -> Self {
        Self {
            id: tenant.id,
            name: tenant.name,
            weight: tenant.weight,
            max_inflight: tenant.max_inflight,
            api_key: tenant.api_key,
            created_at: tenant.created_at,
        }
    }
}

async fn create_tenant(
    State(state): State<AppState>,
    Json(req): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<TenantResponse>), ApiError> {
    if req.weight < 1 {
        return Err(ApiError::InvalidRequest(
            "weight must be at least 1".to_string(),
        ));
    }
    if req.max_inflight < 1 {
        return Err(ApiError::InvalidRequest(
            "max_inflight must be at least 1".to_string(),
        ));
    }

    let api_key = req
        .api_key
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    let tenant = state
        .tenant_repo
        .create(NewTenant {
            id: req.id,
            name: req.name,
            weight: req.weight,
            max_inflight: req.max_inflight,
            api_key: Some(api_key),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(tenant.into())))
}

async fn list_tenants(
    State(state): State<AppState>,
) -> Result<Json<Vec<TenantResponse>>, ApiError> {
    let tenants = state.tenant_repo.list().await?;
    Ok(Json(tenants.into_iter().map(TenantResponse::from).collect()))
}
