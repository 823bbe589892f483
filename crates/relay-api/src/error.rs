//! API error handling.
//!
//! The variant set mirrors the broker's failure modes rather than generic
//! HTTP buckets: lease conflicts get their own 409 so workers know to
//! abandon execution, and authentication distinguishes "could not verify
//! you" (401) from "verified, but not yours" (403).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_broker::BrokerError;
use relay_db::DbError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    /// Unknown job or tenant, or a job hidden from the calling tenant.
    NotFound(String),
    /// Malformed body, out-of-range field, or a transition the job state
    /// machine forbids.
    InvalidRequest(String),
    /// Missing or unverifiable credentials (worker signature, API key).
    Unauthenticated(String),
    /// Valid credentials that do not grant the requested access.
    Forbidden(String),
    /// The lease is gone: expired, reaped, or superseded. The worker should
    /// abandon execution instead of retrying the request.
    LeaseConflict(String),
    /// A uniqueness rule rejected the write.
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::LeaseConflict(msg) | ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::TenantNotFound(_) | DbError::JobNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            DbError::UnknownApiKey => ApiError::Forbidden(err.to_string()),
            DbError::TenantExists(_) | DbError::IdempotencyKeyTaken(_) => {
                ApiError::Conflict(err.to_string())
            }
            DbError::Database(_) | DbError::Migration(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::JobNotFound(id) => ApiError::NotFound(format!("job {} not found", id)),
            BrokerError::InvalidJobState(msg) => ApiError::InvalidRequest(msg),
            BrokerError::LeaseNotFound(_) | BrokerError::LeaseExpired(_) => {
                ApiError::LeaseConflict(err.to_string())
            }
            BrokerError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn lease_errors_map_to_conflict() {
        let resp = ApiError::from(BrokerError::LeaseNotFound(Uuid::nil())).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let resp = ApiError::from(BrokerError::LeaseExpired("t".into())).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn state_errors_map_to_bad_request() {
        let resp = ApiError::from(BrokerError::InvalidJobState("nope".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_entities_map_to_not_found() {
        let resp = ApiError::from(BrokerError::JobNotFound(Uuid::nil())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = ApiError::from(DbError::TenantNotFound("acme".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn bad_api_key_maps_to_forbidden() {
        let resp = ApiError::from(DbError::UnknownApiKey).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn duplicate_writes_map_to_conflict() {
        let resp = ApiError::from(DbError::TenantExists("acme".into())).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn auth_failures_split_into_401_and_403() {
        let resp = ApiError::Unauthenticated("bad signature".into()).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let resp = ApiError::Forbidden("not your queue".into()).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
