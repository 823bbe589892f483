//! API routes.

pub mod admin;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod workers;

use axum::Router;

use crate::AppState;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_router(state.clone()))
        .merge(metrics::router())
        .merge(health::router())
        .with_state(state)
}

fn api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/workers", workers::router())
        .nest("/admin", admin::router())
        .with_state(state)
}
