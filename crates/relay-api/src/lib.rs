//! HTTP edge for the Relay job broker.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::AppState;
