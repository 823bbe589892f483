//! Core domain logic for the Relay job broker.
//!
//! This crate contains:
//! - Retry/backoff policy for failed jobs
//! - Cron schedule evaluation for recurring jobs
//!
//! Everything here is pure computation; the database-facing layers live in
//! `relay-db` and `relay-broker`.

pub mod retry;
pub mod schedule;

pub use retry::BackoffPolicy;
pub use schedule::{next_fire_time, ScheduleError};
