//! Worker SDK for the Relay job broker.
//!
//! `WorkerClient` speaks the signed worker protocol (poll, heartbeat,
//! complete, fail); `WorkerRunner` drives a `JobHandler` through the full
//! lease lifecycle with a background heartbeat per job.

pub mod client;
pub mod runner;

pub use client::{JobAssignment, WorkerClient};
pub use runner::{JobHandler, WorkerRunner};
