//! Scheduling and lease core for the Relay job broker.
//!
//! Everything that touches job lifecycle state lives here: the atomic lease
//! engine (skip-locked claim), the weighted-fair dispatcher, the lifecycle
//! commands (complete / fail / heartbeat / cancel / requeue-expired), the
//! scheduler ticker with single-leader election, and the transactional
//! outbox processor. The database is the single source of truth; every
//! command is one transaction.

pub mod broker;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod leader;
pub mod lease;
pub mod metrics;
pub mod outbox;
pub mod ticker;

mod cancel;
mod complete;
mod fail;
mod heartbeat;
mod requeue;

pub use broker::JobBroker;
pub use config::BrokerConfig;
pub use error::{BrokerError, BrokerResult};
pub use leader::LeaderElector;
pub use lease::LeasedJob;
pub use metrics::Metrics;
pub use outbox::{EventPublisher, LogPublisher, OutboxProcessor};
pub use ticker::SchedulerService;
