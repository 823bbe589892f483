//! Application state.

use std::sync::Arc;

use relay_broker::{BrokerConfig, JobBroker, Metrics};
use relay_db::{PgJobRepo, PgTenantRepo};
use sqlx::PgPool;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub broker: Arc<JobBroker>,
    pub tenant_repo: Arc<PgTenantRepo>,
    pub job_repo: Arc<PgJobRepo>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(pool: PgPool, config: BrokerConfig, metrics: Arc<Metrics>) -> Self {
        let broker = Arc::new(JobBroker::new(pool.clone(), config, metrics.clone()));
        let tenant_repo = Arc::new(PgTenantRepo::new(pool.clone()));
        let job_repo = Arc::new(PgJobRepo::new(pool.clone()));

        Self {
            pool,
            broker,
            tenant_repo,
            job_repo,
            metrics,
        }
    }
}
