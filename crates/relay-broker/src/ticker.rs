//! Periodic scheduler maintenance.
//!
//! Leader-only work per tick: promote due scheduled jobs, age priorities of
//! waiting work, reap expired leases. Every instance additionally recomputes
//! the queue gauges so its `/metrics` endpoint stays current. Errors are
//! absorbed per tick; a store error tears down the elector session and the
//! next tick reconnects.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::broker::JobBroker;
use crate::error::BrokerResult;
use crate::leader::LeaderElector;

pub struct SchedulerService {
    broker: Arc<JobBroker>,
    elector: LeaderElector,
}

impl SchedulerService {
    pub fn new(broker: Arc<JobBroker>, database_url: &str) -> Self {
        let elector = LeaderElector::new(database_url, broker.config().leader_lock_key);
        Self { broker, elector }
    }

    /// Run the tick loop forever. Spawn this on the runtime.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.broker.config().ticker_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                warn!(error = %e, "scheduler tick failed");
                self.elector.reset().await;
                self.broker.metrics().set_leader(false);
            }
        }
    }

    async fn tick(&mut self) -> BrokerResult<()> {
        let is_leader = self.elector.try_acquire().await?;
        self.broker.metrics().set_leader(is_leader);

        if is_leader {
            let promoted = promote_scheduled(self.broker.pool()).await?;
            let aged = age_priorities(self.broker.pool()).await?;
            if promoted > 0 || aged > 0 {
                debug!(promoted, aged, "ticker advanced queue state");
            }
            self.broker
                .requeue_expired(self.broker.config().reaper_batch_limit)
                .await?;
        }

        self.refresh_gauges().await?;
        Ok(())
    }

    /// Recompute `queue_depth` per tenant and the `jobs_inflight` gauge.
    async fn refresh_gauges(&self) -> Result<(), sqlx::Error> {
        let now = Utc::now();

        let depths: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT t.id, COUNT(j.id) FILTER (WHERE j.status = 'pending')
            FROM tenants t
            LEFT JOIN jobs j ON j.tenant_id = t.id
            GROUP BY t.id
            "#,
        )
        .fetch_all(self.broker.pool())
        .await?;
        for (tenant_id, depth) in depths {
            self.broker.metrics().set_queue_depth(&tenant_id, depth);
        }

        let inflight = self.broker.live_lease_count(now).await?;
        self.broker.metrics().set_inflight(inflight);
        Ok(())
    }
}

/// Promote due scheduled jobs to pending.
async fn promote_scheduled(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE jobs SET status = 'pending', updated_at = $1
        WHERE status = 'scheduled' AND available_at <= $1
        "#,
    )
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Priority aging: a pending job climbs one priority step per minute of
/// waiting, capped at 9. A job at priority p is bumped once it is older than
/// p + 1 minutes, which yields the one-step-per-minute ladder without any
/// per-job aging bookkeeping.
async fn age_priorities(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs SET priority = priority + 1
        WHERE status = 'pending'
          AND priority < 9
          AND created_at < (NOW() - make_interval(mins => priority + 1))
        "#,
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
