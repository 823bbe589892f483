//! Transactional outbox processor.
//!
//! Outbox rows are written in the same transaction as the state change they
//! report, so a committed transition always has its event durably queued and
//! a rolled-back one leaves nothing behind. This processor drains pending
//! rows in batches under skip-locked row locks and marks them published
//! atomically with the batch commit.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use relay_db::models::OutboxEvent;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::BrokerConfig;
use crate::metrics::Metrics;

/// Downstream bus boundary. The broker only guarantees durable queueing;
/// delivery semantics belong to the implementation behind this trait.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OutboxEvent) -> anyhow::Result<()>;
}

/// Default publisher: logs each event. Stands in for the real message bus.
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &OutboxEvent) -> anyhow::Result<()> {
        info!(
            event_id = event.id,
            event_type = %event.event_type,
            payload = %event.payload,
            "outbox publish"
        );
        Ok(())
    }
}

pub struct OutboxProcessor {
    pool: PgPool,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
    interval: std::time::Duration,
    batch_size: i64,
}

impl OutboxProcessor {
    pub fn new(
        pool: PgPool,
        config: &BrokerConfig,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            pool,
            publisher,
            metrics,
            interval: config.outbox_interval,
            batch_size: config.outbox_batch_size,
        }
    }

    /// Run the publish loop forever. A busy batch is followed immediately by
    /// the next; an idle or failing one sleeps for the interval.
    pub async fn run(self) {
        loop {
            match self.process_batch().await {
                Ok(0) => tokio::time::sleep(self.interval).await,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "outbox batch failed");
                    tokio::time::sleep(self.interval).await;
                }
            }
        }
    }

    /// Publish one batch of pending rows. Returns how many rows were picked
    /// up (published or not); publish failures stay pending for the next
    /// tick.
    pub async fn process_batch(&self) -> Result<usize, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let events: Vec<OutboxEvent> = sqlx::query_as(
            r#"
            SELECT * FROM outbox_events
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(self.batch_size)
        .fetch_all(&mut *tx)
        .await?;

        if events.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut published = 0u64;
        for event in &events {
            match self.publisher.publish(event).await {
                Ok(()) => {
                    sqlx::query(
                        "UPDATE outbox_events SET status = 'published', published_at = $2 WHERE id = $1",
                    )
                    .bind(event.id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                    published += 1;
                }
                Err(e) => {
                    warn!(event_id = event.id, error = %e, "failed to publish outbox event");
                }
            }
        }

        tx.commit().await?;

        self.metrics.record_outbox_published(published);
        Ok(events.len())
    }
}
