//! Worker runner: poll, execute, report.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client::{JobAssignment, WorkerClient};

/// Application callback executed once per leased job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> anyhow::Result<Value>;
}

/// Drives a handler through the lease lifecycle.
///
/// Each claimed job gets a background heartbeat task that renews the lease
/// until the job settles; the task is aborted once complete/fail has been
/// reported. A worker that dies mid-job simply stops heartbeating and the
/// broker's reaper requeues the work.
pub struct WorkerRunner {
    client: Arc<WorkerClient>,
    handler: Arc<dyn JobHandler>,
    idle_wait: Duration,
    heartbeat_interval: Duration,
}

impl WorkerRunner {
    pub fn new(client: Arc<WorkerClient>, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            client,
            handler,
            idle_wait: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(10),
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Run the poll loop. Spawn this on the runtime.
    pub async fn run(&self) {
        info!(worker_id = %self.client.worker_id(), "worker started");

        loop {
            match self.client.poll().await {
                Some(assignment) => self.process(assignment).await,
                None => sleep(self.idle_wait).await,
            }
        }
    }

    async fn process(&self, assignment: JobAssignment) {
        let job_id = assignment.job.id;
        let lease_token = assignment.lease_token;
        info!(job_id = %job_id, "leased job");

        let heartbeat = tokio::spawn(heartbeat_loop(
            self.client.clone(),
            job_id,
            lease_token,
            self.heartbeat_interval,
        ));

        match self.handler.handle(assignment.job.payload.clone()).await {
            Ok(result) => {
                if self.client.complete(job_id, lease_token, result).await {
                    info!(job_id = %job_id, "job completed");
                } else {
                    error!(
                        job_id = %job_id,
                        "handler succeeded but completion was rejected; the lease may be requeued"
                    );
                }
            }
            Err(e) => {
                let message = e.to_string();
                error!(job_id = %job_id, error = %message, "job failed");
                if !self.client.fail(job_id, lease_token, &message).await {
                    error!(job_id = %job_id, "failed to report job failure");
                }
            }
        }

        heartbeat.abort();
    }
}

async fn heartbeat_loop(
    client: Arc<WorkerClient>,
    job_id: Uuid,
    lease_token: Uuid,
    interval: Duration,
) {
    loop {
        sleep(interval).await;
        if !client.heartbeat(job_id, lease_token).await {
            // Expired or canceled lease: stop renewing and let the poll
            // loop's completion attempt surface the conflict.
            warn!(job_id = %job_id, "heartbeat rejected, stopping renewals");
            break;
        }
    }
}
