//! Prometheus metrics for the broker.
//!
//! One `Metrics` handle owns its registry, so construction is idempotent
//! across process restarts; gauges are recomputed by the ticker on every
//! instance, counters are bumped at the command sites.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, Opts, Registry,
    TextEncoder,
};

/// Histogram buckets for queue wait (available_at to lease), in seconds.
const START_DELAY_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0];

/// Histogram buckets for execution time (lease to completion), in seconds.
const DURATION_BUCKETS: &[f64] = &[0.1, 1.0, 5.0, 10.0, 60.0, 120.0];

/// Metrics handle containing all broker instruments.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    jobs_leased: CounterVec,
    jobs_completed: CounterVec,
    jobs_failed: CounterVec,
    jobs_reaped: Counter,
    outbox_published: Counter,

    queue_depth: GaugeVec,
    jobs_inflight: Gauge,
    leader_status: Gauge,

    start_delay: Histogram,
    job_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let jobs_leased = CounterVec::new(
            Opts::new("job_lease_total", "Jobs leased to workers"),
            &["tenant_id"],
        )?;
        let jobs_completed = CounterVec::new(
            Opts::new("job_complete_total", "Jobs completed successfully"),
            &["tenant_id"],
        )?;
        let jobs_failed = CounterVec::new(
            Opts::new("job_failures_total", "Job failures by outcome"),
            &["tenant_id", "kind"],
        )?;
        let jobs_reaped = Counter::new("job_reaped_total", "Jobs recovered by the reaper")?;
        let outbox_published =
            Counter::new("outbox_published_total", "Outbox events published downstream")?;

        let queue_depth = GaugeVec::new(
            Opts::new("job_queue_depth", "Jobs in the pending state"),
            &["tenant_id"],
        )?;
        let jobs_inflight = Gauge::new("jobs_inflight", "Jobs with a live lease")?;
        let leader_status = Gauge::new(
            "instance_leader_status",
            "Whether this instance holds the scheduler leader lock",
        )?;

        let start_delay = Histogram::with_opts(
            HistogramOpts::new("job_start_delay_seconds", "Time from available_at to lease")
                .buckets(START_DELAY_BUCKETS.to_vec()),
        )?;
        let job_duration = Histogram::with_opts(
            HistogramOpts::new("job_duration_seconds", "Time from lease to completion")
                .buckets(DURATION_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(jobs_leased.clone()))?;
        registry.register(Box::new(jobs_completed.clone()))?;
        registry.register(Box::new(jobs_failed.clone()))?;
        registry.register(Box::new(jobs_reaped.clone()))?;
        registry.register(Box::new(outbox_published.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(jobs_inflight.clone()))?;
        registry.register(Box::new(leader_status.clone()))?;
        registry.register(Box::new(start_delay.clone()))?;
        registry.register(Box::new(job_duration.clone()))?;

        Ok(Self {
            registry,
            jobs_leased,
            jobs_completed,
            jobs_failed,
            jobs_reaped,
            outbox_published,
            queue_depth,
            jobs_inflight,
            leader_status,
            start_delay,
            job_duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(buf)
    }

    pub fn record_lease(&self, tenant_id: &str, start_delay_seconds: f64) {
        self.jobs_leased.with_label_values(&[tenant_id]).inc();
        if start_delay_seconds > 0.0 {
            self.start_delay.observe(start_delay_seconds);
        }
    }

    pub fn record_completion(&self, tenant_id: &str, duration_seconds: Option<f64>) {
        self.jobs_completed.with_label_values(&[tenant_id]).inc();
        if let Some(secs) = duration_seconds {
            if secs > 0.0 {
                self.job_duration.observe(secs);
            }
        }
    }

    pub fn record_failure(&self, tenant_id: &str, dead_lettered: bool) {
        let kind = if dead_lettered { "final" } else { "retryable" };
        self.jobs_failed.with_label_values(&[tenant_id, kind]).inc();
    }

    pub fn record_reaped(&self, count: u64) {
        self.jobs_reaped.inc_by(count as f64);
    }

    pub fn record_outbox_published(&self, count: u64) {
        self.outbox_published.inc_by(count as f64);
    }

    pub fn set_queue_depth(&self, tenant_id: &str, depth: i64) {
        self.queue_depth
            .with_label_values(&[tenant_id])
            .set(depth as f64);
    }

    pub fn set_inflight(&self, count: i64) {
        self.jobs_inflight.set(count as f64);
    }

    pub fn set_leader(&self, is_leader: bool) {
        self.leader_status.set(if is_leader { 1.0 } else { 0.0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_succeeds_per_handle() {
        // Two handles must not collide: each owns a private registry.
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_lease("t1", 0.5);
        b.record_lease("t1", 0.5);
    }

    #[test]
    fn encode_renders_text_format() {
        let m = Metrics::new().unwrap();
        m.set_leader(true);
        m.set_queue_depth("acme", 7);
        let text = String::from_utf8(m.encode().unwrap()).unwrap();
        assert!(text.contains("instance_leader_status 1"));
        assert!(text.contains("job_queue_depth"));
    }
}
