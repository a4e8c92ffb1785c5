pub mod metrics;

pub use metrics::{JobTypeMetrics, LiveMetrics};

use std::sync::Arc;

use tracing::debug;

use crate::JobId;

/// Runtime-side observability: counters plus debug logs per transition
#[derive(Clone, Default)]
pub struct ObservabilityLayer {
    metrics: Arc<LiveMetrics>,
}

impl ObservabilityLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self, job_id: &JobId, job_type: &str) {
        self.metrics.record(job_type, |m| m.enqueued += 1);
        debug!("Recorded job enqueued: {} ({})", job_id, job_type);
    }

    pub fn record_claimed(&self, job_id: &JobId, job_type: &str) {
        self.metrics.record(job_type, |m| m.claimed += 1);
        debug!("Recorded job claimed: {} ({})", job_id, job_type);
    }

    pub fn record_rescheduled(&self, job_id: &JobId, job_type: &str) {
        self.metrics.record(job_type, |m| m.rescheduled += 1);
        debug!("Recorded job rescheduled: {} ({})", job_id, job_type);
    }

    pub fn record_retried(&self, job_id: &JobId, job_type: &str) {
        self.metrics.record(job_type, |m| m.retried += 1);
        debug!("Recorded job retrying: {} ({})", job_id, job_type);
    }

    pub fn record_completed(&self, job_id: &JobId, job_type: &str) {
        self.metrics.record(job_type, |m| m.completed += 1);
        debug!("Recorded job completed: {} ({})", job_id, job_type);
    }

    pub fn record_failed(&self, job_id: &JobId, job_type: &str) {
        self.metrics.record(job_type, |m| m.failed += 1);
        debug!("Recorded job failed: {} ({})", job_id, job_type);
    }

    pub fn record_panicked(&self, job_id: &JobId, job_type: &str) {
        self.metrics.record(job_type, |m| m.panicked += 1);
        debug!("Recorded handler panic: {} ({})", job_id, job_type);
    }

    pub fn record_reclaimed(&self, count: usize) {
        self.metrics.add_reclaimed(count as u64);
    }

    /// Get live metrics
    pub fn metrics(&self) -> &LiveMetrics {
        &self.metrics
    }
}
