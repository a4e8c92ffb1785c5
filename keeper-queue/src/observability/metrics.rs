use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Per-job-type counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobTypeMetrics {
    pub enqueued: u64,
    pub claimed: u64,
    pub rescheduled: u64,
    pub retried: u64,
    pub completed: u64,
    pub failed: u64,
    pub panicked: u64,
}

/// Live counters for the worker runtime
#[derive(Debug, Default)]
pub struct LiveMetrics {
    totals: Mutex<JobTypeMetrics>,
    reclaimed: AtomicU64,
    per_type: Mutex<HashMap<String, JobTypeMetrics>>,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record<F>(&self, job_type: &str, f: F)
    where
        F: Fn(&mut JobTypeMetrics),
    {
        f(&mut self.totals.lock());
        f(self.per_type.lock().entry(job_type.to_string()).or_default());
    }

    pub(crate) fn add_reclaimed(&self, count: u64) {
        self.reclaimed.fetch_add(count, Ordering::Relaxed);
    }

    /// Counters summed over all job types
    pub fn totals(&self) -> JobTypeMetrics {
        *self.totals.lock()
    }

    /// Reservations returned to Pending by the reaper
    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }

    /// Get metrics for a specific job type
    pub fn job_type_metrics(&self, job_type: &str) -> Option<JobTypeMetrics> {
        self.per_type.lock().get(job_type).copied()
    }
}
