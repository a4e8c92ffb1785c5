use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;

/// Submission data for a job that does not exist yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    /// Caller-chosen id; enqueueing an id that already exists is a no-op
    pub id: JobId,

    /// Target queue name
    pub queue: String,

    /// Job type identifier for dispatch
    pub job_type: String,

    /// Opaque payload bytes
    pub payload: Vec<u8>,

    /// When the job first becomes claimable
    pub due_at: DateTime<Utc>,
}

impl NewJob {
    /// Create a job that is due immediately with an empty payload
    pub fn new(id: impl Into<JobId>, queue: impl Into<String>, job_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            queue: queue.into(),
            job_type: job_type.into(),
            payload: Vec::new(),
            due_at: Utc::now(),
        }
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Set when the job should first run
    pub fn with_due_at(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = due_at;
        self
    }
}
