use tokio_util::sync::CancellationToken;

use super::{JobId, JobRecord};

/// Per-invocation context handed to a job handler
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job being executed
    pub job_id: JobId,

    /// Queue the job was claimed from
    pub queue: String,

    /// Job type used for handler dispatch
    pub job_type: String,

    /// Number of times this job has been rescheduled so far
    pub attempt: u32,

    /// Cancelled when the runtime shuts down
    pub cancellation: CancellationToken,
}

impl JobContext {
    /// Build a context for a claimed job
    pub fn for_job(job: &JobRecord, cancellation: CancellationToken) -> Self {
        Self {
            job_id: job.id.clone(),
            queue: job.queue.clone(),
            job_type: job.job_type.clone(),
            attempt: job.attempt,
            cancellation,
        }
    }

    /// Check whether shutdown has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once shutdown has been requested
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}
