use thiserror::Error;

use crate::types::JobStatus;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for store and runtime operations
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {job_id} is not reserved (status: {status})")]
    NotReserved { job_id: String, status: JobStatus },

    #[error("Job {job_id} is reserved by another claim")]
    ReservationLost { job_id: String },

    #[error("Handler already registered for job type: {0}")]
    HandlerAlreadyRegistered(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Why a handler invocation did not produce a verdict.
///
/// Every variant is handled the same way by the runtime: the job is
/// rescheduled after the default backoff.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),

    #[error("Job canceled")]
    Canceled,

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("No handler registered for job type: {0}")]
    UnknownJobType(String),
}

impl JobError {
    /// Wrap any displayable error
    pub fn failed(msg: impl std::fmt::Display) -> Self {
        Self::Failed(msg.to_string())
    }

    /// Get the error message
    pub fn message(&self) -> String {
        self.to_string()
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
