#[cfg(feature = "memory")]
pub mod memory;
pub mod reaper;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use std::pin::Pin;

use crate::{JobEvent, JobId, JobRecord, NewJob, QueueResult, ReservationId};

pub use reaper::ReservationReaper;

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Result of an enqueue call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new Pending job was inserted
    Created(JobId),

    /// A job with this id already exists (in any status); nothing changed
    AlreadyExists(JobId),
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Created(id) | Self::AlreadyExists(id) => id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Durable job table
///
/// Implementations must make `claim_due` atomic: a job handed to one caller
/// is never handed to another until it has been rescheduled or its
/// reservation has been reclaimed. Every claim stamps the records it
/// returns with a fresh [`ReservationId`]; `complete`, `fail` and
/// `reschedule` only apply while that same claim still holds the job and
/// report [`QueueError::ReservationLost`](crate::QueueError::ReservationLost)
/// otherwise.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert the job unless its id is already present
    async fn enqueue(&self, job: NewJob) -> QueueResult<EnqueueOutcome>;

    /// Reserve up to `limit` Pending jobs on `queue` with `due_at <= now`,
    /// earliest due first
    async fn claim_due(&self, queue: &str, now: DateTime<Utc>, limit: usize) -> QueueResult<Vec<JobRecord>>;

    /// Reserved -> Done
    async fn complete(&self, id: &JobId, reservation: &ReservationId) -> QueueResult<()>;

    /// Reserved -> Failed
    async fn fail(&self, id: &JobId, reservation: &ReservationId, reason: String) -> QueueResult<()>;

    /// Reserved -> Pending with a new due time and incremented attempt
    async fn reschedule(
        &self,
        id: &JobId,
        reservation: &ReservationId,
        next_due_at: DateTime<Utc>,
        error: Option<String>,
    ) -> QueueResult<()>;

    /// Get the full job record
    async fn get(&self, id: &JobId) -> QueueResult<JobRecord>;

    /// Return jobs whose reservation lapsed before `now` to Pending, due now
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> QueueResult<usize>;

    /// Event stream for observability
    fn event_stream(&self) -> BoxStream<JobEvent>;
}
