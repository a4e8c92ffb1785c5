//! # keeper-queue: durable background jobs
//!
//! Jobs are rows in a [`JobStore`]. A [`JobRuntime`] polls each queue on a
//! fixed interval, atomically claims the jobs that are due, runs the handler
//! registered for the job's type and turns the handler's [`Verdict`] into a
//! store transition:
//!
//! - `Retry { after, cause }` - back to Pending, due `now + after`
//! - `Reschedule { at }` - back to Pending, due `at`
//! - `Complete` / `Fail { reason }` - terminal, for one-shot jobs
//!
//! Handler errors and panics never escape the poll loop; they become a
//! retry with the runtime's default backoff. There is no attempt limit, so
//! a job with a permanently broken dependency keeps retrying at that
//! cadence and only shows up in logs and [`LiveMetrics`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keeper_queue::prelude::*;
//! use keeper_queue::backend::memory::MemoryJobStore;
//!
//! # async fn run() -> QueueResult<()> {
//! let runtime = JobRuntime::new(Arc::new(MemoryJobStore::new()), RuntimeConfig::default());
//!
//! runtime.register_handler("heartbeat", handler_fn(|_ctx, _job| async move {
//!     Ok(Verdict::reschedule_after(std::time::Duration::from_secs(60)))
//! }))?;
//!
//! // Seeding is idempotent: a second call reports AlreadyExists.
//! runtime.enqueue(NewJob::new("heartbeat", "maintenance", "heartbeat")).await?;
//!
//! let handle = runtime.start(vec!["maintenance".to_string()]);
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod job;
pub mod observability;
pub mod runtime;
pub mod types;

mod time;

pub use backend::{BoxStream, EnqueueOutcome, JobStore, ReservationReaper};
pub use error::{JobError, QueueError, QueueResult};
pub use job::{handler_fn, FnHandler, JobHandler, JobRegistry};
pub use observability::{LiveMetrics, ObservabilityLayer};
pub use runtime::{JobRuntime, RuntimeConfig, RuntimeHandle, MIN_INTERVAL};
pub use types::{JobContext, JobEvent, JobId, JobRecord, JobStatus, NewJob, ReservationId, Verdict};

#[cfg(feature = "memory")]
pub use backend::memory::MemoryJobStore;

#[cfg(feature = "sqlite")]
pub use backend::sqlite::SqliteJobStore;

/// Everything a job handler author needs.
pub mod prelude {
    pub use crate::{
        handler_fn, EnqueueOutcome, JobContext, JobError, JobHandler, JobId, JobRecord,
        JobRuntime, JobStore, NewJob, QueueResult, RuntimeConfig, Verdict,
    };

    pub use async_trait::async_trait;
}
