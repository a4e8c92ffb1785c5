use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;

/// Store-level state transitions, broadcast for observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job was inserted
    Enqueued {
        job_id: JobId,
        queue: String,
        job_type: String,
        at: DateTime<Utc>,
    },

    /// Job was reserved by a worker
    Claimed {
        job_id: JobId,
        reserved_until: DateTime<Utc>,
        at: DateTime<Utc>,
    },

    /// Job went back to Pending with a new due time
    Rescheduled {
        job_id: JobId,
        due_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },

    /// Job completed (terminal)
    Completed {
        job_id: JobId,
        at: DateTime<Utc>,
    },

    /// Job failed (terminal)
    Failed {
        job_id: JobId,
        reason: String,
        at: DateTime<Utc>,
    },

    /// Overdue reservation was returned to Pending
    Reclaimed {
        job_id: JobId,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Claimed { .. } => "claimed",
            Self::Rescheduled { .. } => "rescheduled",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Reclaimed { .. } => "reclaimed",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Enqueued { job_id, .. }
            | Self::Claimed { job_id, .. }
            | Self::Rescheduled { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Reclaimed { job_id, .. } => job_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Enqueued { at, .. }
            | Self::Claimed { at, .. }
            | Self::Rescheduled { at, .. }
            | Self::Completed { at, .. }
            | Self::Failed { at, .. }
            | Self::Reclaimed { at, .. } => at,
        }
    }
}
