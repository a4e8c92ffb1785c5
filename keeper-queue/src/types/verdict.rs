use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::time::add_duration;
use crate::JobError;

/// What a handler wants done with the job it just ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Work failed; make the job claimable again after `after`
    Retry { after: Duration, cause: JobError },

    /// Work succeeded; run again at `at`
    Reschedule { at: DateTime<Utc> },

    /// One-shot job finished
    Complete,

    /// One-shot job cannot succeed
    Fail { reason: String },
}

impl Verdict {
    pub fn retry(after: Duration, cause: JobError) -> Self {
        Self::Retry { after, cause }
    }

    pub fn reschedule_at(at: DateTime<Utc>) -> Self {
        Self::Reschedule { at }
    }

    /// Next run `interval` after the current time, not after the job's
    /// nominal due time
    pub fn reschedule_after(interval: Duration) -> Self {
        Self::Reschedule {
            at: add_duration(Utc::now(), interval),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail { reason: reason.into() }
    }

    /// Verdict name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Self::Retry { .. } => "retry",
            Self::Reschedule { .. } => "reschedule",
            Self::Complete => "complete",
            Self::Fail { .. } => "fail",
        }
    }
}
