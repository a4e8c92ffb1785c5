use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, NewJob, ReservationId};

/// Job status lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Waiting for `due_at`
    Pending,

    /// Claimed by a worker
    Reserved,

    /// Completed successfully (terminal)
    Done,

    /// Failed permanently (terminal)
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Get the status name as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reserved => "reserved",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored status name
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "reserved" => Some(Self::Reserved),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job record - mutable runtime state stored by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier
    pub id: JobId,

    /// Queue the job lives on
    pub queue: String,

    /// Job type for handler dispatch
    pub job_type: String,

    /// Opaque payload
    pub payload: Vec<u8>,

    /// Current job status
    pub status: JobStatus,

    /// Earliest time the job may be claimed
    pub due_at: DateTime<Utc>,

    /// Number of reschedules so far (starts at 0)
    pub attempt: u32,

    /// When the current reservation lapses (if reserved)
    pub reserved_until: Option<DateTime<Utc>>,

    /// Claim that currently owns the job (if reserved)
    pub reservation: Option<ReservationId>,

    /// Last retry cause or failure reason
    pub last_error: Option<String>,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    /// When the job was last updated
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a Pending record from submission data
    pub fn new(job: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id: job.id,
            queue: job.queue,
            job_type: job.job_type,
            payload: job.payload,
            status: JobStatus::Pending,
            due_at: job.due_at,
            attempt: 0,
            reserved_until: None,
            reservation: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending and due on `queue` at `now`
    pub fn is_claimable(&self, queue: &str, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.queue == queue && self.due_at <= now
    }

    /// Reserved with a reservation that lapsed before `now`
    pub fn reservation_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.reserved_until) {
            (JobStatus::Reserved, Some(until)) => until < now,
            _ => false,
        }
    }

    /// Reserve for a worker
    pub fn reserve(&mut self, reservation: ReservationId, now: DateTime<Utc>, reserved_until: DateTime<Utc>) {
        self.status = JobStatus::Reserved;
        self.reserved_until = Some(reserved_until);
        self.reservation = Some(reservation);
        self.updated_at = now;
    }

    /// Reserved, and by this claim
    pub fn is_held_by(&self, reservation: &ReservationId) -> bool {
        self.status == JobStatus::Reserved && self.reservation.as_ref() == Some(reservation)
    }

    /// Return to Pending with a new due time
    pub fn reschedule(&mut self, next_due_at: DateTime<Utc>, error: Option<String>, now: DateTime<Utc>) {
        self.status = JobStatus::Pending;
        self.due_at = next_due_at;
        self.attempt += 1;
        self.reserved_until = None;
        self.reservation = None;
        if error.is_some() {
            self.last_error = error;
        }
        self.updated_at = now;
    }

    /// Complete the job
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Done;
        self.reserved_until = None;
        self.reservation = None;
        self.updated_at = now;
    }

    /// Fail the job permanently
    pub fn fail(&mut self, reason: String, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.last_error = Some(reason);
        self.reserved_until = None;
        self.reservation = None;
        self.updated_at = now;
    }
}
