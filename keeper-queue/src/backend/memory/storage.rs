use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    backend::{BoxStream, EnqueueOutcome, JobStore},
    time::add_duration,
    JobEvent, JobId, JobRecord, JobStatus, NewJob, QueueError, QueueResult, ReservationId,
};

/// In-memory job store for tests and development
///
/// Every transition happens under one write lock, which is what makes
/// `claim_due` atomic.
#[derive(Clone)]
pub struct MemoryJobStore {
    /// Job records indexed by id
    pub(crate) jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,

    /// How long a claim stays valid before the reaper may reclaim it
    reservation_timeout: Duration,

    /// Event broadcaster for observability
    event_broadcaster: broadcast::Sender<JobEvent>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::with_reservation_timeout(Duration::from_secs(600))
    }

    pub fn with_reservation_timeout(reservation_timeout: Duration) -> Self {
        let (event_broadcaster, _) = broadcast::channel(1000);

        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            reservation_timeout,
            event_broadcaster,
        }
    }

    /// Snapshot of every record (test and diagnostics helper)
    pub fn all_jobs(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.jobs.read().values().cloned().collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    /// Force a reservation to lapse (test helper)
    pub fn force_reservation_expiry(&self, id: &JobId) {
        let mut jobs = self.jobs.write();
        if let Some(record) = jobs.get_mut(id) {
            if record.status == JobStatus::Reserved {
                record.reserved_until = Some(Utc::now() - chrono::Duration::seconds(1));
            }
        }
    }

    fn emit(&self, event: JobEvent) {
        let _ = self.event_broadcaster.send(event);
    }

    /// Apply `f` to a record held by `reservation`, or explain why it cannot
    /// be applied
    fn with_reserved<F>(&self, id: &JobId, reservation: &ReservationId, f: F) -> QueueResult<()>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.jobs.write();
        let record = jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;

        if record.status != JobStatus::Reserved {
            return Err(QueueError::NotReserved {
                job_id: id.to_string(),
                status: record.status,
            });
        }

        if !record.is_held_by(reservation) {
            return Err(QueueError::ReservationLost {
                job_id: id.to_string(),
            });
        }

        f(record);
        Ok(())
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(&self, job: NewJob) -> QueueResult<EnqueueOutcome> {
        let now = Utc::now();
        let mut jobs = self.jobs.write();

        if jobs.contains_key(&job.id) {
            debug!(job_id = %job.id, "job already exists; enqueue is a no-op");
            return Ok(EnqueueOutcome::AlreadyExists(job.id));
        }

        let event = JobEvent::Enqueued {
            job_id: job.id.clone(),
            queue: job.queue.clone(),
            job_type: job.job_type.clone(),
            at: now,
        };
        let id = job.id.clone();
        jobs.insert(id.clone(), JobRecord::new(job, now));
        drop(jobs);

        self.emit(event);
        Ok(EnqueueOutcome::Created(id))
    }

    async fn claim_due(&self, queue: &str, now: DateTime<Utc>, limit: usize) -> QueueResult<Vec<JobRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let reserved_until = add_duration(now, self.reservation_timeout);
        let reservation = ReservationId::new();
        let mut jobs = self.jobs.write();

        let mut due: Vec<(DateTime<Utc>, JobId)> = jobs
            .values()
            .filter(|record| record.is_claimable(queue, now))
            .map(|record| (record.due_at, record.id.clone()))
            .collect();
        due.sort();
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            if let Some(record) = jobs.get_mut(&id) {
                record.reserve(reservation.clone(), now, reserved_until);
                claimed.push(record.clone());
            }
        }
        drop(jobs);

        for record in &claimed {
            self.emit(JobEvent::Claimed {
                job_id: record.id.clone(),
                reserved_until,
                at: now,
            });
        }

        Ok(claimed)
    }

    async fn complete(&self, id: &JobId, reservation: &ReservationId) -> QueueResult<()> {
        let now = Utc::now();
        self.with_reserved(id, reservation, |record| record.complete(now))?;
        self.emit(JobEvent::Completed {
            job_id: id.clone(),
            at: now,
        });
        Ok(())
    }

    async fn fail(&self, id: &JobId, reservation: &ReservationId, reason: String) -> QueueResult<()> {
        let now = Utc::now();
        let event_reason = reason.clone();
        self.with_reserved(id, reservation, |record| record.fail(reason, now))?;
        self.emit(JobEvent::Failed {
            job_id: id.clone(),
            reason: event_reason,
            at: now,
        });
        Ok(())
    }

    async fn reschedule(
        &self,
        id: &JobId,
        reservation: &ReservationId,
        next_due_at: DateTime<Utc>,
        error: Option<String>,
    ) -> QueueResult<()> {
        let now = Utc::now();
        self.with_reserved(id, reservation, |record| record.reschedule(next_due_at, error, now))?;
        self.emit(JobEvent::Rescheduled {
            job_id: id.clone(),
            due_at: next_due_at,
            at: now,
        });
        Ok(())
    }

    async fn get(&self, id: &JobId) -> QueueResult<JobRecord> {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> QueueResult<usize> {
        let mut jobs = self.jobs.write();
        let mut reclaimed = Vec::new();

        for record in jobs.values_mut() {
            if record.reservation_expired(now) {
                record.reschedule(now, Some("Reservation expired".to_string()), now);
                reclaimed.push(record.id.clone());
            }
        }
        drop(jobs);

        for job_id in &reclaimed {
            self.emit(JobEvent::Reclaimed {
                job_id: job_id.clone(),
                at: now,
            });
        }

        Ok(reclaimed.len())
    }

    fn event_stream(&self) -> BoxStream<JobEvent> {
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};

        let receiver = self.event_broadcaster.subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|result| result.ok());

        Box::pin(stream)
    }
}
