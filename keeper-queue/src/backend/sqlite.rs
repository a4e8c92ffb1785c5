use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

use crate::{
    backend::{BoxStream, EnqueueOutcome, JobStore},
    time::{add_duration, from_millis, to_millis},
    JobEvent, JobId, JobRecord, JobStatus, NewJob, QueueError, QueueResult, ReservationId,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS keeper_jobs (
    id TEXT PRIMARY KEY NOT NULL,
    queue TEXT NOT NULL,
    job_type TEXT NOT NULL,
    payload BLOB NOT NULL,
    status TEXT NOT NULL,
    due_at INTEGER NOT NULL,
    attempt INTEGER NOT NULL DEFAULT 0,
    reserved_until INTEGER,
    reservation TEXT,
    last_error TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS keeper_jobs_claim_idx ON keeper_jobs (queue, status, due_at);
"#;

const COLUMNS: &str =
    "id, queue, job_type, payload, status, due_at, attempt, reserved_until, reservation, last_error, created_at, updated_at";

/// SQLite-backed job store; jobs survive process restarts
///
/// Claims are a single `UPDATE ... RETURNING` statement, so two workers
/// (or two processes sharing the file) can never reserve the same row.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
    reservation_timeout: Duration,
    event_broadcaster: broadcast::Sender<JobEvent>,
}

impl SqliteJobStore {
    /// Connect to `url` (e.g. `sqlite://keeper.db?mode=rwc`) and create the
    /// schema if missing
    pub async fn connect(url: &str) -> QueueResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(url)
            .await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database (tests and development)
    pub async fn in_memory() -> QueueResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    /// Use an existing pool
    pub async fn from_pool(pool: SqlitePool) -> QueueResult<Self> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        let (event_broadcaster, _) = broadcast::channel(1000);

        Ok(Self {
            pool,
            reservation_timeout: Duration::from_secs(600),
            event_broadcaster,
        })
    }

    pub fn with_reservation_timeout(mut self, reservation_timeout: Duration) -> Self {
        self.reservation_timeout = reservation_timeout;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn emit(&self, event: JobEvent) {
        let _ = self.event_broadcaster.send(event);
    }

    /// Work out why an update guarded by the claim's reservation touched no
    /// row
    async fn not_reserved(&self, id: &JobId) -> QueueError {
        match self.get(id).await {
            Ok(record) if record.status == JobStatus::Reserved => QueueError::ReservationLost {
                job_id: id.to_string(),
            },
            Ok(record) => QueueError::NotReserved {
                job_id: id.to_string(),
                status: record.status,
            },
            Err(e) => e,
        }
    }
}

fn row_to_record(row: &SqliteRow) -> QueueResult<JobRecord> {
    let status: String = row.try_get("status")?;
    let status = JobStatus::parse(&status)
        .ok_or_else(|| QueueError::Serialization(format!("Unknown job status: {}", status)))?;
    let attempt: i64 = row.try_get("attempt")?;
    let reserved_until: Option<i64> = row.try_get("reserved_until")?;
    let reservation: Option<String> = row.try_get("reservation")?;

    Ok(JobRecord {
        id: JobId(row.try_get("id")?),
        queue: row.try_get("queue")?,
        job_type: row.try_get("job_type")?,
        payload: row.try_get("payload")?,
        status,
        due_at: from_millis(row.try_get("due_at")?),
        attempt: u32::try_from(attempt).unwrap_or(u32::MAX),
        reserved_until: reserved_until.map(from_millis),
        reservation: reservation.map(ReservationId),
        last_error: row.try_get("last_error")?,
        created_at: from_millis(row.try_get("created_at")?),
        updated_at: from_millis(row.try_get("updated_at")?),
    })
}

#[async_trait]
impl JobStore for SqliteJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id, queue = %job.queue))]
    async fn enqueue(&self, job: NewJob) -> QueueResult<EnqueueOutcome> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO keeper_jobs (id, queue, job_type, payload, status, due_at, attempt, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7) \
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(job.id.as_str())
        .bind(&job.queue)
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(JobStatus::Pending.as_str())
        .bind(to_millis(job.due_at))
        .bind(to_millis(now))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!("job already exists; enqueue is a no-op");
            return Ok(EnqueueOutcome::AlreadyExists(job.id));
        }

        self.emit(JobEvent::Enqueued {
            job_id: job.id.clone(),
            queue: job.queue,
            job_type: job.job_type,
            at: now,
        });
        Ok(EnqueueOutcome::Created(job.id))
    }

    async fn claim_due(&self, queue: &str, now: DateTime<Utc>, limit: usize) -> QueueResult<Vec<JobRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let reserved_until = add_duration(now, self.reservation_timeout);
        let reservation = ReservationId::new();
        let sql = format!(
            "UPDATE keeper_jobs SET status = ?1, reserved_until = ?2, updated_at = ?3, reservation = ?7 \
             WHERE id IN ( \
                 SELECT id FROM keeper_jobs \
                 WHERE queue = ?4 AND status = ?5 AND due_at <= ?3 \
                 ORDER BY due_at ASC LIMIT ?6 \
             ) \
             RETURNING {}",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(JobStatus::Reserved.as_str())
            .bind(to_millis(reserved_until))
            .bind(to_millis(now))
            .bind(queue)
            .bind(JobStatus::Pending.as_str())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(reservation.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut claimed = rows.iter().map(row_to_record).collect::<QueueResult<Vec<_>>>()?;
        claimed.sort_by(|a, b| a.due_at.cmp(&b.due_at).then_with(|| a.id.cmp(&b.id)));

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
        let result = sqlx::query(
            "UPDATE keeper_jobs SET status = ?1, reserved_until = NULL, reservation = NULL, updated_at = ?2 \
             WHERE id = ?3 AND status = ?4 AND reservation = ?5",
        )
        .bind(JobStatus::Done.as_str())
        .bind(to_millis(now))
        .bind(id.as_str())
        .bind(JobStatus::Reserved.as_str())
        .bind(reservation.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.not_reserved(id).await);
        }

        self.emit(JobEvent::Completed {
            job_id: id.clone(),
            at: now,
        });
        Ok(())
    }

    async fn fail(&self, id: &JobId, reservation: &ReservationId, reason: String) -> QueueResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE keeper_jobs SET status = ?1, reserved_until = NULL, reservation = NULL, last_error = ?2, \
             updated_at = ?3 \
             WHERE id = ?4 AND status = ?5 AND reservation = ?6",
        )
        .bind(JobStatus::Failed.as_str())
        .bind(&reason)
        .bind(to_millis(now))
        .bind(id.as_str())
        .bind(JobStatus::Reserved.as_str())
        .bind(reservation.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.not_reserved(id).await);
        }

        self.emit(JobEvent::Failed {
            job_id: id.clone(),
            reason,
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
        let result = sqlx::query(
            "UPDATE keeper_jobs SET status = ?1, due_at = ?2, attempt = attempt + 1, reserved_until = NULL, \
             reservation = NULL, last_error = COALESCE(?3, last_error), updated_at = ?4 \
             WHERE id = ?5 AND status = ?6 AND reservation = ?7",
        )
        .bind(JobStatus::Pending.as_str())
        .bind(to_millis(next_due_at))
        .bind(error)
        .bind(to_millis(now))
        .bind(id.as_str())
        .bind(JobStatus::Reserved.as_str())
        .bind(reservation.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.not_reserved(id).await);
        }

        self.emit(JobEvent::Rescheduled {
            job_id: id.clone(),
            due_at: next_due_at,
            at: now,
        });
        Ok(())
    }

    async fn get(&self, id: &JobId) -> QueueResult<JobRecord> {
        let sql = format!("SELECT {} FROM keeper_jobs WHERE id = ?1", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        row_to_record(&row)
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> QueueResult<usize> {
        let rows = sqlx::query(
            "UPDATE keeper_jobs SET status = ?1, due_at = ?2, attempt = attempt + 1, reserved_until = NULL, \
             reservation = NULL, last_error = 'Reservation expired', updated_at = ?2 \
             WHERE status = ?3 AND reserved_until < ?2 \
             RETURNING id",
        )
        .bind(JobStatus::Pending.as_str())
        .bind(to_millis(now))
        .bind(JobStatus::Reserved.as_str())
        .fetch_all(&self.pool)
        .await?;

        for row in &rows {
            let id: String = row.try_get("id")?;
            self.emit(JobEvent::Reclaimed {
                job_id: JobId(id),
                at: now,
            });
        }

        Ok(rows.len())
    }

    fn event_stream(&self) -> BoxStream<JobEvent> {
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};

        let receiver = self.event_broadcaster.subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|result| result.ok());

        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        sqlx::raw_sql(SCHEMA).execute(store.pool()).await.unwrap();
    }

    #[tokio::test]
    async fn test_round_trips_record_fields() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        let due = Utc::now() - chrono::Duration::seconds(5);
        store
            .enqueue(NewJob::new("a", "default", "test_job").with_payload(vec![1, 2, 3]).with_due_at(due))
            .await
            .unwrap();

        let record = store.get(&JobId::from("a")).await.unwrap();
        assert_eq!(record.queue, "default");
        assert_eq!(record.job_type, "test_job");
        assert_eq!(record.payload, vec![1, 2, 3]);
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.due_at.timestamp_millis(), due.timestamp_millis());
        assert_eq!(record.attempt, 0);
        assert!(record.reserved_until.is_none());
        assert!(record.reservation.is_none());
    }
}
