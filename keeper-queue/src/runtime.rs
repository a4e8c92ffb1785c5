use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    backend::{EnqueueOutcome, JobStore, ReservationReaper},
    job::{JobHandler, JobRegistry},
    time::add_duration,
    JobContext, JobError, JobRecord, NewJob, ObservabilityLayer, QueueError, QueueResult, Verdict,
};

/// Configuration for the worker runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Time between claim attempts on each queue
    pub poll_interval: Duration,
    /// Maximum jobs claimed per queue per poll
    pub claim_limit: usize,
    /// Backoff applied when a handler errors, panics or is unknown
    pub default_backoff: Duration,
    /// Time between reservation reaper runs
    pub reaper_interval: Duration,
}

/// Shortest poll or reaper interval the runtime accepts
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

impl RuntimeConfig {
    /// Replace zero intervals and limits with usable values
    pub fn sanitized(mut self) -> Self {
        if self.poll_interval < MIN_INTERVAL {
            warn!("poll_interval {:?} is too short, using {:?}", self.poll_interval, MIN_INTERVAL);
            self.poll_interval = MIN_INTERVAL;
        }
        if self.reaper_interval < MIN_INTERVAL {
            warn!("reaper_interval {:?} is too short, using {:?}", self.reaper_interval, MIN_INTERVAL);
            self.reaper_interval = MIN_INTERVAL;
        }
        if self.claim_limit == 0 {
            warn!("claim_limit 0 would never claim a job, using 1");
            self.claim_limit = 1;
        }
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            claim_limit: 10,
            default_backoff: Duration::from_secs(300), // 5 minutes
            reaper_interval: Duration::from_secs(30),
        }
    }
}

/// Handle for the background loops started by [`JobRuntime::start`]
pub struct RuntimeHandle {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RuntimeHandle {
    /// Cancel every loop and in-flight handler context, then wait for the
    /// loops to exit
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Runtime task ended abnormally: {}", e);
            }
        }
        info!("Job runtime stopped");
    }

    /// Token cancelled on shutdown
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Polling job runtime: claims due jobs, dispatches them to handlers and
/// writes the verdict back to the store
#[derive(Clone)]
pub struct JobRuntime {
    store: Arc<dyn JobStore>,
    registry: Arc<RwLock<JobRegistry>>,
    observability: ObservabilityLayer,
    config: RuntimeConfig,
    shutdown: CancellationToken,
}

impl JobRuntime {
    pub fn new(store: Arc<dyn JobStore>, config: RuntimeConfig) -> Self {
        Self {
            store,
            registry: Arc::new(RwLock::new(JobRegistry::new())),
            observability: ObservabilityLayer::new(),
            config: config.sanitized(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Share an existing observability layer
    pub fn with_observability(mut self, observability: ObservabilityLayer) -> Self {
        self.observability = observability;
        self
    }

    /// Register the handler for a job type
    pub fn register_handler(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) -> QueueResult<()> {
        let job_type = job_type.into();
        self.registry.write().register(job_type.clone(), handler)?;
        info!("Registered job type: {}", job_type);
        Ok(())
    }

    /// Enqueue a job; an existing id is reported, not treated as an error
    #[instrument(skip(self, job), fields(job_id = %job.id, queue = %job.queue, job_type = %job.job_type))]
    pub async fn enqueue(&self, job: NewJob) -> QueueResult<EnqueueOutcome> {
        let job_type = job.job_type.clone();
        let outcome = self.store.enqueue(job).await?;

        match &outcome {
            EnqueueOutcome::Created(id) => {
                self.observability.record_enqueued(id, &job_type);
                info!("Enqueued job {}", id);
            }
            EnqueueOutcome::AlreadyExists(id) => {
                debug!("Job {} already exists, left untouched", id);
            }
        }

        Ok(outcome)
    }

    /// Claim the due jobs of one queue, run them concurrently and record
    /// their verdicts. Returns the number of jobs processed.
    pub async fn run_once(&self, queue: &str) -> QueueResult<usize> {
        let jobs = self
            .store
            .claim_due(queue, Utc::now(), self.config.claim_limit)
            .await?;
        let count = jobs.len();

        let mut set = JoinSet::new();
        for job in jobs {
            self.observability.record_claimed(&job.id, &job.job_type);
            let runtime = self.clone();
            set.spawn(async move { runtime.process(job).await });
        }

        while let Some(result) = set.join_next().await {
            if let Err(e) = result {
                error!("Job processing task failed: {}", e);
            }
        }

        Ok(count)
    }

    /// Start one poll loop per queue plus the reservation reaper
    ///
    /// The runtime cannot be restarted once the returned handle has been
    /// shut down.
    pub fn start(&self, queues: Vec<String>) -> RuntimeHandle {
        let mut tasks = Vec::with_capacity(queues.len() + 1);

        for queue in queues {
            let runtime = self.clone();
            tasks.push(tokio::spawn(async move { runtime.poll_loop(queue).await }));
        }

        let reaper = ReservationReaper::with_interval(self.store.clone(), self.config.reaper_interval)
            .with_observability(self.observability.clone());
        tasks.push(tokio::spawn(reaper.run(self.shutdown.clone())));

        RuntimeHandle {
            shutdown: self.shutdown.clone(),
            tasks,
        }
    }

    async fn poll_loop(self, queue: String) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Worker started for queue: {}", queue);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_once(&queue).await {
                Ok(0) => {}
                Ok(processed) => debug!("Processed {} jobs from queue {}", processed, queue),
                // Store failures only cost this cycle; the next tick retries.
                Err(e) => error!(queue = %queue, "Poll cycle failed: {}", e),
            }
        }

        info!("Worker stopped for queue: {}", queue);
    }

    async fn process(&self, job: JobRecord) {
        debug!("Processing job {} of type {}", job.id, job.job_type);

        let verdict = match self.invoke(&job).await {
            Ok(verdict) => verdict,
            Err(cause) => Verdict::retry(self.config.default_backoff, cause),
        };

        self.apply(&job, verdict).await;
    }

    /// Run the handler in its own task so a panic is contained there
    async fn invoke(&self, job: &JobRecord) -> Result<Verdict, JobError> {
        let handler = self
            .registry
            .read()
            .get(&job.job_type)
            .ok_or_else(|| JobError::UnknownJobType(job.job_type.clone()))?;

        let ctx = JobContext::for_job(job, self.shutdown.child_token());
        let owned = job.clone();
        let task = tokio::spawn(async move { handler.handle(ctx, owned).await });

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                self.observability.record_panicked(&job.id, &job.job_type);
                let message = panic_message(e);
                error!(
                    job_id = %job.id,
                    queue = %job.queue,
                    job_type = %job.job_type,
                    "Job handler panicked: {}", message
                );
                Err(JobError::Panicked(message))
            }
            Err(_) => Err(JobError::Canceled),
        }
    }

    async fn apply(&self, job: &JobRecord, verdict: Verdict) {
        let verdict_name = verdict.name();
        let Some(reservation) = job.reservation.as_ref() else {
            error!(job_id = %job.id, verdict = verdict_name, "Claimed job carries no reservation");
            return;
        };

        let result = match verdict {
            Verdict::Retry { after, cause } => {
                let retry_at = add_duration(Utc::now(), after);
                warn!(
                    job_id = %job.id,
                    queue = %job.queue,
                    job_type = %job.job_type,
                    attempt = job.attempt,
                    retry_at = %retry_at,
                    "Job failed, will retry: {}", cause
                );
                self.observability.record_retried(&job.id, &job.job_type);
                self.store
                    .reschedule(&job.id, reservation, retry_at, Some(cause.message()))
                    .await
            }
            Verdict::Reschedule { at } => {
                debug!("Job {} rescheduled for {}", job.id, at);
                self.observability.record_rescheduled(&job.id, &job.job_type);
                self.store.reschedule(&job.id, reservation, at, None).await
            }
            Verdict::Complete => {
                info!("Job {} completed successfully", job.id);
                self.observability.record_completed(&job.id, &job.job_type);
                self.store.complete(&job.id, reservation).await
            }
            Verdict::Fail { reason } => {
                error!(
                    job_id = %job.id,
                    queue = %job.queue,
                    job_type = %job.job_type,
                    "Job failed permanently: {}", reason
                );
                self.observability.record_failed(&job.id, &job.job_type);
                self.store.fail(&job.id, reservation, reason).await
            }
        };

        match result {
            Ok(()) => {}
            Err(QueueError::ReservationLost { .. }) => warn!(
                job_id = %job.id,
                queue = %job.queue,
                job_type = %job.job_type,
                verdict = verdict_name,
                "Reservation was reclaimed before the verdict was recorded, verdict dropped"
            ),
            // The reservation stays in place until the reaper reclaims it.
            Err(e) => error!(
                job_id = %job.id,
                queue = %job.queue,
                job_type = %job.job_type,
                verdict = verdict_name,
                "Failed to record job verdict: {}", e
            ),
        }
    }

    /// Get the store
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Get observability layer
    pub fn observability(&self) -> &ObservabilityLayer {
        &self.observability
    }

    /// Get configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Get all registered job types
    pub fn registered_types(&self) -> Vec<String> {
        self.registry.read().registered_types()
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string()),
        Err(err) => err.to_string(),
    }
}
