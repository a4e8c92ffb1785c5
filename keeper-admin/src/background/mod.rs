//! Recurring maintenance on top of keeper-queue
//!
//! Each task is one durable job with a fixed id. Seeding runs at every
//! start and is a no-op for ids that already exist, so the job table always
//! holds exactly one row per task which reschedules itself forever.

pub mod jobs;

use std::sync::Arc;

use anyhow::Result;
use keeper_auth::{SessionRegistry, TokenStore};
use keeper_core::SharedConfig;
use keeper_queue::{EnqueueOutcome, JobRuntime, JobStore, NewJob, QueueResult, RuntimeHandle};
use tracing::info;

pub use jobs::*;

use crate::config::runtime_config;
use crate::repositories::{AuditRepository, UserRepository};
use crate::services::UserBlocker;

/// Everything the maintenance handlers read or write
#[derive(Clone)]
pub struct MaintenanceDeps {
    pub users: Arc<dyn UserRepository>,
    pub audit: Arc<dyn AuditRepository>,
    pub tokens: Arc<dyn TokenStore>,
    pub sessions: Arc<SessionRegistry>,
    pub blocker: UserBlocker,
    pub config: SharedConfig,
}

/// `(job id, job type)` of every recurring task
pub const RECURRING_JOBS: [(&str, &str); 3] = [
    (inactive_users::JOB_ID, inactive_users::JOB_TYPE),
    (audit_retention::JOB_ID, audit_retention::JOB_TYPE),
    (session_expiry::JOB_ID, session_expiry::JOB_TYPE),
];

/// Register the three maintenance handlers on `runtime`
pub fn register_handlers(runtime: &JobRuntime, deps: &MaintenanceDeps) -> QueueResult<()> {
    runtime.register_handler(
        inactive_users::JOB_TYPE,
        Arc::new(InactiveUserBlockerJob::new(
            deps.users.clone(),
            deps.blocker.clone(),
            deps.config.clone(),
        )),
    )?;
    runtime.register_handler(
        audit_retention::JOB_TYPE,
        Arc::new(AuditRetentionJob::new(deps.audit.clone(), deps.config.clone())),
    )?;
    runtime.register_handler(
        session_expiry::JOB_TYPE,
        Arc::new(SessionExpiryJob::new(deps.tokens.clone(), deps.sessions.clone())),
    )?;
    Ok(())
}

/// Enqueue one job per recurring task, due immediately
///
/// Ids already in the store are left as they are.
pub async fn seed_recurring_jobs(runtime: &JobRuntime) -> QueueResult<Vec<EnqueueOutcome>> {
    let mut outcomes = Vec::with_capacity(RECURRING_JOBS.len());
    for (job_id, job_type) in RECURRING_JOBS {
        let outcome = runtime
            .enqueue(NewJob::new(job_id, MAINTENANCE_QUEUE, job_type))
            .await?;
        if !outcome.is_created() {
            info!("Recurring job {} already seeded", job_id);
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

/// Job runtime wired with the maintenance handlers
pub struct BackgroundSystem {
    runtime: JobRuntime,
    handle: Option<RuntimeHandle>,
}

impl BackgroundSystem {
    pub fn new(store: Arc<dyn JobStore>, deps: &MaintenanceDeps) -> Result<Self> {
        let runtime = JobRuntime::new(store, runtime_config(&deps.config));
        register_handlers(&runtime, deps)?;

        Ok(Self { runtime, handle: None })
    }

    pub fn runtime(&self) -> &JobRuntime {
        &self.runtime
    }

    pub async fn seed(&self) -> Result<()> {
        seed_recurring_jobs(&self.runtime).await?;
        Ok(())
    }

    /// Start polling the maintenance queue; a second call is a no-op
    pub fn start(&mut self) {
        if self.handle.is_none() {
            self.handle = Some(self.runtime.start(vec![MAINTENANCE_QUEUE.to_string()]));
            info!("Background processing started on queue {}", MAINTENANCE_QUEUE);
        }
    }

    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown().await;
        }
    }
}
