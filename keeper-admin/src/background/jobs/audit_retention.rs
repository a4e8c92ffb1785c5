use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keeper_core::SharedConfig;
use keeper_queue::{JobContext, JobError, JobHandler, JobRecord, Verdict};
use tracing::{debug, info};

use super::RETRY_BACKOFF;
use crate::config::AuditRetentionSettings;
use crate::repositories::AuditRepository;

pub const JOB_ID: &str = "audit-retention-sweep";
pub const JOB_TYPE: &str = "audit_retention_sweep";

/// Deletes audit records older than `audit.ttl_minutes`
pub struct AuditRetentionJob {
    audit: Arc<dyn AuditRepository>,
    config: SharedConfig,
}

impl AuditRetentionJob {
    pub fn new(audit: Arc<dyn AuditRepository>, config: SharedConfig) -> Self {
        Self { audit, config }
    }
}

/// `now - ttl`, clamped to the earliest representable instant
fn cutoff(now: DateTime<Utc>, ttl: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_sub_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl JobHandler for AuditRetentionJob {
    async fn handle(&self, _ctx: JobContext, _job: JobRecord) -> Result<Verdict, JobError> {
        let settings = AuditRetentionSettings::read(&self.config);
        let cutoff = cutoff(Utc::now(), settings.ttl);

        match self.audit.delete_older_than(cutoff).await {
            Ok(0) => debug!("no audit records older than {}", cutoff),
            Ok(deleted) => info!(deleted, "deleted audit records older than {}", cutoff),
            Err(e) => return Ok(Verdict::retry(RETRY_BACKOFF, JobError::failed(format!("{:#}", e)))),
        }

        Ok(Verdict::reschedule_after(settings.sync_period))
    }
}
