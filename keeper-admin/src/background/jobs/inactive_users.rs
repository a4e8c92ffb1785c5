use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keeper_core::SharedConfig;
use keeper_queue::{JobContext, JobError, JobHandler, JobRecord, Verdict};
use tracing::{info, warn};

use super::RETRY_BACKOFF;
use crate::config::InactiveUserSettings;
use crate::repositories::UserRepository;
use crate::services::UserBlocker;

pub const JOB_ID: &str = "inactive-user-blocker";
pub const JOB_TYPE: &str = "inactive_user_blocker";

/// Blocks every unblocked user whose last access is at least
/// `inactive.days_threshold` days old, then runs again after
/// `inactive.run_interval_minutes`
pub struct InactiveUserBlockerJob {
    users: Arc<dyn UserRepository>,
    blocker: UserBlocker,
    config: SharedConfig,
}

impl InactiveUserBlockerJob {
    pub fn new(users: Arc<dyn UserRepository>, blocker: UserBlocker, config: SharedConfig) -> Self {
        Self { users, blocker, config }
    }

    /// One sweep; returns the number of users blocked
    ///
    /// Every candidate is attempted even if an earlier one fails; the first
    /// failure is returned afterwards so the whole sweep is retried.
    async fn sweep(&self, ctx: &JobContext, now: DateTime<Utc>, days_threshold: i64) -> Result<usize> {
        let threshold = chrono::Duration::try_days(days_threshold)
            .ok_or_else(|| anyhow!("invalid inactivity threshold: {} days", days_threshold))?;

        let candidates: Vec<String> = self
            .users
            .unblocked_access_times()
            .await?
            .into_iter()
            .filter(|(_, last_access)| now.signed_duration_since(*last_access) >= threshold)
            .map(|(user_id, _)| user_id)
            .collect();

        let reason = format!("inactive for at least {} days", days_threshold);
        let mut blocked = 0;
        let mut first_error = None;

        for user_id in candidates {
            if ctx.is_cancelled() {
                return Err(anyhow!(JobError::Canceled));
            }

            match self.blocker.block(&user_id, &reason).await {
                Ok(true) => blocked += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(user_id = %user_id, "failed to block inactive user: {:#}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(blocked),
        }
    }
}

#[async_trait]
impl JobHandler for InactiveUserBlockerJob {
    async fn handle(&self, ctx: JobContext, _job: JobRecord) -> Result<Verdict, JobError> {
        let settings = InactiveUserSettings::read(&self.config);

        match self.sweep(&ctx, Utc::now(), settings.days_threshold).await {
            Ok(blocked) => {
                if blocked > 0 {
                    info!(blocked, "blocked inactive users");
                }
                Ok(Verdict::reschedule_after(settings.run_interval))
            }
            Err(e) => Ok(Verdict::retry(RETRY_BACKOFF, JobError::failed(format!("{:#}", e)))),
        }
    }
}
