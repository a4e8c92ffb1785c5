use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use keeper_auth::{SessionRegistry, TokenStore};
use keeper_queue::{JobContext, JobError, JobHandler, JobRecord, Verdict};
use tracing::info;

use super::RETRY_BACKOFF;

pub const JOB_ID: &str = "session-expiry-sweep";
pub const JOB_TYPE: &str = "session_expiry_sweep";

/// Fixed cadence, measured from the end of each run
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Moves overdue Allowed tokens to Expired and drops their live sessions
pub struct SessionExpiryJob {
    tokens: Arc<dyn TokenStore>,
    sessions: Arc<SessionRegistry>,
}

impl SessionExpiryJob {
    pub fn new(tokens: Arc<dyn TokenStore>, sessions: Arc<SessionRegistry>) -> Self {
        Self { tokens, sessions }
    }
}

#[async_trait]
impl JobHandler for SessionExpiryJob {
    async fn handle(&self, _ctx: JobContext, _job: JobRecord) -> Result<Verdict, JobError> {
        let expired = match self.tokens.expire_sweep(Utc::now()).await {
            Ok(expired) => expired,
            Err(e) => return Ok(Verdict::retry(RETRY_BACKOFF, JobError::failed(e))),
        };

        if !expired.is_empty() {
            let dropped = self.sessions.remove_tokens(&expired);
            info!(expired = expired.len(), sessions_dropped = dropped, "expired session tokens");
        }

        Ok(Verdict::reschedule_after(SWEEP_INTERVAL))
    }
}
