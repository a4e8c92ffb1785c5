use std::sync::Arc;

use anyhow::Result;
use keeper_auth::AuthService;
use keeper_core::KeeperError;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::repositories::{AuditRecord, AuditRepository, DirectoryClient, RoleRepository, UserRepository};

pub const USER_BLOCKED_ACTION: &str = "user.blocked";

/// Blocks a user: the path shared by the inactivity sweep and
/// `user/block_user`
#[derive(Clone)]
pub struct UserBlocker {
    users: Arc<dyn UserRepository>,
    roles: Arc<dyn RoleRepository>,
    audit: Arc<dyn AuditRepository>,
    directory: Arc<dyn DirectoryClient>,
    auth: Arc<AuthService>,
    /// One block at a time, so the sweep and a manual block never both
    /// audit the same user
    serial: Arc<Mutex<()>>,
}

impl UserBlocker {
    pub fn new(
        users: Arc<dyn UserRepository>,
        roles: Arc<dyn RoleRepository>,
        audit: Arc<dyn AuditRepository>,
        directory: Arc<dyn DirectoryClient>,
        auth: Arc<AuthService>,
    ) -> Self {
        Self {
            users,
            roles,
            audit,
            directory,
            auth,
            serial: Arc::new(Mutex::new(())),
        }
    }

    /// Block `user_id`. Returns false, with no side effects, if the user was
    /// already blocked.
    ///
    /// Role removal, token revocation and the audit record run before the
    /// blocked flag is set, and the flag is only written once they have all
    /// succeeded. A failure leaves the user unblocked, so the next attempt
    /// redoes the whole block instead of skipping an already-blocked user
    /// with roles or tokens left behind. Directory cleanup is best effort: a
    /// failure is logged and the block still stands.
    #[instrument(skip(self, reason), fields(user_id = %user_id))]
    pub async fn block(&self, user_id: &str, reason: &str) -> Result<bool> {
        let _serial = self.serial.lock().await;

        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| KeeperError::not_found(format!("User not found: {}", user_id)).into_anyhow())?;

        if user.blocked {
            return Ok(false);
        }

        let roles_removed = self.roles.clear_roles(user_id).await?;
        let tokens_revoked = self.auth.revoke_user(user_id).await?;

        if let Err(e) = self.directory.remove_from_all_groups(&user.username).await {
            warn!(username = %user.username, "directory group cleanup failed: {}", e);
        }

        self.audit
            .record(AuditRecord::new(Some(user_id.to_string()), USER_BLOCKED_ACTION, reason))
            .await?;

        if !self.users.mark_blocked(user_id).await? {
            warn!("user was blocked by another path during the block");
            return Ok(false);
        }

        // A login that slipped in before the flag was set
        match self.auth.revoke_user(user_id).await {
            Ok(0) => {}
            Ok(late) => info!(late, "revoked tokens issued during the block"),
            Err(e) => warn!("late token revocation failed: {}", e),
        }

        info!(roles_removed, tokens_revoked, "user blocked: {}", reason);
        Ok(true)
    }
}
