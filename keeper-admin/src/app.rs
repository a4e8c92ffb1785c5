use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use keeper_auth::{hash_password, AuthService, MemoryTokenStore, SessionRegistry};
use keeper_core::SharedConfig;
use keeper_queue::JobStore;
use uuid::Uuid;

use crate::background::{BackgroundSystem, MaintenanceDeps};
use crate::repositories::{
    MemoryAuditRepository, MemoryDirectory, MemoryRoleRepository, MemoryUserRepository, RoleRepository, User,
    UserRepository,
};
use crate::rpc::RpcRouter;
use crate::services::UserBlocker;

/// The admin backend wired over in-memory repositories
pub struct AdminApp {
    pub config: SharedConfig,
    pub users: Arc<MemoryUserRepository>,
    pub roles: Arc<MemoryRoleRepository>,
    pub audit: Arc<MemoryAuditRepository>,
    pub directory: Arc<MemoryDirectory>,
    pub tokens: Arc<MemoryTokenStore>,
    pub sessions: Arc<SessionRegistry>,
    pub auth: Arc<AuthService>,
    pub blocker: UserBlocker,
    pub router: RpcRouter,
}

impl AdminApp {
    pub fn in_memory(config: SharedConfig) -> Self {
        let users = Arc::new(MemoryUserRepository::new());
        let roles = Arc::new(MemoryRoleRepository::new());
        let audit = Arc::new(MemoryAuditRepository::new());
        let directory = Arc::new(MemoryDirectory::new());
        let tokens = Arc::new(MemoryTokenStore::new());
        let sessions = Arc::new(SessionRegistry::new());

        let auth = Arc::new(AuthService::new(
            users.clone(),
            tokens.clone(),
            sessions.clone(),
            config.clone(),
        ));
        let blocker = UserBlocker::new(
            users.clone(),
            roles.clone(),
            audit.clone(),
            directory.clone(),
            auth.clone(),
        );
        let router = RpcRouter::new(auth.clone(), blocker.clone());

        Self {
            config,
            users,
            roles,
            audit,
            directory,
            tokens,
            sessions,
            auth,
            blocker,
            router,
        }
    }

    pub fn maintenance_deps(&self) -> MaintenanceDeps {
        MaintenanceDeps {
            users: self.users.clone(),
            audit: self.audit.clone(),
            tokens: self.tokens.clone(),
            sessions: self.sessions.clone(),
            blocker: self.blocker.clone(),
            config: self.config.clone(),
        }
    }

    /// Background system over `store` with this app's handlers registered
    pub fn background(&self, store: Arc<dyn JobStore>) -> Result<BackgroundSystem> {
        BackgroundSystem::new(store, &self.maintenance_deps())
    }

    /// Create a user with a freshly hashed password and the given roles
    pub async fn create_user(&self, username: &str, password: &str, roles: &[&str]) -> Result<User> {
        let cost = self
            .config
            .snapshot()
            .get_u64("auth.hash_cost")
            .and_then(|c| u32::try_from(c).ok())
            .unwrap_or(keeper_auth::password::DEFAULT_HASH_COST);
        let now = Utc::now();

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: hash_password(password, cost).await?,
            blocked: false,
            last_access_at: now,
            created_at: now,
        };
        self.users.insert(user.clone()).await?;

        for role in roles {
            self.roles.assign(&user.id, role).await?;
        }
        Ok(user)
    }
}
