use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use keeper_core::SharedConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    hash_password, password::DEFAULT_HASH_COST, verify_password, AuthError, AuthResult,
    LoginAdmission, SessionRegistry, Token, TokenStore,
};

pub const SESSION_TTL_MINUTES_KEY: &str = "session.ttl_minutes";
pub const HASH_COST_KEY: &str = "auth.hash_cost";

pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 720;

/// What the login path needs to know about a user
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: String,
    pub password_hash: String,
    pub blocked: bool,
}

/// Narrow view of the user table used by authentication
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_credentials(&self, username: &str) -> anyhow::Result<Option<Credentials>>;

    /// Stamp the user's last access time
    async fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> anyhow::Result<()>;

    async fn update_password_hash(&self, user_id: &str, password_hash: String) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: String,
    pub expired_at: DateTime<Utc>,
}

/// Login, logout and token checks
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    tokens: Arc<dyn TokenStore>,
    sessions: Arc<SessionRegistry>,
    config: SharedConfig,
    admission: Arc<LoginAdmission>,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        tokens: Arc<dyn TokenStore>,
        sessions: Arc<SessionRegistry>,
        config: SharedConfig,
    ) -> Self {
        let admission = Arc::new(LoginAdmission::from_config(&config));
        Self {
            credentials,
            tokens,
            sessions,
            config,
            admission,
        }
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Admission gate, resized first if the configured capacity or delay
    /// changed since the last login
    pub fn admission(&self) -> Arc<LoginAdmission> {
        let (capacity, delay) = LoginAdmission::settings(&self.config);
        if self.admission.capacity() != capacity || self.admission.delay() != delay {
            info!(capacity, delay_secs = delay.as_secs(), "login admission settings changed");
            self.admission.resize(capacity, delay);
        }
        self.admission.clone()
    }

    /// Authenticate through the admission gate and issue a token
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<LoginResponse> {
        let admission = self.admission();
        let result = admission.guard(self.check_and_issue(username, password)).await;

        match &result {
            Ok(response) => info!(user_id = %response.user_id, "login succeeded"),
            Err(AuthError::Exhausted) => warn!("login rejected: admission exhausted"),
            Err(e) => info!("login failed: {}", e),
        }
        result
    }

    async fn check_and_issue(&self, username: &str, password: &str) -> AuthResult<LoginResponse> {
        let Some(credentials) = self.credentials.find_credentials(username).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password, &credentials.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        if credentials.blocked {
            return Err(AuthError::UserBlocked);
        }

        let now = Utc::now();
        let ttl = self
            .config
            .snapshot()
            .get_i64(SESSION_TTL_MINUTES_KEY)
            .unwrap_or(DEFAULT_SESSION_TTL_MINUTES);
        let token = Token::issue(&credentials.user_id, now + Duration::minutes(ttl), now);
        let response = LoginResponse {
            token: token.token.clone(),
            user_id: token.user_id.clone(),
            expired_at: token.expired_at,
        };

        self.tokens.insert(token).await?;
        self.sessions.register(&response.token, &response.user_id);
        self.credentials.record_login(&response.user_id, now).await?;

        Ok(response)
    }

    /// Revoke a token and drop its session
    #[instrument(skip(self, token))]
    pub async fn logout(&self, token: &str) -> AuthResult<()> {
        let Some(existing) = self.tokens.get(token).await? else {
            return Err(AuthError::TokenNotFound);
        };

        if self.tokens.revoke(token).await? {
            info!(user_id = %existing.user_id, "token revoked on logout");
        }
        self.sessions.remove(token);
        Ok(())
    }

    /// Return the token if it is Allowed and unexpired
    pub async fn verify_token(&self, token: &str) -> AuthResult<Token> {
        match self.tokens.get(token).await? {
            Some(t) if t.is_valid_at(Utc::now()) => Ok(t),
            _ => Err(AuthError::TokenInvalid),
        }
    }

    /// Revoke every token of a user and drop their sessions
    pub async fn revoke_user(&self, user_id: &str) -> AuthResult<usize> {
        let revoked = self.tokens.revoke_all_for_user(user_id).await?;
        self.sessions.remove_user(user_id);
        Ok(revoked.len())
    }

    /// Store a new password hash and sign the user out everywhere
    #[instrument(skip(self, new_password))]
    pub async fn change_password(&self, user_id: &str, new_password: &str) -> AuthResult<()> {
        let cost = self
            .config
            .snapshot()
            .get_u64(HASH_COST_KEY)
            .and_then(|c| u32::try_from(c).ok())
            .unwrap_or(DEFAULT_HASH_COST);
        let password_hash = hash_password(new_password, cost).await?;

        self.credentials
            .update_password_hash(user_id, password_hash)
            .await?;
        let revoked = self.revoke_user(user_id).await?;
        info!(revoked, "password changed; tokens revoked");
        Ok(())
    }
}
