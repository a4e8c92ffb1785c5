use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Allowed,
    Revoked,
    Expired,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session token issued at login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    pub user_id: String,
    pub status: TokenStatus,
    pub expired_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Token {
    /// New Allowed token with a random value
    pub fn issue(user_id: impl Into<String>, expired_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
            user_id: user_id.into(),
            status: TokenStatus::Allowed,
            expired_at,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.status == TokenStatus::Allowed
    }

    /// Allowed and not past its expiry
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_allowed() && now <= self.expired_at
    }

    /// Move out of Allowed. Returns false if the token had already left it;
    /// a non-Allowed token never changes status again.
    pub fn retire(&mut self, status: TokenStatus, now: DateTime<Utc>) -> bool {
        if !self.is_allowed() || status == TokenStatus::Allowed {
            return false;
        }
        self.status = status;
        self.updated_at = now;
        true
    }
}

/// Token persistence
///
/// Each method is one atomic unit; `expire_sweep` in particular reads,
/// filters and updates under a single critical section so a concurrent
/// logout cannot interleave with it.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: Token) -> AuthResult<()>;

    async fn get(&self, token: &str) -> AuthResult<Option<Token>>;

    /// Allowed -> Revoked; returns whether the token changed
    async fn revoke(&self, token: &str) -> AuthResult<bool>;

    /// Revoke every Allowed token of a user; returns the revoked token values
    async fn revoke_all_for_user(&self, user_id: &str) -> AuthResult<Vec<String>>;

    /// Allowed tokens with `now > expired_at` -> Expired; returns their values
    async fn expire_sweep(&self, now: DateTime<Utc>) -> AuthResult<Vec<String>>;

    async fn list(&self) -> AuthResult<Vec<Token>>;
}

/// In-memory token table
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    tokens: Arc<RwLock<HashMap<String, Token>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, token: Token) -> AuthResult<()> {
        self.tokens.write().insert(token.token.clone(), token);
        Ok(())
    }

    async fn get(&self, token: &str) -> AuthResult<Option<Token>> {
        Ok(self.tokens.read().get(token).cloned())
    }

    async fn revoke(&self, token: &str) -> AuthResult<bool> {
        let now = Utc::now();
        Ok(self
            .tokens
            .write()
            .get_mut(token)
            .map(|t| t.retire(TokenStatus::Revoked, now))
            .unwrap_or(false))
    }

    async fn revoke_all_for_user(&self, user_id: &str) -> AuthResult<Vec<String>> {
        let now = Utc::now();
        let mut tokens = self.tokens.write();

        let revoked = tokens
            .values_mut()
            .filter(|t| t.user_id == user_id)
            .filter_map(|t| t.retire(TokenStatus::Revoked, now).then(|| t.token.clone()))
            .collect();
        Ok(revoked)
    }

    async fn expire_sweep(&self, now: DateTime<Utc>) -> AuthResult<Vec<String>> {
        let mut tokens = self.tokens.write();

        let mut expired: Vec<String> = tokens
            .values_mut()
            .filter(|t| t.is_allowed() && now > t.expired_at)
            .filter_map(|t| t.retire(TokenStatus::Expired, now).then(|| t.token.clone()))
            .collect();
        expired.sort();
        Ok(expired)
    }

    async fn list(&self) -> AuthResult<Vec<Token>> {
        let mut all: Vec<Token> = self.tokens.read().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.token.cmp(&b.token)));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(user: &str, expires_in: Duration) -> Token {
        let now = Utc::now();
        Token::issue(user, now + expires_in, now)
    }

    #[tokio::test]
    async fn test_expire_sweep_only_touches_overdue_allowed_tokens() {
        let store = MemoryTokenStore::new();
        let stale = token("alice", Duration::minutes(-1));
        let fresh = token("alice", Duration::minutes(30));
        let revoked = token("bob", Duration::minutes(-1));
        store.insert(stale.clone()).await.unwrap();
        store.insert(fresh.clone()).await.unwrap();
        store.insert(revoked.clone()).await.unwrap();
        store.revoke(&revoked.token).await.unwrap();

        let expired = store.expire_sweep(Utc::now()).await.unwrap();
        assert_eq!(expired, vec![stale.token.clone()]);

        let status = |t: &Token| t.status;
        assert_eq!(store.get(&stale.token).await.unwrap().map(|t| status(&t)), Some(TokenStatus::Expired));
        assert_eq!(store.get(&fresh.token).await.unwrap().map(|t| status(&t)), Some(TokenStatus::Allowed));
        assert_eq!(store.get(&revoked.token).await.unwrap().map(|t| status(&t)), Some(TokenStatus::Revoked));

        // Second sweep finds nothing new
        assert!(store.expire_sweep(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retired_tokens_never_return_to_allowed() {
        let mut t = token("alice", Duration::minutes(-1));
        let now = Utc::now();

        assert!(t.retire(TokenStatus::Expired, now));
        assert!(!t.retire(TokenStatus::Revoked, now));
        assert!(!t.retire(TokenStatus::Allowed, now));
        assert_eq!(t.status, TokenStatus::Expired);
    }

    #[tokio::test]
    async fn test_revoke_all_for_user() {
        let store = MemoryTokenStore::new();
        let a1 = token("alice", Duration::minutes(30));
        let a2 = token("alice", Duration::minutes(30));
        let b = token("bob", Duration::minutes(30));
        for t in [&a1, &a2, &b] {
            store.insert(t.clone()).await.unwrap();
        }

        let mut revoked = store.revoke_all_for_user("alice").await.unwrap();
        revoked.sort();
        let mut expected = vec![a1.token.clone(), a2.token.clone()];
        expected.sort();
        assert_eq!(revoked, expected);

        assert!(store.get(&b.token).await.unwrap().unwrap().is_allowed());
        assert!(store.revoke_all_for_user("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revoke_unknown_token_is_false() {
        let store = MemoryTokenStore::new();
        assert!(!store.revoke("missing").await.unwrap());
    }
}
