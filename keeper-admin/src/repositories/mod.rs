//! Narrow interfaces over the admin's relational store and directory
//!
//! Only the operations the blocking and retention paths need are exposed.
//! The in-memory implementations back tests and the standalone binary.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::{MemoryAuditRepository, MemoryDirectory, MemoryRoleRepository, MemoryUserRepository};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub blocked: bool,
    pub last_access_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: User) -> Result<()>;

    async fn get(&self, user_id: &str) -> Result<Option<User>>;

    /// `(user_id, last_access_at)` for every user not yet blocked
    async fn unblocked_access_times(&self) -> Result<Vec<(String, DateTime<Utc>)>>;

    /// Set the blocked flag; false if the user was already blocked
    async fn mark_blocked(&self, user_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn assign(&self, user_id: &str, role: &str) -> Result<()>;

    async fn roles_for(&self, user_id: &str) -> Result<Vec<String>>;

    /// Remove every role link of a user; returns how many were removed
    async fn clear_roles(&self, user_id: &str) -> Result<usize>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub action: String,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(user_id: Option<String>, action: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            action: action.into(),
            detail: detail.into(),
            created_at: Utc::now(),
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<()>;

    /// Delete records with `created_at < cutoff`; returns how many went
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    async fn list(&self) -> Result<Vec<AuditRecord>>;
}

/// External user directory (LDAP groups)
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn remove_from_all_groups(&self, username: &str) -> Result<()>;
}
