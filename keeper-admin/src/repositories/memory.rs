use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keeper_auth::{CredentialStore, Credentials};
use parking_lot::RwLock;

use super::{AuditRecord, AuditRepository, DirectoryClient, RoleRepository, User, UserRepository};

#[derive(Clone, Default)]
pub struct MemoryUserRepository {
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn insert(&self, user: User) -> Result<()> {
        let mut users = self.users.write();
        if users.values().any(|u| u.username == user.username && u.id != user.id) {
            return Err(anyhow!("username already taken: {}", user.username));
        }
        users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.users.read().get(user_id).cloned())
    }

    async fn unblocked_access_times(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        let mut times: Vec<(String, DateTime<Utc>)> = self
            .users
            .read()
            .values()
            .filter(|u| !u.blocked)
            .map(|u| (u.id.clone(), u.last_access_at))
            .collect();
        times.sort();
        Ok(times)
    }

    async fn mark_blocked(&self, user_id: &str) -> Result<bool> {
        let mut users = self.users.write();
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| anyhow!("user not found: {}", user_id))?;

        if user.blocked {
            return Ok(false);
        }
        user.blocked = true;
        Ok(true)
    }
}

#[async_trait]
impl CredentialStore for MemoryUserRepository {
    async fn find_credentials(&self, username: &str) -> Result<Option<Credentials>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.username == username)
            .map(|u| Credentials {
                user_id: u.id.clone(),
                password_hash: u.password_hash.clone(),
                blocked: u.blocked,
            }))
    }

    async fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.users.write().get_mut(user_id) {
            user.last_access_at = at;
        }
        Ok(())
    }

    async fn update_password_hash(&self, user_id: &str, password_hash: String) -> Result<()> {
        let mut users = self.users.write();
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| anyhow!("user not found: {}", user_id))?;
        user.password_hash = password_hash;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryRoleRepository {
    links: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl MemoryRoleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleRepository for MemoryRoleRepository {
    async fn assign(&self, user_id: &str, role: &str) -> Result<()> {
        self.links
            .write()
            .entry(user_id.to_string())
            .or_default()
            .insert(role.to_string());
        Ok(())
    }

    async fn roles_for(&self, user_id: &str) -> Result<Vec<String>> {
        let mut roles: Vec<String> = self
            .links
            .read()
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        roles.sort();
        Ok(roles)
    }

    async fn clear_roles(&self, user_id: &str) -> Result<usize> {
        Ok(self
            .links
            .write()
            .remove(user_id)
            .map(|set| set.len())
            .unwrap_or(0))
    }
}

#[derive(Clone, Default)]
pub struct MemoryAuditRepository {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl MemoryAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditRepository for MemoryAuditRepository {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        self.records.write().push(record);
        Ok(())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.created_at >= cutoff);
        Ok(before - records.len())
    }

    async fn list(&self) -> Result<Vec<AuditRecord>> {
        Ok(self.records.read().clone())
    }
}

/// Directory stand-in that remembers group removals and can be told to fail
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    removed: Arc<RwLock<Vec<String>>>,
    unreachable: Arc<AtomicBool>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Usernames removed from their groups so far
    pub fn removed(&self) -> Vec<String> {
        self.removed.read().clone()
    }
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    async fn remove_from_all_groups(&self, username: &str) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(anyhow!("directory unreachable"));
        }
        self.removed.write().push(username.to_string());
        Ok(())
    }
}
