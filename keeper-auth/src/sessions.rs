use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// A logged-in connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub connected_at: DateTime<Utc>,
}

/// Live sessions keyed by token
///
/// Owned by whoever builds the services and shared through `Arc`; the lock
/// is private to this type and never held across an await.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: impl Into<String>, user_id: impl Into<String>) -> Session {
        let session = Session {
            token: token.into(),
            user_id: user_id.into(),
            connected_at: Utc::now(),
        };
        self.sessions
            .lock()
            .insert(session.token.clone(), session.clone());
        session
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        self.sessions.lock().get(token).cloned()
    }

    pub fn remove(&self, token: &str) -> Option<Session> {
        self.sessions.lock().remove(token)
    }

    /// Drop the sessions for a set of tokens, returning how many were live
    pub fn remove_tokens<'a, I>(&self, tokens: I) -> usize
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut sessions = self.sessions.lock();
        tokens
            .into_iter()
            .filter(|token| sessions.remove(token.as_str()).is_some())
            .count()
    }

    /// Drop every session of a user
    pub fn remove_user(&self, user_id: &str) -> Vec<Session> {
        let mut sessions = self.sessions.lock();
        let tokens: Vec<String> = sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.token.clone())
            .collect();

        tokens
            .iter()
            .filter_map(|token| sessions.remove(token))
            .collect()
    }

    pub fn sessions_for_user(&self, user_id: &str) -> Vec<Session> {
        self.sessions
            .lock()
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_remove_user() {
        let registry = SessionRegistry::new();
        registry.register("t1", "alice");
        registry.register("t2", "alice");
        registry.register("t3", "bob");

        assert_eq!(registry.sessions_for_user("alice").len(), 2);

        let removed = registry.remove_user("alice");
        assert_eq!(removed.len(), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("t3").is_some());
    }

    #[test]
    fn test_remove_tokens_counts_live_sessions() {
        let registry = SessionRegistry::new();
        registry.register("t1", "alice");

        let gone = vec!["t1".to_string(), "never-connected".to_string()];
        assert_eq!(registry.remove_tokens(&gone), 1);
        assert!(registry.is_empty());
    }
}
