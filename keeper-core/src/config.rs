//! # Keeper Configuration
//!
//! A minimal key/value configuration store. Values are strings; typed
//! access goes through [`KeeperConfigSnapshot`].
//!
//! ```rust
//! use keeper_core::KeeperConfig;
//! let mut cfg = KeeperConfig::new();
//!
//! cfg.set("login.max_in_flight", "3");
//! cfg.set("login.delay_seconds", "1");
//!
//! assert_eq!(cfg.snapshot().get_usize("login.max_in_flight"), Some(3));
//! ```
//!
//! ## Hot reload
//! [`SharedConfig`] wraps the store behind a lock. Readers take a fresh
//! snapshot every time they need a value, so a `set` made while the process
//! runs is picked up on the next read.
//!
//! ## Environment overrides
//! [`load_env_config`] maps prefixed variables onto dotted keys:
//!
//! ```bash
//! export KEEPER__INACTIVE__DAYS_THRESHOLD=30   # inactive.days_threshold
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

#[derive(Debug, Default, Clone)]
pub struct KeeperConfig {
    values: HashMap<String, String>,
}

impl KeeperConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Check whether a key is present.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn snapshot(&self) -> KeeperConfigSnapshot {
        KeeperConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct KeeperConfigSnapshot {
    map: HashMap<String, String>,
}

impl KeeperConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.trim().parse::<usize>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse::<i64>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.trim().parse::<bool>().ok())
    }

    /// Read a whole number of seconds as a `Duration`.
    pub fn get_duration_secs(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(Duration::from_secs)
    }

    /// Read a whole number of milliseconds as a `Duration`.
    pub fn get_duration_millis(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(Duration::from_millis)
    }

    /// Read a whole number of minutes as a `Duration`.
    pub fn get_duration_minutes(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(|m| Duration::from_secs(m.saturating_mul(60)))
    }
}

/// Cloneable handle to a live configuration store.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<KeeperConfig>>,
}

impl SharedConfig {
    pub fn new(config: KeeperConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn set<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.inner.write().set(key, value);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().get(key).map(str::to_string)
    }

    pub fn snapshot(&self) -> KeeperConfigSnapshot {
        self.inner.read().snapshot()
    }
}

/// Copy environment variables starting with `prefix` into `config`.
///
/// `KEEPER__LOGIN__MAX_IN_FLIGHT` with prefix `KEEPER__` becomes
/// `login.max_in_flight`.
pub fn load_env_config(config: &mut KeeperConfig, prefix: &str) {
    load_config_from(config, prefix, std::env::vars());
}

fn load_config_from<I>(config: &mut KeeperConfig, prefix: &str, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        if let Some(stripped) = key.strip_prefix(prefix) {
            let normalized = stripped.to_lowercase().replace("__", ".");
            config.set(normalized, value);
        }
    }
}
