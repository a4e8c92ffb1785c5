use std::time::Duration;

use keeper_core::{load_env_config, KeeperConfig, SharedConfig};
use keeper_queue::RuntimeConfig;
use tracing::warn;

/// Environment prefix: `KEEPER__INACTIVE__DAYS_THRESHOLD` -> `inactive.days_threshold`
pub const ENV_PREFIX: &str = "KEEPER__";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://keeper.db?mode=rwc";

const DEFAULTS: &[(&str, &str)] = &[
    ("inactive.days_threshold", "90"),
    ("inactive.run_interval_minutes", "60"),
    ("audit.ttl_minutes", "43200"),
    ("audit.sync_period_minutes", "60"),
    ("login.max_in_flight", "10"),
    ("login.delay_seconds", "1"),
    ("session.ttl_minutes", "720"),
    ("auth.hash_cost", "10"),
    ("queue.poll_interval_ms", "1000"),
    ("queue.claim_limit", "10"),
    ("queue.reservation_timeout_secs", "600"),
    ("queue.reaper_interval_secs", "30"),
    ("queue.database_url", DEFAULT_DATABASE_URL),
];

/// Fill in every default, then let the environment override them
pub fn config(config: &mut KeeperConfig) {
    apply_defaults(config);
    load_env_config(config, ENV_PREFIX);
}

/// Defaults only; keys already present are left alone
pub fn apply_defaults(config: &mut KeeperConfig) {
    for (key, value) in DEFAULTS {
        if !config.has(key) {
            config.set(*key, *value);
        }
    }
}

/// Defaults plus environment, wrapped for sharing
pub fn load() -> SharedConfig {
    let mut base = KeeperConfig::new();
    config(&mut base);
    SharedConfig::new(base)
}

/// `value` unless it is missing or zero
fn non_zero_or(key: &str, value: Option<Duration>, default: Duration) -> Duration {
    match value {
        Some(d) if d.is_zero() => {
            warn!(key, "zero is not a usable value, falling back to {:?}", default);
            default
        }
        Some(d) => d,
        None => default,
    }
}

pub const DEFAULT_DAYS_THRESHOLD: i64 = 90;

/// Inactive-user blocker settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InactiveUserSettings {
    pub days_threshold: i64,
    pub run_interval: Duration,
}

impl InactiveUserSettings {
    pub fn read(config: &SharedConfig) -> Self {
        let snapshot = config.snapshot();
        let days_threshold = match snapshot.get_i64("inactive.days_threshold") {
            Some(days) if days < 0 => {
                warn!(days, "negative inactive.days_threshold, falling back to {}", DEFAULT_DAYS_THRESHOLD);
                DEFAULT_DAYS_THRESHOLD
            }
            Some(days) => days,
            None => DEFAULT_DAYS_THRESHOLD,
        };

        Self {
            days_threshold,
            run_interval: non_zero_or(
                "inactive.run_interval_minutes",
                snapshot.get_duration_minutes("inactive.run_interval_minutes"),
                Duration::from_secs(60 * 60),
            ),
        }
    }
}

/// Audit retention settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditRetentionSettings {
    pub ttl: Duration,
    pub sync_period: Duration,
}

impl AuditRetentionSettings {
    pub fn read(config: &SharedConfig) -> Self {
        let snapshot = config.snapshot();
        Self {
            ttl: snapshot
                .get_duration_minutes("audit.ttl_minutes")
                .unwrap_or(Duration::from_secs(43200 * 60)),
            sync_period: non_zero_or(
                "audit.sync_period_minutes",
                snapshot.get_duration_minutes("audit.sync_period_minutes"),
                Duration::from_secs(60 * 60),
            ),
        }
    }
}

/// Worker runtime settings from `queue.*`
pub fn runtime_config(config: &SharedConfig) -> RuntimeConfig {
    let snapshot = config.snapshot();
    let defaults = RuntimeConfig::default();

    RuntimeConfig {
        poll_interval: non_zero_or(
            "queue.poll_interval_ms",
            snapshot.get_duration_millis("queue.poll_interval_ms"),
            defaults.poll_interval,
        ),
        claim_limit: match snapshot.get_usize("queue.claim_limit") {
            Some(0) => {
                warn!("queue.claim_limit 0 would never claim a job, falling back to {}", defaults.claim_limit);
                defaults.claim_limit
            }
            Some(limit) => limit,
            None => defaults.claim_limit,
        },
        reaper_interval: non_zero_or(
            "queue.reaper_interval_secs",
            snapshot.get_duration_secs("queue.reaper_interval_secs"),
            defaults.reaper_interval,
        ),
        ..defaults
    }
}

pub fn reservation_timeout(config: &SharedConfig) -> Duration {
    non_zero_or(
        "queue.reservation_timeout_secs",
        config.snapshot().get_duration_secs("queue.reservation_timeout_secs"),
        Duration::from_secs(600),
    )
}

pub fn database_url(config: &SharedConfig) -> String {
    config
        .get("queue.database_url")
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_do_not_override_existing_keys() {
        let mut base = KeeperConfig::new();
        base.set("inactive.days_threshold", "1");
        apply_defaults(&mut base);

        let shared = SharedConfig::new(base);
        let inactive = InactiveUserSettings::read(&shared);
        assert_eq!(inactive.days_threshold, 1);
        assert_eq!(inactive.run_interval, Duration::from_secs(3600));

        let audit = AuditRetentionSettings::read(&shared);
        assert_eq!(audit.ttl, Duration::from_secs(30 * 24 * 3600));
        assert_eq!(database_url(&shared), DEFAULT_DATABASE_URL);
    }

    #[test]
    fn test_runtime_config_reads_queue_keys() {
        let shared = SharedConfig::default();
        shared.set("queue.poll_interval_ms", "250");
        shared.set("queue.claim_limit", "3");

        let runtime = runtime_config(&shared);
        assert_eq!(runtime.poll_interval, Duration::from_millis(250));
        assert_eq!(runtime.claim_limit, 3);
        assert_eq!(runtime.default_backoff, Duration::from_secs(300));
        assert_eq!(reservation_timeout(&shared), Duration::from_secs(600));
    }

    #[test]
    fn test_zero_queue_settings_fall_back_to_defaults() {
        let shared = SharedConfig::default();
        shared.set("queue.poll_interval_ms", "0");
        shared.set("queue.reaper_interval_secs", "0");
        shared.set("queue.claim_limit", "0");
        shared.set("queue.reservation_timeout_secs", "0");

        let runtime = runtime_config(&shared);
        let defaults = RuntimeConfig::default();
        assert_eq!(runtime.poll_interval, defaults.poll_interval);
        assert_eq!(runtime.reaper_interval, defaults.reaper_interval);
        assert_eq!(runtime.claim_limit, defaults.claim_limit);
        assert_eq!(reservation_timeout(&shared), Duration::from_secs(600));
    }

    #[test]
    fn test_negative_threshold_falls_back_to_default() {
        let shared = SharedConfig::default();
        shared.set("inactive.days_threshold", "-5");
        shared.set("inactive.run_interval_minutes", "0");

        let settings = InactiveUserSettings::read(&shared);
        assert_eq!(settings.days_threshold, DEFAULT_DAYS_THRESHOLD);
        assert_eq!(settings.run_interval, Duration::from_secs(3600));

        shared.set("inactive.days_threshold", "0");
        assert_eq!(InactiveUserSettings::read(&shared).days_threshold, 0);
    }

    #[test]
    fn test_settings_are_read_fresh() {
        let shared = SharedConfig::default();
        assert_eq!(InactiveUserSettings::read(&shared).days_threshold, 90);

        shared.set("inactive.days_threshold", "7");
        assert_eq!(InactiveUserSettings::read(&shared).days_threshold, 7);
    }
}
