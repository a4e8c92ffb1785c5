pub mod audit_retention;
pub mod inactive_users;
pub mod session_expiry;

pub use audit_retention::AuditRetentionJob;
pub use inactive_users::InactiveUserBlockerJob;
pub use session_expiry::SessionExpiryJob;

use std::time::Duration;

/// Queue every maintenance job runs on
pub const MAINTENANCE_QUEUE: &str = "maintenance";

/// Delay before a failed maintenance run is tried again
pub const RETRY_BACKOFF: Duration = Duration::from_secs(5 * 60);
