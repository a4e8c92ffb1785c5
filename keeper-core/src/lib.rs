//! keeper-core: errors and configuration shared by the Keeper crates.

pub mod config;
pub mod errors;

pub use config::{load_env_config, KeeperConfig, KeeperConfigSnapshot, SharedConfig};
pub use errors::{KeeperError, KeeperResult, ErrorKind};
