//! Keeper admin backend: user blocking, maintenance jobs and the RPC calls
//! that reach the login path.

pub mod app;
pub mod background;
pub mod config;
pub mod repositories;
pub mod rpc;
pub mod services;

pub use app::AdminApp;
pub use background::{seed_recurring_jobs, BackgroundSystem, MaintenanceDeps};
pub use rpc::RpcRouter;
pub use services::UserBlocker;
