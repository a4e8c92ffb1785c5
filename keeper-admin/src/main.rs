use std::sync::Arc;

use anyhow::Result;
use keeper_admin::{config, AdminApp};
use keeper_queue::SqliteJobStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("KEEPER_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().with_target(false).init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = config::load();
    let app = AdminApp::in_memory(config.clone());

    // Optional first administrator for the in-memory user table
    if let (Some(username), Some(password)) = (
        config.get("bootstrap.admin_username"),
        config.get("bootstrap.admin_password"),
    ) {
        let user = app.create_user(&username, &password, &["admin"]).await?;
        info!(user_id = %user.id, "bootstrap administrator created");
    }

    let database_url = config::database_url(&config);
    let store = SqliteJobStore::connect(&database_url)
        .await?
        .with_reservation_timeout(config::reservation_timeout(&config));
    info!("Job store ready at {}", database_url);

    let mut background = app.background(Arc::new(store))?;
    background.seed().await?;
    background.start();

    info!("keeper-admin running; press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }

    background.shutdown().await;
    Ok(())
}
