//! # exposure-server
//!
//! Host daemon for the exposure correlation engine.
//!
//! Runs the proximity and geo checks on a schedule and serves:
//! - REST API for listing and dismissing exposures and triggering checks
//! - OpenAPI documentation via Swagger UI
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package exposure-server
//!
//! # With an explicit config file
//! EXPOSURE_CONFIG=/etc/exposure-watch/config.toml ./exposure-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use exposure_core::{EngineConfig, Scheduler};
use exposure_server::state::AppState;
use exposure_server::{api, logging};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("EXPOSURE_CONFIG")
        .map_or_else(EngineConfig::default_path, PathBuf::from);
    let config = EngineConfig::load_or_default(&config_path)?;

    logging::init(config.server.production)?;
    info!(
        config = %config_path.display(),
        version = env!("CARGO_PKG_VERSION"),
        "starting exposure-server"
    );
    if config.fetch.data_url.is_empty() {
        warn!("fetch.data_url is not set; geo checks will fail until it is configured");
    }

    let bind_addr = config.server.bind_addr.clone();
    let period = Duration::from_secs(config.fetch.fetch_interval_secs);
    let state = Arc::new(AppState::from_config(config)?);

    let cancel = CancellationToken::new();
    let scheduler = tokio::spawn(
        Scheduler::new(state.tracker.clone(), period).run(cancel.clone()),
    );

    let app = api::create_router(state);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown requested");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    scheduler.await?;
    info!("exposure-server stopped");

    Ok(())
}
