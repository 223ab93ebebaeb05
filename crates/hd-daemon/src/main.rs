//! helpdeskd: runs the ticket agent's driving loops until ctrl-c.

use anyhow::{Context, Result};
use hd_core::config::Config;
use hd_daemon::daemon::Daemon;
use tracing::{error, info};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    dotenv::dotenv().ok();

    let config = Config::load().context("failed to load configuration")?;
    hd_telemetry::logging::init(
        &config.general.service_name,
        &config.general.log_level,
        config.general.json_logs(),
    );
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %Config::default_path().display(),
        "helpdesk daemon starting"
    );

    let daemon = Daemon::new(config).await?;
    let shutdown = daemon.shutdown_handle();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, initiating shutdown");
        shutdown.trigger();
    });

    let totals = daemon.run().await?;
    info!(
        processed = totals.processed,
        idle = totals.idle,
        errors = totals.errors,
        "helpdesk daemon exited"
    );
    Ok(())
}
