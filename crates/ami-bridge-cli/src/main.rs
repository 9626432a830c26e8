//! AMI Bridge - main entry point

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ami_bridge_cli::{AppConfig, BridgeApp, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose, cli.json_logs);

    // Load configuration
    info!("Loading app configuration");
    let config = AppConfig::load_with_overrides(cli.config.as_deref(), &cli.overrides())
        .context("Failed to initialize app config")?;
    config.log_summary();

    let app = BridgeApp::new(config);

    // Ctrl-C / SIGTERM end the listen loop; teardown then runs in `run`
    let shutdown = app.shutdown_token();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    if let Err(e) = app.run().await {
        error!("ami-bridge stopped with an error: {}", e);
        std::process::exit(1);
    }

    info!("ami-bridge exited successfully");
    Ok(())
}

/// Setup logging based on verbosity level
///
/// Logs go to stderr; stdout carries console-published events. `RUST_LOG` takes
/// precedence over `--verbose`.
fn setup_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
    }
}
