//! uinveil Daemon
//!
//! Serves signed avatar URLs and proxies verified requests to the upstream
//! provider until SIGTERM or SIGINT.

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tokio::sync::broadcast;
use tracing::{error, info};

use uinveil_daemon::config::DaemonConfig;
use uinveil_daemon::error::Result;
use uinveil_daemon::server;

/// Initializes structured logging with tracing.
///
/// Supports two output formats via `UINVEIL_LOG_FORMAT` environment variable:
/// - `json`: Machine-readable JSON logs (default for production)
/// - `pretty`: Human-readable formatted logs (default for development)
///
/// Log level is controlled via `RUST_LOG` environment variable.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let format = std::env::var("UINVEIL_LOG_FORMAT")
        .unwrap_or_else(|_| "pretty".to_string())
        .to_lowercase();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("uinveil_daemon=info,uinveil=info"));

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting uinveil daemon");

    let config = match DaemonConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            error!("Expected config at: {:?}", DaemonConfig::config_path());
            return Err(e);
        }
    };

    info!(
        licenses = config.license.len(),
        tokens = config.authentication.len(),
        "Loaded configuration"
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    let handle = signals.handle();
    tokio::spawn(async move {
        use futures::stream::StreamExt;
        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                    let _ = shutdown_tx.send(());
                    break;
                }
                SIGINT => {
                    info!("Received SIGINT, initiating graceful shutdown");
                    let _ = shutdown_tx.send(());
                    break;
                }
                _ => {}
            }
        }
    });

    server::run(&config, shutdown_rx).await?;
    handle.close();

    info!("Daemon shutdown complete");

    Ok(())
}
