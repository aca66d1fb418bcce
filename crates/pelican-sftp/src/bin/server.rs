//! SFTP server binary.
//!
//! Audit records go to stdout as line-delimited JSON; operational logs go
//! to stderr. Configuration is environment-only.
//!
//! Run with: cargo run --bin pelican-sftp-server

use anyhow::Context;
use pelican_sftp::{metrics, Config, MetricsConfig, SftpServer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let metrics_config = MetricsConfig::from_env();
    metrics::install(metrics_config.include_user);

    let metrics_task = tokio::spawn(metrics::run_server(metrics_config, shutdown_signal()));

    let server = SftpServer::new(config).context("initializing server")?;
    server.run(shutdown_signal()).await?;

    // Let the metrics listener finish its graceful shutdown.
    let _ = metrics_task.await;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
