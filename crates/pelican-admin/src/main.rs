//! Admin API binary.

use std::sync::Arc;

use anyhow::Context;
use pelican_admin::{serve, AdminConfig, AppState};
use pelican_vault::VaultClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AdminConfig::from_env().context("loading configuration")?;
    let client = VaultClient::new(
        &config.vault_addr,
        &config.vault_token,
        &config.vault_users_prefix,
    )
    .context("building vault client")?;

    let state = AppState {
        store: Arc::new(client),
    };
    serve(&config.listen_addr, state, shutdown_signal()).await?;
    Ok(())
}

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
