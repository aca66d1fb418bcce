//! Admin HTTP API for pelican user records.
//!
//! A thin CRUD surface over the secret store: the SFTP service never
//! writes records, this API never touches the data volume.

pub mod api;

use std::future::Future;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use pelican_core::{Error, Result};
use pelican_vault::UserStore;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
}

/// Admin server configuration from the environment.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub listen_addr: String,
    pub vault_addr: String,
    pub vault_token: String,
    pub vault_users_prefix: String,
}

impl AdminConfig {
    pub fn from_env() -> Result<Self> {
        let env = |key: &str, default: &str| match std::env::var(key) {
            Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => default.to_string(),
        };
        let config = Self {
            listen_addr: env("LISTEN_ADDR", "0.0.0.0:8080"),
            vault_addr: env("VAULT_ADDR", ""),
            vault_token: env("VAULT_TOKEN", ""),
            vault_users_prefix: env("VAULT_USERS_PREFIX", "kv/sftp/users"),
        };
        if config.vault_addr.is_empty() || config.vault_token.is_empty() {
            return Err(Error::Config(
                "VAULT_ADDR and VAULT_TOKEN must be set for the admin API".into(),
            ));
        }
        Ok(config)
    }
}

/// Build the admin router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(api::healthz))
        .route("/api/v1/users", get(api::list_users).post(api::create_user))
        .route(
            "/api/v1/users/{username}",
            get(api::get_user)
                .put(api::put_user)
                .patch(api::patch_user)
                .delete(api::delete_user),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until `shutdown` resolves.
pub async fn serve(
    listen_addr: &str,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!(addr = %listen_addr, "admin api listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Config(format!("admin server: {e}")))?;
    Ok(())
}
