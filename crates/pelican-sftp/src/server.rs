//! SSH session engine and server lifecycle.
//!
//! One handler per accepted TCP connection. Public-key auth only; the
//! only channel type honored is `session` and the only request honored on
//! it is the `sftp` subsystem. Everything else (pty, shell, exec, env,
//! window changes, other subsystems) is refused.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use pelican_core::{Error, Result};
use pelican_vault::{UserCache, UserStore, VaultClient};
use russh::keys::ssh_key;
use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId, MethodKind, MethodSet};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::audit::audit;
use crate::auth::{AuthDecision, Authenticator};
use crate::config::Config;
use crate::fs::JailedFs;
use crate::metrics;

/// The SFTP service: listener, SSH server config, shared auth state.
pub struct SftpServer {
    config: Arc<Config>,
    store: Arc<dyn UserStore>,
    cache: Arc<UserCache>,
    authenticator: Arc<Authenticator>,
}

impl SftpServer {
    pub fn new(config: Config) -> Result<Self> {
        let client = VaultClient::new(
            &config.vault_addr,
            &config.vault_token,
            &config.vault_users_prefix,
        )?
        .with_observer(Arc::new(metrics::observe_vault));

        let store: Arc<dyn UserStore> = Arc::new(client);
        let cache = Arc::new(if config.disable_user_cache {
            UserCache::disabled()
        } else {
            UserCache::new(config.user_cache_ttl)
        });
        let authenticator = Arc::new(Authenticator::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            config.vault_timeout,
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            cache,
            authenticator,
        })
    }

    /// Run the accept loop until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let russh_config = Arc::new(self.build_russh_config()?);

        let socket = TcpListener::bind(&self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "sftp server listening");

        let mut runner = Runner {
            config: Arc::clone(&self.config),
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            authenticator: Arc::clone(&self.authenticator),
        };

        tokio::select! {
            result = russh::server::Server::run_on_socket(&mut runner, russh_config, &socket) => {
                result.map_err(|e| Error::Ssh(e.to_string()))
            }
            _ = shutdown => {
                info!("shutdown signal received, closing listener");
                Ok(())
            }
        }
    }

    fn build_russh_config(&self) -> Result<russh::server::Config> {
        let key = russh::keys::PrivateKey::read_openssh_file(&self.config.host_key_path)
            .map_err(|e| {
                Error::Config(format!(
                    "read host key {:?} failed: {e}",
                    self.config.host_key_path
                ))
            })?;

        Ok(russh::server::Config {
            server_id: russh::SshId::Standard("SSH-2.0-sftp-service".to_string()),
            keys: vec![key],
            auth_rejection_time: std::time::Duration::from_secs(3),
            auth_rejection_time_initial: Some(std::time::Duration::ZERO),
            ..Default::default()
        })
    }
}

/// Implements the russh accept-loop trait; one clone per connection.
#[derive(Clone)]
struct Runner {
    config: Arc<Config>,
    store: Arc<dyn UserStore>,
    cache: Arc<UserCache>,
    authenticator: Arc<Authenticator>,
}

impl russh::server::Server for Runner {
    type Handler = ConnectionHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
        debug!(peer = ?peer_addr, "connection accepted");
        // The gauge pairs with the decrement in ConnectionHandler::drop,
        // which runs whether or not the handshake completes.
        metrics::inc_session_active(1);
        metrics::inc_session_total("started");

        ConnectionHandler {
            config: Arc::clone(&self.config),
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            authenticator: Arc::clone(&self.authenticator),
            remote: peer_addr
                .map(|a| a.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            username: None,
            channels: HashMap::new(),
        }
    }

    fn handle_session_error(&mut self, error: <Self::Handler as russh::server::Handler>::Error) {
        // Failed handshakes and transport errors land here.
        debug!(error = %error, "session error");
    }
}

/// Per-connection SSH protocol handler.
struct ConnectionHandler {
    config: Arc<Config>,
    store: Arc<dyn UserStore>,
    cache: Arc<UserCache>,
    authenticator: Arc<Authenticator>,
    remote: String,
    username: Option<String>,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

fn publickey_only() -> MethodSet {
    let mut methods = MethodSet::empty();
    methods.push(MethodKind::PublicKey);
    methods
}

/// Tenant root under the data root. The subdir was validated at write
/// time; trimming keeps a hand-edited record from producing `//`.
fn user_root_path(data_root: &std::path::Path, root_subdir: &str, username: &str) -> PathBuf {
    let sub = root_subdir.trim_matches('/');
    if sub.is_empty() {
        data_root.join(username)
    } else {
        data_root.join(sub)
    }
}

async fn ensure_tenant_root(root: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if tokio::fs::metadata(root).await.is_ok() {
        return Ok(());
    }
    tokio::fs::create_dir_all(root).await?;
    tokio::fs::set_permissions(root, std::fs::Permissions::from_mode(0o750)).await
}

impl russh::server::Handler for ConnectionHandler {
    type Error = anyhow::Error;

    fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &ssh_key::PublicKey,
    ) -> impl Future<Output = std::result::Result<Auth, Self::Error>> + Send {
        let authenticator = Arc::clone(&self.authenticator);
        let remote = self.remote.clone();
        let user = user.to_string();
        let public_key = public_key.clone();
        let username = &mut self.username;

        async move {
            match authenticator.authenticate(&user, &remote, &public_key).await {
                AuthDecision::Accept => {
                    *username = Some(user);
                    Ok(Auth::Accept)
                }
                AuthDecision::Reject => Ok(Auth::Reject {
                    proceed_with_methods: Some(publickey_only()),
                    partial_success: false,
                }),
            }
        }
    }

    fn auth_password(
        &mut self,
        user: &str,
        _password: &str,
    ) -> impl Future<Output = std::result::Result<Auth, Self::Error>> + Send {
        audit(
            user,
            &self.remote,
            "auth_password_rejected",
            "",
            "",
            0,
            Some(&Error::PermissionDenied),
        );
        async move {
            Ok(Auth::Reject {
                proceed_with_methods: Some(publickey_only()),
                partial_success: false,
            })
        }
    }

    fn auth_succeeded(
        &mut self,
        _session: &mut Session,
    ) -> impl Future<Output = std::result::Result<(), Self::Error>> + Send {
        if let Some(user) = &self.username {
            audit(user, &self.remote, "session_start", "", "", 0, None);
        }
        async { Ok(()) }
    }

    fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> impl Future<Output = std::result::Result<bool, Self::Error>> + Send {
        debug!(remote = %self.remote, channel = ?channel.id(), "session channel opened");
        self.channels.insert(channel.id(), channel);
        async { Ok(true) }
    }

    fn channel_open_direct_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        _host_to_connect: &str,
        _port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> impl Future<Output = std::result::Result<bool, Self::Error>> + Send {
        // Only session channels are supported.
        async { Ok(false) }
    }

    fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> impl Future<Output = std::result::Result<(), Self::Error>> + Send {
        let remote = self.remote.clone();
        let user = self.username.clone().unwrap_or_default();

        if name != "sftp" {
            audit(
                &user,
                &remote,
                "subsystem_rejected",
                name,
                "",
                0,
                Some(&Error::Unsupported("unsupported subsystem".into())),
            );
            let _ = session.channel_failure(channel_id);
            return async { Ok(()) }.boxed();
        }

        let Some(channel) = self.channels.remove(&channel_id) else {
            warn!(remote = %remote, "sftp subsystem request without session channel");
            let _ = session.channel_failure(channel_id);
            return async { Ok(()) }.boxed();
        };
        if user.is_empty() {
            let _ = session.channel_failure(channel_id);
            return async { Ok(()) }.boxed();
        }

        let config = Arc::clone(&self.config);
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);

        let _ = session.channel_success(channel_id);

        async move {
            // Re-resolve the record at session time for rootSubdir and
            // quotas; auth may have run against an older cache entry.
            let record = match tokio::time::timeout(
                config.vault_timeout,
                cache.get_or_load(store.as_ref(), &user),
            )
            .await
            {
                Ok(Ok(record)) => record,
                Ok(Err(e)) => {
                    audit(&user, &remote, "user_load_failed", "", "", 0, Some(&e));
                    return Ok(());
                }
                Err(_) => {
                    audit(&user, &remote, "user_load_failed", "", "", 0, Some(&Error::TimedOut));
                    return Ok(());
                }
            };

            let root = user_root_path(&config.data_root, &record.root_subdir, &user);
            if let Err(e) = ensure_tenant_root(&root).await {
                let err = Error::from(e);
                audit(
                    &user,
                    &remote,
                    "user_root_mkdir_failed",
                    &root.to_string_lossy(),
                    "",
                    0,
                    Some(&err),
                );
                return Ok(());
            }

            let quota_bytes = if record.quota_bytes > 0 {
                record.quota_bytes
            } else {
                config.default_quota_bytes
            };
            let quota_files = if record.quota_files > 0 {
                record.quota_files
            } else {
                config.default_quota_files
            };

            info!(user = %user, remote = %remote, root = %root.display(), "sftp subsystem started");
            let fs = JailedFs::new(root, &user, &remote, quota_bytes, quota_files);
            russh_sftp::server::run(channel.into_stream(), fs).await;
            debug!(user = %user, remote = %remote, "sftp subsystem ended");

            Ok(())
        }
        .boxed()
    }

    fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> impl Future<Output = std::result::Result<(), Self::Error>> + Send {
        // No PTY is ever granted.
        let _ = session.channel_failure(channel);
        async { Ok(()) }
    }

    fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> impl Future<Output = std::result::Result<(), Self::Error>> + Send {
        let _ = session.channel_failure(channel);
        async { Ok(()) }
    }

    fn exec_request(
        &mut self,
        channel: ChannelId,
        _data: &[u8],
        session: &mut Session,
    ) -> impl Future<Output = std::result::Result<(), Self::Error>> + Send {
        let _ = session.channel_failure(channel);
        async { Ok(()) }
    }

    fn env_request(
        &mut self,
        channel: ChannelId,
        _variable_name: &str,
        _variable_value: &str,
        session: &mut Session,
    ) -> impl Future<Output = std::result::Result<(), Self::Error>> + Send {
        let _ = session.channel_failure(channel);
        async { Ok(()) }
    }

    fn window_change_request(
        &mut self,
        channel: ChannelId,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        session: &mut Session,
    ) -> impl Future<Output = std::result::Result<(), Self::Error>> + Send {
        let _ = session.channel_failure(channel);
        async { Ok(()) }
    }

    fn channel_close(
        &mut self,
        channel_id: ChannelId,
        _session: &mut Session,
    ) -> impl Future<Output = std::result::Result<(), Self::Error>> + Send {
        self.channels.remove(&channel_id);
        async { Ok(()) }
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        if let Some(user) = &self.username {
            audit(user, &self.remote, "session_end", "", "", 0, None);
        }
        metrics::inc_session_active(-1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_root_path_prefers_subdir() {
        let data_root = std::path::Path::new("/data");
        assert_eq!(
            user_root_path(data_root, "tenants/alice", "alice"),
            PathBuf::from("/data/tenants/alice")
        );
        assert_eq!(
            user_root_path(data_root, "", "alice"),
            PathBuf::from("/data/alice")
        );
        assert_eq!(
            user_root_path(data_root, "/alice/", "alice"),
            PathBuf::from("/data/alice")
        );
    }

    #[test]
    fn test_publickey_only_methods() {
        let methods = publickey_only();
        assert!(methods.contains(&MethodKind::PublicKey));
        assert!(!methods.contains(&MethodKind::Password));
    }
}
