//! Environment configuration for the SFTP server.

use std::path::PathBuf;
use std::time::Duration;

use pelican_core::{Error, Result};

/// SFTP server configuration, loaded from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP listen address for the SSH listener.
    pub listen_addr: String,
    /// Shared data volume; each tenant gets a subdirectory.
    pub data_root: PathBuf,
    /// OpenSSH-format host private key.
    pub host_key_path: PathBuf,

    pub vault_addr: String,
    pub vault_token: String,
    pub vault_users_prefix: String,

    /// Applied when the user record leaves a quota at zero.
    pub default_quota_bytes: u64,
    pub default_quota_files: u64,

    /// Deadline for each secret-store call.
    pub vault_timeout: Duration,
    /// User cache TTL; bounds revocation latency.
    pub user_cache_ttl: Duration,
    pub disable_user_cache: bool,
}

impl Config {
    /// Load configuration from the environment. `VAULT_ADDR` and
    /// `VAULT_TOKEN` are required; everything else has defaults.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            listen_addr: env_string("LISTEN_ADDR", "0.0.0.0:2022"),
            data_root: PathBuf::from(env_string("DATA_ROOT", "/data")),
            host_key_path: PathBuf::from(env_string(
                "HOST_KEY_PATH",
                "/keys/ssh_host_ed25519_key",
            )),
            vault_addr: env_string("VAULT_ADDR", ""),
            vault_token: env_string("VAULT_TOKEN", ""),
            vault_users_prefix: env_string("VAULT_USERS_PREFIX", "kv/sftp/users"),
            default_quota_bytes: env_u64("DEFAULT_QUOTA_BYTES", 0),
            default_quota_files: env_u64("DEFAULT_QUOTA_FILES", 0),
            vault_timeout: env_duration("VAULT_TIMEOUT", Duration::from_secs(5)),
            user_cache_ttl: env_duration("USER_CACHE_TTL", Duration::from_secs(30)),
            disable_user_cache: env_bool("DISABLE_USER_CACHE", false),
        };

        if config.vault_addr.is_empty() {
            return Err(Error::Config("VAULT_ADDR is required".into()));
        }
        if config.vault_token.is_empty() {
            return Err(Error::Config("VAULT_TOKEN is required".into()));
        }
        Ok(config)
    }
}

fn env_string(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

pub(crate) fn parse_u64(raw: Option<String>, default: u64) -> u64 {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

pub(crate) fn parse_bool(raw: Option<String>, default: bool) -> bool {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

pub(crate) fn parse_duration(raw: Option<String>, default: Duration) -> Duration {
    raw.and_then(|v| humantime::parse_duration(v.trim()).ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    parse_u64(std::env::var(key).ok(), default)
}

fn env_bool(key: &str, default: bool) -> bool {
    parse_bool(std::env::var(key).ok(), default)
}

fn env_duration(key: &str, default: Duration) -> Duration {
    parse_duration(std::env::var(key).ok(), default)
}
