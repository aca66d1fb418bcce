//! HTTP client for the Vault KV v2 user store.

use std::sync::Arc;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use pelican_core::{Error, Result, UserRecord};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;

/// Observer hook for store request metrics: `(op, result, latency)`.
pub type StoreObserver = Arc<dyn Fn(&str, &str, std::time::Duration) + Send + Sync>;

/// KV v2 logical paths for one user prefix.
///
/// A prefix like `kv/sftp/users` splits into the mount (`kv`) and the
/// subpath (`sftp/users`); data lives under `<mount>/data/<sub>` and
/// lifecycle under `<mount>/metadata/<sub>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kv2Paths {
    pub mount: String,
    pub sub: String,
}

impl Kv2Paths {
    /// Derive the mount and subpath from a users prefix.
    pub fn derive(prefix: &str) -> Result<Self> {
        let trimmed = prefix.trim_matches('/');
        let (mount, sub) = match trimmed.split_once('/') {
            Some((mount, sub)) => (mount, sub.trim_matches('/')),
            None => (trimmed, ""),
        };
        if mount.is_empty() || sub.is_empty() {
            return Err(Error::Config(format!("invalid users prefix: {prefix:?}")));
        }
        Ok(Self {
            mount: mount.to_string(),
            sub: sub.to_string(),
        })
    }

    pub fn data_path(&self, username: &str) -> String {
        format!("{}/data/{}/{}", self.mount, self.sub, username)
    }

    pub fn metadata_path(&self, username: &str) -> String {
        format!("{}/metadata/{}/{}", self.mount, self.sub, username)
    }

    pub fn metadata_base(&self) -> String {
        format!("{}/metadata/{}", self.mount, self.sub)
    }
}

/// Vault KV v2 client bound to one users prefix.
///
/// Calls carry no internal timeout; callers wrap them in their own
/// deadline. Dropping an in-flight future aborts the request.
pub struct VaultClient {
    http: reqwest::Client,
    addr: String,
    token: String,
    paths: Kv2Paths,
    observer: Option<StoreObserver>,
}

impl VaultClient {
    pub fn new(addr: &str, token: &str, users_prefix: &str) -> Result<Self> {
        if addr.is_empty() {
            return Err(Error::Config("VAULT_ADDR is required".into()));
        }
        if token.is_empty() {
            return Err(Error::Config("VAULT_TOKEN is required".into()));
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            addr: addr.trim_end_matches('/').to_string(),
            token: token.to_string(),
            paths: Kv2Paths::derive(users_prefix)?,
            observer: None,
        })
    }

    /// Install a metrics observer for store requests.
    pub fn with_observer(mut self, observer: StoreObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    fn url(&self, logical_path: &str) -> String {
        format!("{}/v1/{}", self.addr, logical_path)
    }

    fn observe(&self, op: &str, start: Instant, ok: bool) {
        if let Some(observer) = &self.observer {
            let result = if ok { "success" } else { "error" };
            observer(op, result, start.elapsed());
        }
    }

    pub async fn load_user(&self, username: &str) -> Result<UserRecord> {
        let start = Instant::now();
        let out = self.load_user_inner(username).await;
        self.observe("read", start, out.is_ok());
        out
    }

    async fn load_user_inner(&self, username: &str) -> Result<UserRecord> {
        let url = self.url(&self.paths.data_path(username));
        let resp = self
            .http
            .get(&url)
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => return Err(Error::NotFound),
            s if !s.is_success() => {
                return Err(Error::Store(format!("vault read returned {s}")));
            }
            _ => {}
        }

        let body: Value = resp.json().await.map_err(|e| Error::Store(e.to_string()))?;
        // KV v2 wraps the record fields one level down.
        let Some(fields) = body.get("data").and_then(|d| d.get("data")) else {
            return Err(Error::NotFound);
        };
        if fields.is_null() {
            return Err(Error::NotFound);
        }

        debug!(username, "loaded user record from vault");
        Ok(UserRecord::from_kv(fields, username))
    }

    pub async fn save_user(&self, record: &UserRecord) -> Result<()> {
        let start = Instant::now();
        let out = self.save_user_inner(record).await;
        self.observe("write", start, out.is_ok());
        out
    }

    async fn save_user_inner(&self, record: &UserRecord) -> Result<()> {
        let mut stamped = record.clone();
        stamped.updated_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

        let url = self.url(&self.paths.data_path(&stamped.username));
        let resp = self
            .http
            .post(&url)
            .header("X-Vault-Token", &self.token)
            .json(&json!({ "data": stamped }))
            .send()
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::Store(format!("vault write returned {}", resp.status())));
        }
        Ok(())
    }

    pub async fn delete_user(&self, username: &str) -> Result<()> {
        let start = Instant::now();
        let out = self.delete_user_inner(username).await;
        self.observe("delete", start, out.is_ok());
        out
    }

    async fn delete_user_inner(&self, username: &str) -> Result<()> {
        // Existence check first so callers can distinguish a 404.
        self.load_user_inner(username).await?;

        let url = self.url(&self.paths.metadata_path(username));
        let resp = self
            .http
            .delete(&url)
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::Store(format!("vault delete returned {}", resp.status())));
        }
        Ok(())
    }

    pub async fn list_usernames(&self) -> Result<Vec<String>> {
        let start = Instant::now();
        let out = self.list_usernames_inner().await;
        self.observe("list", start, out.is_ok());
        out
    }

    async fn list_usernames_inner(&self) -> Result<Vec<String>> {
        let url = self.url(&self.paths.metadata_base());
        let resp = self
            .http
            .get(&url)
            .query(&[("list", "true")])
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => return Ok(Vec::new()),
            s if !s.is_success() => {
                return Err(Error::Store(format!("vault list returned {s}")));
            }
            _ => {}
        }

        let body: Value = resp.json().await.map_err(|e| Error::Store(e.to_string()))?;
        let keys = body
            .get("data")
            .and_then(|d| d.get("keys"))
            .and_then(Value::as_array)
            .map(|keys| {
                keys.iter()
                    .filter_map(Value::as_str)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(keys)
    }
}

#[async_trait::async_trait]
impl crate::store::UserStore for VaultClient {
    async fn load_user(&self, username: &str) -> Result<UserRecord> {
        VaultClient::load_user(self, username).await
    }

    async fn save_user(&self, record: &UserRecord) -> Result<()> {
        VaultClient::save_user(self, record).await
    }

    async fn delete_user(&self, username: &str) -> Result<()> {
        VaultClient::delete_user(self, username).await
    }

    async fn list_usernames(&self) -> Result<Vec<String>> {
        VaultClient::list_usernames(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv2_paths_derivation() {
        let paths = Kv2Paths::derive("kv/sftp/users").unwrap();
        assert_eq!(paths.data_path("alice"), "kv/data/sftp/users/alice");
        assert_eq!(paths.metadata_path("alice"), "kv/metadata/sftp/users/alice");
        assert_eq!(paths.metadata_base(), "kv/metadata/sftp/users");
    }

    #[test]
    fn test_kv2_paths_trims_slashes() {
        let paths = Kv2Paths::derive("/secret/sftp/users/").unwrap();
        assert_eq!(paths.mount, "secret");
        assert_eq!(paths.sub, "sftp/users");
    }

    #[test]
    fn test_kv2_paths_requires_subpath() {
        assert!(Kv2Paths::derive("kv").is_err());
        assert!(Kv2Paths::derive("kv/").is_err());
        assert!(Kv2Paths::derive("").is_err());
    }

    #[test]
    fn test_client_requires_addr_and_token() {
        assert!(VaultClient::new("", "tok", "kv/sftp/users").is_err());
        assert!(VaultClient::new("http://vault:8200", "", "kv/sftp/users").is_err());
        assert!(VaultClient::new("http://vault:8200", "tok", "kv/sftp/users").is_ok());
    }
}
