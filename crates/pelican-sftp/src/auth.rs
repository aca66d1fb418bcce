//! Public-key authentication against the user store.
//!
//! The decision is deliberately opaque: whatever the sub-reason (unknown
//! user, disabled, wrong key, store failure), the client sees the same
//! rejection. The audit stream carries the precise reason.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pelican_core::Error;
use pelican_vault::{UserCache, UserStore};
use russh::keys::ssh_key::PublicKey;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::audit::audit;
use crate::metrics;

/// Outcome of one auth attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Accept,
    Reject,
}

/// Cache-backed public-key authenticator shared by all connections.
pub struct Authenticator {
    store: Arc<dyn UserStore>,
    cache: Arc<UserCache>,
    vault_timeout: Duration,
}

impl Authenticator {
    pub fn new(store: Arc<dyn UserStore>, cache: Arc<UserCache>, vault_timeout: Duration) -> Self {
        Self {
            store,
            cache,
            vault_timeout,
        }
    }

    /// Decide one public-key offer, recording audit and metrics.
    pub async fn authenticate(
        &self,
        user: &str,
        remote: &str,
        key: &PublicKey,
    ) -> AuthDecision {
        let start = Instant::now();
        let (decision, result) = self.decide(user, remote, key).await;
        metrics::observe_auth(user, result, start.elapsed());
        decision
    }

    async fn decide(
        &self,
        user: &str,
        remote: &str,
        key: &PublicKey,
    ) -> (AuthDecision, &'static str) {
        let load = tokio::time::timeout(
            self.vault_timeout,
            self.cache.get_or_load(self.store.as_ref(), user),
        )
        .await;

        let record = match load {
            Err(_) => {
                audit(user, remote, "auth_fail_user_load", "", "", 0, Some(&Error::TimedOut));
                return (AuthDecision::Reject, metrics::AUTH_FAIL_USER_LOAD);
            }
            Ok(Err(e)) => {
                audit(user, remote, "auth_fail_user_load", "", "", 0, Some(&e));
                return (AuthDecision::Reject, metrics::AUTH_FAIL_USER_LOAD);
            }
            Ok(Ok(record)) => record,
        };

        if record.disabled {
            audit(
                user,
                remote,
                "auth_fail_disabled",
                "",
                "",
                0,
                Some(&Error::PermissionDenied),
            );
            return (AuthDecision::Reject, metrics::AUTH_FAIL_DISABLED);
        }

        if !key_is_authorized(key, &record.public_keys) {
            audit(
                user,
                remote,
                "auth_fail_key",
                "",
                "",
                0,
                Some(&Error::PermissionDenied),
            );
            return (AuthDecision::Reject, metrics::AUTH_FAIL_KEY);
        }

        audit(user, remote, "auth_ok", "", "", 0, None);
        (AuthDecision::Accept, metrics::AUTH_OK)
    }
}

/// Whether the presented key's wire bytes match any authorized-keys entry.
///
/// Entries that fail to parse are skipped silently; comparison of the
/// serialized forms is constant-time.
pub fn key_is_authorized(presented: &PublicKey, allowed: &[String]) -> bool {
    let Ok(presented_bytes) = presented.to_bytes() else {
        return false;
    };

    for entry in allowed {
        let parsed = match PublicKey::from_openssh(entry.trim()) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(error = %e, "skipping unparsable authorized key");
                continue;
            }
        };
        let Ok(entry_bytes) = parsed.to_bytes() else {
            continue;
        };
        if entry_bytes.len() != presented_bytes.len() {
            continue;
        }
        if bool::from(entry_bytes.ct_eq(&presented_bytes)) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pelican_core::{Result, UserRecord};

    const KEY_A: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEB alice@host";
    const KEY_B: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgIC bob@host";

    fn parse(line: &str) -> PublicKey {
        PublicKey::from_openssh(line).unwrap()
    }

    #[test]
    fn test_matching_key_accepted() {
        assert!(key_is_authorized(&parse(KEY_A), &[KEY_A.to_string()]));
    }

    #[test]
    fn test_wrong_key_rejected() {
        assert!(!key_is_authorized(&parse(KEY_A), &[KEY_B.to_string()]));
    }

    #[test]
    fn test_unparsable_entries_skipped() {
        let allowed = vec![
            "garbage".to_string(),
            "ssh-ed25519 not-base64".to_string(),
            KEY_A.to_string(),
        ];
        assert!(key_is_authorized(&parse(KEY_A), &allowed));
    }

    #[test]
    fn test_empty_list_rejected() {
        assert!(!key_is_authorized(&parse(KEY_A), &[]));
    }

    struct FixedStore(Option<UserRecord>);

    #[async_trait]
    impl UserStore for FixedStore {
        async fn load_user(&self, _username: &str) -> Result<UserRecord> {
            self.0.clone().ok_or(Error::NotFound)
        }
        async fn save_user(&self, _record: &UserRecord) -> Result<()> {
            Ok(())
        }
        async fn delete_user(&self, _username: &str) -> Result<()> {
            Ok(())
        }
        async fn list_usernames(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn authenticator(record: Option<UserRecord>) -> Authenticator {
        Authenticator::new(
            Arc::new(FixedStore(record)),
            Arc::new(UserCache::new(Duration::from_secs(30))),
            Duration::from_secs(5),
        )
    }

    fn user_with_key(key: &str, disabled: bool) -> UserRecord {
        UserRecord {
            username: "alice".into(),
            disabled,
            public_keys: vec![key.to_string()],
            root_subdir: "alice".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_accepts_known_key() {
        let auth = authenticator(Some(user_with_key(KEY_A, false)));
        let decision = auth.authenticate("alice", "10.0.0.1:1", &parse(KEY_A)).await;
        assert_eq!(decision, AuthDecision::Accept);
    }

    #[tokio::test]
    async fn test_rejects_wrong_key() {
        let auth = authenticator(Some(user_with_key(KEY_A, false)));
        let decision = auth.authenticate("alice", "10.0.0.1:1", &parse(KEY_B)).await;
        assert_eq!(decision, AuthDecision::Reject);
    }

    #[tokio::test]
    async fn test_rejects_disabled_user_with_valid_key() {
        let auth = authenticator(Some(user_with_key(KEY_A, true)));
        let decision = auth.authenticate("alice", "10.0.0.1:1", &parse(KEY_A)).await;
        assert_eq!(decision, AuthDecision::Reject);
    }

    #[tokio::test]
    async fn test_rejects_unknown_user() {
        let auth = authenticator(None);
        let decision = auth.authenticate("ghost", "10.0.0.1:1", &parse(KEY_A)).await;
        assert_eq!(decision, AuthDecision::Reject);
    }
}
