//! User records and validation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Conservative username policy, shared by the admin surface and the SFTP
/// auth path. Usernames become filesystem directory names and Vault path
/// segments, so keep it restrictive.
static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9._-]{0,31}$").expect("username regex"));

/// Returns true when `name` is an acceptable username.
pub fn valid_username(name: &str) -> bool {
    USERNAME_RE.is_match(name)
}

/// One tenant's record, persisted in the secret store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserRecord {
    pub username: String,
    pub disabled: bool,
    /// Authorized keys, one OpenSSH `authorized_keys` line each.
    pub public_keys: Vec<String>,
    /// Tenant directory under the data root. Defaults to the username.
    pub root_subdir: String,
    /// Byte quota for the tenant root. Zero means unlimited.
    pub quota_bytes: u64,
    /// File-count quota for the tenant root. Zero means unlimited.
    pub quota_files: u64,
    /// RFC 3339 timestamp stamped by the store on write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl UserRecord {
    /// Coerce a KV v2 payload map into a record.
    ///
    /// The store is schemaless, so be tolerant: `publicKeys` may arrive as
    /// a heterogeneous array (non-strings dropped), numbers may be signed,
    /// and a missing `username` is filled from the lookup argument.
    pub fn from_kv(value: &Value, fallback_username: &str) -> Self {
        let mut record = UserRecord::default();

        if let Some(v) = value.get("username").and_then(Value::as_str) {
            record.username = v.to_string();
        }
        if record.username.is_empty() {
            record.username = fallback_username.to_string();
        }
        if let Some(v) = value.get("disabled").and_then(Value::as_bool) {
            record.disabled = v;
        }
        if let Some(v) = value.get("rootSubdir").and_then(Value::as_str) {
            record.root_subdir = v.to_string();
        }
        if let Some(v) = value.get("updatedAt").and_then(Value::as_str) {
            record.updated_at = Some(v.to_string());
        }
        if let Some(v) = value.get("quotaBytes").and_then(Value::as_u64) {
            record.quota_bytes = v;
        }
        if let Some(v) = value.get("quotaFiles").and_then(Value::as_u64) {
            record.quota_files = v;
        }
        if let Some(keys) = value.get("publicKeys").and_then(Value::as_array) {
            record.public_keys = keys
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }

        record
    }

    /// Normalize and validate a record before writing it to the store.
    ///
    /// When `username_from_path` is set (PUT/PATCH), it wins over the body.
    /// `require_keys` enforces at least one public key; every key line
    /// must have at least two whitespace-separated fields (the SFTP side
    /// does the real parsing).
    pub fn normalize_and_validate(
        &mut self,
        username_from_path: Option<&str>,
        require_keys: bool,
    ) -> Result<()> {
        if let Some(name) = username_from_path {
            self.username = name.to_string();
        }
        self.username = self.username.trim().to_string();
        self.root_subdir = self.root_subdir.trim().to_string();

        if !valid_username(&self.username) {
            return Err(Error::InvalidInput("invalid username".into()));
        }

        if self.root_subdir.is_empty() {
            self.root_subdir = self.username.clone();
        }
        if self.root_subdir.contains("..")
            || self.root_subdir.starts_with('/')
            || self.root_subdir.contains('\\')
        {
            return Err(Error::InvalidInput("invalid rootSubdir".into()));
        }

        self.public_keys = self
            .public_keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if require_keys && self.public_keys.is_empty() {
            return Err(Error::InvalidInput("publicKeys required".into()));
        }
        for key in &self.public_keys {
            if key.split_whitespace().count() < 2 {
                return Err(Error::InvalidInput("invalid SSH public key format".into()));
            }
        }

        Ok(())
    }
}

/// Partial record for PATCH. Options distinguish "unset" from "set to the
/// zero value".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialUser {
    pub disabled: Option<bool>,
    pub public_keys: Option<Vec<String>>,
    pub root_subdir: Option<String>,
    pub quota_bytes: Option<u64>,
    pub quota_files: Option<u64>,
}

impl PartialUser {
    /// Apply the provided fields onto `record`.
    pub fn apply(self, record: &mut UserRecord) {
        if let Some(v) = self.disabled {
            record.disabled = v;
        }
        if let Some(v) = self.public_keys {
            record.public_keys = v;
        }
        if let Some(v) = self.root_subdir {
            record.root_subdir = v;
        }
        if let Some(v) = self.quota_bytes {
            record.quota_bytes = v;
        }
        if let Some(v) = self.quota_files {
            record.quota_files = v;
        }
    }
}

/// Byte and file totals for a tenant root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub bytes: u64,
    pub files: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_username_boundaries() {
        assert!(valid_username("alice"));
        assert!(valid_username("a"));
        assert!(valid_username("user.name_1-x"));
        // 32 characters of legal alphabet: accepted.
        assert!(valid_username(&"a".repeat(32)));
        // 33: rejected.
        assert!(!valid_username(&"a".repeat(33)));
        assert!(!valid_username(""));
        assert!(!valid_username("Alice"));
        assert!(!valid_username(".leading-dot"));
        assert!(!valid_username("has space"));
    }

    #[test]
    fn test_from_kv_fills_username_and_drops_non_strings() {
        let payload = json!({
            "disabled": true,
            "rootSubdir": "tenants/alice",
            "publicKeys": ["ssh-ed25519 AAAA alice@host", 42, null, "ssh-rsa BBBB"],
            "quotaBytes": 1024,
        });
        let record = UserRecord::from_kv(&payload, "alice");
        assert_eq!(record.username, "alice");
        assert!(record.disabled);
        assert_eq!(record.root_subdir, "tenants/alice");
        assert_eq!(record.public_keys.len(), 2);
        assert_eq!(record.quota_bytes, 1024);
        assert_eq!(record.quota_files, 0);
    }

    #[test]
    fn test_normalize_defaults_root_subdir() {
        let mut record = UserRecord {
            username: " bob ".into(),
            public_keys: vec!["ssh-ed25519 AAAA".into()],
            ..Default::default()
        };
        record.normalize_and_validate(None, true).unwrap();
        assert_eq!(record.username, "bob");
        assert_eq!(record.root_subdir, "bob");
    }

    #[test]
    fn test_normalize_rejects_bad_root_subdir() {
        for bad in ["../escape", "/abs", "a\\b"] {
            let mut record = UserRecord {
                username: "bob".into(),
                root_subdir: bad.into(),
                public_keys: vec!["ssh-ed25519 AAAA".into()],
                ..Default::default()
            };
            assert!(record.normalize_and_validate(None, true).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_normalize_requires_keys_with_two_fields() {
        let mut record = UserRecord {
            username: "bob".into(),
            public_keys: vec!["just-one-field".into()],
            ..Default::default()
        };
        assert!(record.normalize_and_validate(None, true).is_err());

        let mut record = UserRecord {
            username: "bob".into(),
            public_keys: vec!["  ".into()],
            ..Default::default()
        };
        // Blank entries are dropped, leaving no keys at all.
        assert!(record.normalize_and_validate(None, true).is_err());
        assert!(record.normalize_and_validate(None, false).is_ok());
    }

    #[test]
    fn test_path_username_wins() {
        let mut record = UserRecord {
            username: "body-name".into(),
            public_keys: vec!["ssh-ed25519 AAAA".into()],
            ..Default::default()
        };
        record.normalize_and_validate(Some("pathname"), true).unwrap();
        assert_eq!(record.username, "pathname");
    }

    #[test]
    fn test_partial_apply_preserves_unset() {
        let mut record = UserRecord {
            username: "bob".into(),
            disabled: false,
            public_keys: vec!["ssh-ed25519 AAAA".into()],
            root_subdir: "bob".into(),
            quota_bytes: 10,
            quota_files: 5,
            updated_at: None,
        };
        let patch = PartialUser {
            disabled: Some(true),
            ..Default::default()
        };
        patch.apply(&mut record);
        assert!(record.disabled);
        assert_eq!(record.quota_bytes, 10);
        assert_eq!(record.root_subdir, "bob");
    }

    #[test]
    fn test_record_wire_field_names() {
        let record = UserRecord {
            username: "alice".into(),
            public_keys: vec!["ssh-ed25519 AAAA".into()],
            root_subdir: "alice".into(),
            quota_bytes: 1,
            ..Default::default()
        };
        let v = serde_json::to_value(&record).unwrap();
        assert!(v.get("publicKeys").is_some());
        assert!(v.get("rootSubdir").is_some());
        assert!(v.get("quotaBytes").is_some());
        assert!(v.get("updatedAt").is_none());
    }
}
