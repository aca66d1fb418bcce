//! Audit trail: one line-delimited JSON record per security- or
//! IO-relevant event, on stdout.
//!
//! Operational logs go to stderr via `tracing`; the audit stream is kept
//! separate so it can be shipped as-is. The sink never fails the calling
//! operation.

use std::io::Write;

use chrono::{SecondsFormat, Utc};
use pelican_core::Error;
use serde::Serialize;

/// A single audit record. Created and emitted as one unit, never updated.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub ts: String,
    pub user: String,
    pub remote: String,
    pub action: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub target: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub bytes: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// Emit an audit event. `success` is derived from `err`.
pub fn audit(
    user: &str,
    remote: &str,
    action: &str,
    path: &str,
    target: &str,
    bytes: u64,
    err: Option<&Error>,
) {
    let event = AuditEvent {
        ts: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        user: user.to_string(),
        remote: remote.to_string(),
        action: action.to_string(),
        path: path.to_string(),
        target: target.to_string(),
        bytes,
        success: err.is_none(),
        error: err.map(|e| e.to_string()).unwrap_or_default(),
    };
    emit(&event);
}

fn emit(event: &AuditEvent) {
    // Serialization or write failures are swallowed; auditing must never
    // fail a user operation. Single writeln keeps lines newline-atomic.
    if let Ok(line) = serde_json::to_string(event) {
        let stdout = std::io::stdout();
        let _ = writeln!(stdout.lock(), "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_derived_from_error() {
        let event = AuditEvent {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            user: "alice".into(),
            remote: "10.0.0.1:50022".into(),
            action: "auth_ok".into(),
            path: String::new(),
            target: String::new(),
            bytes: 0,
            success: true,
            error: String::new(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"success\":true"));
        // Empty fields are omitted entirely.
        assert!(!json.contains("\"path\""));
        assert!(!json.contains("\"bytes\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_failure_carries_error_string() {
        let event = AuditEvent {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            user: "dave".into(),
            remote: "10.0.0.2:50100".into(),
            action: "put_fail".into(),
            path: "/big.bin".into(),
            target: String::new(),
            bytes: 600,
            success: false,
            error: "quota exceeded".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("\"bytes\":600"));
        assert!(json.contains("quota exceeded"));
    }

    #[test]
    fn test_audit_does_not_panic() {
        audit("carol", "127.0.0.1:4", "ls", "/", "", 0, None);
        audit(
            "carol",
            "127.0.0.1:4",
            "rename",
            "/a",
            "/b",
            0,
            Some(&Error::PathEscapes),
        );
    }
}
