//! # Pelican SFTP
//!
//! Multi-tenant SFTP service. Users, their authorized keys, and their
//! quotas live in Vault KV v2; each authenticated user is confined to a
//! private directory under the shared data root. Uploads stage to a
//! sibling temp file and commit by atomic rename, bounded by per-user
//! byte and file-count quotas. Every access decision and filesystem
//! mutation emits one structured audit record on stdout.

pub mod audit;
pub mod auth;
pub mod config;
pub mod fs;
pub mod jail;
pub mod metrics;
pub mod quota;
pub mod server;

pub use audit::{audit, AuditEvent};
pub use auth::{AuthDecision, Authenticator};
pub use config::Config;
pub use fs::JailedFs;
pub use metrics::MetricsConfig;
pub use quota::{dir_usage, AtomicQuotaWriter};
pub use server::SftpServer;
