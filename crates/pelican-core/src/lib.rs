//! Shared types for the pelican SFTP service.
//!
//! The user record lives in Vault and is the sole source of truth for
//! authorization; both the SFTP auth path and the admin API validate it
//! with the helpers in [`types`].

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{PartialUser, Usage, UserRecord};
