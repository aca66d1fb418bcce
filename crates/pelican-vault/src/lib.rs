//! Vault KV v2 user store for the pelican SFTP service.
//!
//! The record for a user `alice` under the prefix `kv/sftp/users` lives at
//! `kv/data/sftp/users/alice`; its lifecycle (deletion, listing) goes
//! through `kv/metadata/sftp/users/...`. The client speaks the Vault HTTP
//! API directly; callers bound each call with their own deadline.

pub mod cache;
pub mod client;
pub mod store;

pub use cache::UserCache;
pub use client::{Kv2Paths, VaultClient};
pub use store::UserStore;
