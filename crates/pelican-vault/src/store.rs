//! Store abstraction over the user backend.

use async_trait::async_trait;
use pelican_core::{Result, UserRecord};

/// Backend holding user records, keyed by username.
///
/// [`crate::VaultClient`] is the production implementation; tests use
/// in-memory fakes.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Load one record. `Err(Error::NotFound)` when absent.
    async fn load_user(&self, username: &str) -> Result<UserRecord>;

    /// Create or fully replace a record, stamping `updatedAt`.
    async fn save_user(&self, record: &UserRecord) -> Result<()>;

    /// Delete a record. `Err(Error::NotFound)` when absent.
    async fn delete_user(&self, username: &str) -> Result<()>;

    /// List usernames present in the store.
    async fn list_usernames(&self) -> Result<Vec<String>>;
}
