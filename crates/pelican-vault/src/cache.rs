//! TTL cache over the user store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use pelican_core::{Result, UserRecord};
use tokio::sync::Mutex;

use crate::store::UserStore;

struct CachedUser {
    record: UserRecord,
    expires: Instant,
}

/// In-memory cache of user records with time-based expiry.
///
/// Expiry is strictly TTL; there is no size eviction and no single-flight,
/// so concurrent misses for the same key may duplicate the store call.
/// The map lock is never held across store I/O. Disabled users are cached
/// like any other; revocation latency is bounded by the TTL.
pub struct UserCache {
    ttl: Duration,
    disabled: bool,
    entries: Mutex<HashMap<String, CachedUser>>,
}

impl UserCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            disabled: false,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A disabled cache loads from the store on every call.
    pub fn disabled() -> Self {
        Self {
            ttl: Duration::ZERO,
            disabled: true,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached record for `username`, loading through `store`
    /// when missing or expired. Load failures propagate and leave the
    /// cache untouched.
    pub async fn get_or_load(&self, store: &dyn UserStore, username: &str) -> Result<UserRecord> {
        if self.disabled {
            return store.load_user(username).await;
        }

        let now = Instant::now();
        {
            let entries = self.entries.lock().await;
            if let Some(cached) = entries.get(username) {
                if cached.expires > now {
                    return Ok(cached.record.clone());
                }
            }
        }

        let record = store.load_user(username).await?;

        let mut entries = self.entries.lock().await;
        entries.insert(
            username.to_string(),
            CachedUser {
                record: record.clone(),
                expires: now + self.ttl,
            },
        );
        Ok(record)
    }
}
