//! Shared bearer-token cache.
//!
//! One entry per tenant. Readers never observe an expired token: `get` evicts
//! expired entries as a side effect of the lookup. Two backends implement the
//! same trait, an in-memory map for single-process runs and a SQLite file that
//! worker processes can share.

mod memory;
mod schema;
mod sqlite_token_cache;

pub use memory::InMemoryTokenCache;
pub use sqlite_token_cache::SqliteTokenCache;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A cached credential and the instant after which it must not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Error)]
pub enum TokenCacheError {
    #[error("token cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("token cache lock poisoned")]
    Poisoned,
}

/// Process-wide store of tenant credentials.
///
/// All operations are atomic per tenant id and safe to call from any number
/// of tasks, threads or processes sharing the backing store.
pub trait TokenCache: Send + Sync {
    /// Returns the tenant's token if it has not expired, evicting it otherwise.
    fn get(&self, tenant_id: &str) -> Result<Option<String>, TokenCacheError>;

    /// Stores (or replaces) the tenant's token.
    fn set(
        &self,
        tenant_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), TokenCacheError>;

    /// Removes the tenant's token. Removing an absent entry is a no-op.
    fn invalidate(&self, tenant_id: &str) -> Result<(), TokenCacheError>;

    /// Claims the right to mint the tenant's next token until `expires_at`.
    ///
    /// Returns `false` while another holder owns an unexpired lease. Backends
    /// visible to a single process grant every request, since the broker's
    /// per-tenant lock already serializes minting there.
    fn try_lease(
        &self,
        _tenant_id: &str,
        _holder: &str,
        _expires_at: DateTime<Utc>,
    ) -> Result<bool, TokenCacheError> {
        Ok(true)
    }

    /// Drops a lease taken by `holder`. A lease owned by someone else is kept.
    fn release_lease(&self, _tenant_id: &str, _holder: &str) -> Result<(), TokenCacheError> {
        Ok(())
    }
}
