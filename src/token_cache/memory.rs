use super::{CachedToken, TokenCache, TokenCacheError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// Token cache scoped to the current process.
///
/// A single coarse lock guards the map, so the token and its expiry are always
/// read and written as a pair.
#[derive(Default)]
pub struct InMemoryTokenCache {
    entries: Mutex<HashMap<String, CachedToken>>,
}

impl InMemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw entry lookup without expiry checks.
    pub fn peek(&self, tenant_id: &str) -> Option<CachedToken> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(tenant_id).cloned())
    }
}

impl TokenCache for InMemoryTokenCache {
    fn get(&self, tenant_id: &str) -> Result<Option<String>, TokenCacheError> {
        let mut entries = self.entries.lock().map_err(|_| TokenCacheError::Poisoned)?;
        match entries.get(tenant_id) {
            Some(entry) if entry.is_valid_at(Utc::now()) => Ok(Some(entry.token.clone())),
            Some(_) => {
                entries.remove(tenant_id);
                info!("[{}] Expired token evicted from cache", tenant_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(
        &self,
        tenant_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), TokenCacheError> {
        let mut entries = self.entries.lock().map_err(|_| TokenCacheError::Poisoned)?;
        entries.insert(
            tenant_id.to_string(),
            CachedToken {
                token: token.to_string(),
                expires_at,
            },
        );
        let ttl = (expires_at - Utc::now()).num_seconds();
        info!("[{}] Token stored (expires in {}s)", tenant_id, ttl);
        Ok(())
    }

    fn invalidate(&self, tenant_id: &str) -> Result<(), TokenCacheError> {
        let mut entries = self.entries.lock().map_err(|_| TokenCacheError::Poisoned)?;
        if entries.remove(tenant_id).is_some() {
            info!("[{}] Token removed from cache", tenant_id);
        }
        Ok(())
    }
}
