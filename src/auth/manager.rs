use super::{AuthError, CredentialIssuer};
use crate::metrics;
use crate::tenants::Tenant;
use crate::token_cache::TokenCache;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How long a mint lease stays valid if its holder never releases it.
const MINT_LEASE_TTL: Duration = Duration::from_secs(30);

/// How often a caller waiting on another holder's lease re-checks the cache.
const LEASE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared credential state for the whole process.
///
/// Owns the token cache, the issuer, and one single-flight lock per tenant so
/// that concurrent misses for the same tenant mint a single credential. Across
/// processes sharing a cache file, the cache's mint lease plays the same role.
pub struct CredentialBroker {
    cache: Arc<dyn TokenCache>,
    issuer: Arc<dyn CredentialIssuer>,
    safety_margin: Duration,
    refresh_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CredentialBroker {
    pub fn new(
        cache: Arc<dyn TokenCache>,
        issuer: Arc<dyn CredentialIssuer>,
        safety_margin: Duration,
    ) -> Self {
        Self {
            cache,
            issuer,
            safety_margin,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Credential manager bound to one tenant.
    pub fn for_tenant(self: &Arc<Self>, tenant: &Tenant) -> AuthManager {
        AuthManager {
            broker: Arc::clone(self),
            tenant: tenant.clone(),
            refresh_lock: self.refresh_lock(&tenant.id),
        }
    }

    pub fn cache(&self) -> &Arc<dyn TokenCache> {
        &self.cache
    }

    fn refresh_lock(&self, tenant_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        // A poisoned map only ever held Arc clones, recover it
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(tenant_id.to_string()).or_default())
    }
}

/// Credential issuer for a single tenant.
pub struct AuthManager {
    broker: Arc<CredentialBroker>,
    tenant: Tenant,
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AuthManager {
    pub fn tenant_id(&self) -> &str {
        &self.tenant.id
    }

    /// Returns a valid token, from cache when possible.
    pub async fn get_token(&self) -> Result<String, AuthError> {
        if let Some(token) = self.broker.cache.get(&self.tenant.id)? {
            debug!("[{}] Token served from cache", self.tenant.id);
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another task may have minted while we waited for the lock
        if let Some(token) = self.broker.cache.get(&self.tenant.id)? {
            debug!("[{}] Token minted by a concurrent caller", self.tenant.id);
            return Ok(token);
        }
        match self.wait_for_lease(|_| true).await? {
            LeaseWait::Minted(token) => {
                debug!("[{}] Token minted by another process", self.tenant.id);
                Ok(token)
            }
            LeaseWait::Held(_lease) => self.request_new_token().await,
        }
    }

    /// Removes the tenant's cached token.
    pub fn invalidate(&self) -> Result<(), AuthError> {
        self.broker.cache.invalidate(&self.tenant.id)?;
        info!("[{}] Token invalidated", self.tenant.id);
        Ok(())
    }

    /// Invalidates the cached token and mints a new one.
    pub async fn refresh_after_401(&self) -> Result<String, AuthError> {
        let _guard = self.refresh_lock.lock().await;
        match self.wait_for_lease(|_| false).await? {
            LeaseWait::Minted(token) => Ok(token),
            LeaseWait::Held(_lease) => self.refresh_locked(None).await,
        }
    }

    /// Recovery path after the API rejected `rejected`.
    ///
    /// If a concurrent caller, in this process or another one sharing the
    /// cache, already replaced that token, the replacement is returned instead
    /// of minting again.
    pub async fn refresh_rejected(&self, rejected: &str) -> Result<String, AuthError> {
        let _guard = self.refresh_lock.lock().await;
        match self.wait_for_lease(|current| current != rejected).await? {
            LeaseWait::Minted(current) => {
                debug!("[{}] Token already refreshed by a concurrent caller", self.tenant.id);
                Ok(current)
            }
            LeaseWait::Held(_lease) => self.refresh_locked(Some(rejected)).await,
        }
    }

    /// Takes the cache's mint lease for this tenant, or returns early with a
    /// cached token that `reusable` accepts.
    ///
    /// The cache is checked again once the lease is held, since the previous
    /// holder may have stored a token just before releasing it.
    async fn wait_for_lease(
        &self,
        reusable: impl Fn(&str) -> bool,
    ) -> Result<LeaseWait<'_>, AuthError> {
        let holder = Uuid::new_v4().to_string();
        let mut waited = false;
        loop {
            let expires_at =
                Utc::now() + chrono::Duration::from_std(MINT_LEASE_TTL).unwrap_or_default();
            if self.broker.cache.try_lease(&self.tenant.id, &holder, expires_at)? {
                let lease = MintLease {
                    cache: &self.broker.cache,
                    tenant_id: &self.tenant.id,
                    holder,
                };
                if let Some(token) = self.broker.cache.get(&self.tenant.id)? {
                    if reusable(token.as_str()) {
                        return Ok(LeaseWait::Minted(token));
                    }
                }
                return Ok(LeaseWait::Held(lease));
            }

            if !waited {
                debug!("[{}] Another process is minting, waiting", self.tenant.id);
                waited = true;
            }
            tokio::time::sleep(LEASE_POLL_INTERVAL).await;
            if let Some(token) = self.broker.cache.get(&self.tenant.id)? {
                if reusable(token.as_str()) {
                    return Ok(LeaseWait::Minted(token));
                }
            }
        }
    }

    /// Caller must hold `refresh_lock` and the mint lease.
    async fn refresh_locked(&self, rejected: Option<&str>) -> Result<String, AuthError> {
        warn!("[{}] Token expired or rejected, renewing", self.tenant.id);
        let previous = self.broker.cache.get(&self.tenant.id)?;
        self.invalidate()?;
        let token = self.request_new_token().await?;
        if previous.as_deref() == Some(token.as_str()) || rejected == Some(token.as_str()) {
            self.invalidate()?;
            return Err(AuthError::StaleCredential);
        }
        Ok(token)
    }

    async fn request_new_token(&self) -> Result<String, AuthError> {
        info!("[{}] Requesting new token from identity endpoint", self.tenant.id);

        let issued = match self.broker.issuer.issue(&self.tenant).await {
            Ok(issued) => issued,
            Err(e) => {
                metrics::record_token_request("failed");
                error!("[{}] Token request failed: {}", self.tenant.id, e);
                return Err(e);
            }
        };
        metrics::record_token_request("issued");

        let lifetime = Duration::from_secs(issued.expires_in).saturating_sub(self.broker.safety_margin);
        let expires_at = Utc::now() + chrono::Duration::from_std(lifetime).unwrap_or_default();
        self.broker
            .cache
            .set(&self.tenant.id, &issued.access_token, expires_at)?;
        info!(
            "[{}] Token saved (issued for {}s)",
            self.tenant.id, issued.expires_in
        );
        Ok(issued.access_token)
    }
}

enum LeaseWait<'a> {
    /// A usable token appeared while waiting.
    Minted(String),
    /// The caller may mint; the lease is released on drop.
    Held(MintLease<'a>),
}

struct MintLease<'a> {
    cache: &'a Arc<dyn TokenCache>,
    tenant_id: &'a str,
    holder: String,
}

impl Drop for MintLease<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.cache.release_lease(self.tenant_id, &self.holder) {
            warn!("[{}] Failed to release mint lease: {}", self.tenant_id, e);
        }
    }
}
