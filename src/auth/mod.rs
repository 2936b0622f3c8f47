//! Per-tenant credential management.
//!
//! A [`CredentialBroker`] is built once at startup and shared by every job; it
//! hands out an [`AuthManager`] per tenant. Managers read the shared token
//! cache first and only reach the identity endpoint on a miss or after the
//! telemetry API rejected a token.

mod issuer;
mod manager;

pub use issuer::HttpCredentialIssuer;
pub use manager::{AuthManager, CredentialBroker};

use crate::tenants::Tenant;
use crate::token_cache::TokenCacheError;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Default margin subtracted from the issued lifetime before caching.
pub const DEFAULT_SAFETY_MARGIN_SECS: u64 = 60;

/// A freshly minted credential as returned by the identity endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity endpoint unreachable: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("identity endpoint rejected credentials with status {status}")]
    Rejected { status: u16 },
    #[error("malformed identity response: {0}")]
    MalformedResponse(String),
    #[error("identity endpoint returned the credential that was just rejected")]
    StaleCredential,
    #[error(transparent)]
    Cache(#[from] TokenCacheError),
}

/// Mints new bearer credentials for a tenant.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self, tenant: &Tenant) -> Result<IssuedToken, AuthError>;
}
