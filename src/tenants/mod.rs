//! Tenant directory.
//!
//! Tenants are owned by an external directory; the scheduler only reads them,
//! once per cycle.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Credentials and identity of one tenant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Tenant {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl std::fmt::Debug for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tenant")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Read-only provider of the active tenant set.
pub trait TenantDirectory: Send + Sync {
    fn list_active_tenants(&self) -> Result<Vec<Tenant>>;
}

/// Tenant directory backed by a fixed list, usually loaded from the config file.
pub struct StaticTenantDirectory {
    tenants: Vec<Tenant>,
}

impl StaticTenantDirectory {
    /// Create a directory, rejecting duplicate tenant ids.
    pub fn new(tenants: Vec<Tenant>) -> Result<Self> {
        let mut seen = HashSet::new();
        for tenant in &tenants {
            if !seen.insert(tenant.id.as_str()) {
                bail!("Duplicate tenant id in directory: {}", tenant.id);
            }
        }
        Ok(Self { tenants })
    }
}

impl TenantDirectory for StaticTenantDirectory {
    fn list_active_tenants(&self) -> Result<Vec<Tenant>> {
        Ok(self.tenants.clone())
    }
}
