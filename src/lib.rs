//! Multi-tenant telemetry collection scheduler.
//!
//! This library exposes the internal modules for the binary and the
//! integration tests.

pub mod auth;
pub mod config;
pub mod jobs;
pub mod metrics;
pub mod remote;
pub mod runner;
pub mod scheduler;
pub mod tenants;
pub mod token_cache;

// Re-export commonly used types for convenience
pub use auth::{AuthManager, CredentialBroker, HttpCredentialIssuer};
pub use jobs::{JobRegistry, TenantContext, TenantJob};
pub use runner::{ExecutionMode, FanOutReport, JobRunner, TenantOutcome};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerState};
pub use tenants::{StaticTenantDirectory, Tenant, TenantDirectory};
pub use token_cache::{InMemoryTokenCache, SqliteTokenCache, TokenCache};
