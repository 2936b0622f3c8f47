//! Authenticated calls to the telemetry API.
//!
//! Every call goes through [`RemoteClient::call`], which owns the bounded
//! retry protocol: re-authenticate on 401, linear backoff on 429, flat backoff
//! on transient failures, immediate failure otherwise.

mod client;
mod retry;

pub use client::{RemoteClient, RemoteSettings};
pub use retry::{Backoff, RetryPolicy, TokioBackoff};

use crate::auth::AuthError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{operation}: credential rejected")]
    Unauthorized { operation: String },
    #[error("{operation}: rate limited")]
    RateLimited { operation: String },
    #[error("{operation}: transient failure: {message}")]
    Transient { operation: String, message: String },
    #[error("{operation}: request failed with status {status}: {body}")]
    NonRetryable {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("{operation}: undecodable response: {message}")]
    Decode { operation: String, message: String },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{operation}: cancelled before retrying")]
    Cancelled { operation: String },
}

impl RemoteError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteError::Unauthorized { .. } => "unauthorized",
            RemoteError::RateLimited { .. } => "rate_limited",
            RemoteError::Transient { .. } => "transient",
            RemoteError::NonRetryable { .. } => "non_retryable",
            RemoteError::Decode { .. } => "decode",
            RemoteError::Auth(_) => "auth",
            RemoteError::Cancelled { .. } => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobError;

    #[test]
    fn test_auth_failure_is_reported_once() {
        let e = anyhow::Error::from(JobError::from(RemoteError::from(AuthError::Rejected {
            status: 401,
        })));
        assert_eq!(
            format!("{:#}", e),
            "identity endpoint rejected credentials with status 401"
        );
    }

    #[test]
    fn test_kind_labels() {
        let e = RemoteError::Transient {
            operation: "/op".to_string(),
            message: "server error 503".to_string(),
        };
        assert_eq!(e.kind(), "transient");
        assert_eq!(e.to_string(), "/op: transient failure: server error 503");
    }
}
