use super::retry::{Backoff, RetryPolicy};
use super::RemoteError;
use crate::auth::AuthManager;
use crate::metrics;
use anyhow::{Context, Result};
use reqwest::{Method, StatusCode};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Where and how to reach the telemetry API.
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub api_base_url: String,
    pub request_timeout: Duration,
}

impl RemoteSettings {
    pub fn new(api_base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        Self {
            api_base_url,
            request_timeout,
        }
    }

    pub fn build_http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .context("Failed to create telemetry HTTP client")
    }
}

/// Result of one HTTP exchange, before the retry decision.
enum Exchange {
    Success(JsonValue),
    Unauthorized,
    RateLimited,
    Transient(String),
    Fatal(RemoteError),
}

/// Authenticated client for one tenant.
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    auth: AuthManager,
    policy: RetryPolicy,
    backoff: Arc<dyn Backoff>,
    cancel: CancellationToken,
}

impl RemoteClient {
    pub fn new(
        http: reqwest::Client,
        settings: &RemoteSettings,
        auth: AuthManager,
        policy: RetryPolicy,
        backoff: Arc<dyn Backoff>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http,
            base_url: settings.api_base_url.clone(),
            auth,
            policy,
            backoff,
            cancel,
        }
    }

    pub fn tenant_id(&self) -> &str {
        self.auth.tenant_id()
    }

    /// Performs one logical authenticated call, retrying per the policy.
    ///
    /// `params` become the query string for GET and a JSON object body for
    /// every other method.
    pub async fn call(
        &self,
        method: Method,
        operation: &str,
        params: &[(&str, String)],
    ) -> Result<JsonValue, RemoteError> {
        let url = format!("{}{}", self.base_url, operation);
        let mut token = self.auth.get_token().await?;
        let mut last_error = None;

        for attempt in 1..=self.policy.max_attempts {
            let more = self.policy.has_attempts_after(attempt);

            match self.exchange(&method, &url, &token, params).await {
                Exchange::Success(body) => return Ok(body),
                Exchange::Fatal(e) => {
                    error!("[{}] {} failed: {}", self.tenant_id(), operation, e);
                    return Err(e);
                }
                Exchange::Unauthorized => {
                    last_error = Some(RemoteError::Unauthorized {
                        operation: operation.to_string(),
                    });
                    if more {
                        warn!(
                            "[{}] {} rejected the token (attempt {}), renewing",
                            self.tenant_id(),
                            operation,
                            attempt
                        );
                        metrics::record_remote_retry("unauthorized");
                        token = self.auth.refresh_rejected(&token).await?;
                    }
                }
                Exchange::RateLimited => {
                    last_error = Some(RemoteError::RateLimited {
                        operation: operation.to_string(),
                    });
                    if more {
                        let wait = self.policy.rate_limit_delay(attempt);
                        warn!(
                            "[{}] {} rate limited (attempt {}), waiting {:?}",
                            self.tenant_id(),
                            operation,
                            attempt,
                            wait
                        );
                        metrics::record_remote_retry("rate_limited");
                        self.pause(operation, wait).await?;
                    }
                }
                Exchange::Transient(message) => {
                    warn!(
                        "[{}] {} transient failure (attempt {}): {}",
                        self.tenant_id(),
                        operation,
                        attempt,
                        message
                    );
                    last_error = Some(RemoteError::Transient {
                        operation: operation.to_string(),
                        message,
                    });
                    if more {
                        metrics::record_remote_retry("transient");
                        self.pause(operation, self.policy.transient_delay()).await?;
                    }
                }
            }
        }

        let e = last_error.unwrap_or_else(|| RemoteError::Transient {
            operation: operation.to_string(),
            message: "no attempts made".to_string(),
        });
        error!(
            "[{}] {} gave up after {} attempts: {}",
            self.tenant_id(),
            operation,
            self.policy.max_attempts,
            e
        );
        Err(e)
    }

    async fn exchange(
        &self,
        method: &Method,
        url: &str,
        token: &str,
        params: &[(&str, String)],
    ) -> Exchange {
        let mut request = self.http.request(method.clone(), url).bearer_auth(token);
        request = if *method == Method::GET {
            request.query(params)
        } else {
            request.json(&params_to_body(params))
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Exchange::Transient(e.to_string()),
        };

        let status = response.status();
        debug!("{} {} -> {}", method, url, status);
        match status {
            s if s.is_success() => match response.json::<JsonValue>().await {
                Ok(body) => Exchange::Success(body),
                Err(e) => Exchange::Fatal(RemoteError::Decode {
                    operation: operation_of(url, &self.base_url),
                    message: e.to_string(),
                }),
            },
            StatusCode::UNAUTHORIZED => Exchange::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => Exchange::RateLimited,
            s if s.is_server_error() => Exchange::Transient(format!("server error {}", s)),
            s => {
                let body = response.text().await.unwrap_or_default();
                Exchange::Fatal(RemoteError::NonRetryable {
                    operation: operation_of(url, &self.base_url),
                    status: s.as_u16(),
                    body: truncate(&body, 200),
                })
            }
        }
    }

    /// Backoff sleep that gives up as soon as a stop is requested.
    async fn pause(&self, operation: &str, delay: Duration) -> Result<(), RemoteError> {
        let cancelled = || RemoteError::Cancelled {
            operation: operation.to_string(),
        };
        if self.cancel.is_cancelled() {
            return Err(cancelled());
        }
        tokio::select! {
            _ = self.backoff.sleep(delay) => Ok(()),
            _ = self.cancel.cancelled() => Err(cancelled()),
        }
    }
}

fn params_to_body(params: &[(&str, String)]) -> JsonValue {
    let mut body = serde_json::Map::new();
    for (key, value) in params {
        match body.get_mut(*key) {
            Some(JsonValue::Array(values)) => values.push(JsonValue::String(value.clone())),
            Some(existing) => {
                let first = existing.take();
                *existing = JsonValue::Array(vec![first, JsonValue::String(value.clone())]);
            }
            None => {
                body.insert(key.to_string(), JsonValue::String(value.clone()));
            }
        }
    }
    JsonValue::Object(body)
}

fn operation_of(url: &str, base_url: &str) -> String {
    url.strip_prefix(base_url).unwrap_or(url).to_string()
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
