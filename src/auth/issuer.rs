use super::{AuthError, CredentialIssuer, IssuedToken};
use crate::tenants::Tenant;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Client-credentials issuer talking to the identity endpoint over HTTP.
pub struct HttpCredentialIssuer {
    client: reqwest::Client,
    token_url: String,
}

impl HttpCredentialIssuer {
    pub fn new(token_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create identity HTTP client")?;
        Ok(Self {
            client,
            token_url: token_url.into(),
        })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

#[async_trait]
impl CredentialIssuer for HttpCredentialIssuer {
    async fn issue(&self, tenant: &Tenant) -> Result<IssuedToken, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", tenant.client_id.as_str()),
                ("client_secret", tenant.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(AuthError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
            });
        }

        response
            .json::<IssuedToken>()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issuer_keeps_url() {
        let issuer =
            HttpCredentialIssuer::new("http://localhost:9/oauth2/token", Duration::from_secs(10))
                .unwrap();
        assert_eq!(issuer.token_url(), "http://localhost:9/oauth2/token");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Port 9 (discard) is closed on test hosts
        let issuer =
            HttpCredentialIssuer::new("http://127.0.0.1:9/oauth2/token", Duration::from_secs(2))
                .unwrap();
        let tenant = Tenant::new("t", "T", "id", "secret");
        let result = issuer.issue(&tenant).await;
        assert!(matches!(result, Err(AuthError::Transport(_))));
    }
}
