//! Shared credential plumbing for the concrete connectors (§6.7): header
//! construction and the Microsoft Graph app-only token cache.
//!
//! The token cache is grounded on the teacher's `RateLimiter` in
//! `infrastructure/rate_limiter.rs`: shared mutable state lives behind an
//! `Arc<RwLock<...>>` owned by the connector value, not a process-wide
//! `static`.

use crate::config::Creds;
use crate::downloader::Downloader;
use crate::errors::{GatewayError, GatewayResult};
use crate::uri::WebUrl;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Resolve the effective credential for `realm`: the per-request override
/// if present, otherwise the connector's configured public credential.
pub fn effective_token<'a>(creds: Option<&'a Creds>, realm: &str, public: Option<&'a str>) -> Option<&'a str> {
    creds.and_then(|c| c.get(realm)).or(public)
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// A lazily-refreshed Microsoft Graph app-only (client-credentials) token,
/// shared across requests for one tenant. Refreshed a minute before actual
/// expiry to absorb request latency.
pub struct TokenCache {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    cached: RwLock<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl TokenCache {
    pub fn new(tenant_id: impl Into<String>, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        TokenCache {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            cached: RwLock::new(None),
        }
    }

    /// Return a valid bearer token, refreshing from Azure AD if the cached
    /// one is missing or within a minute of expiring.
    pub async fn token(&self, downloader: &dyn Downloader) -> GatewayResult<String> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.expires_at > Instant::now() + Duration::from_secs(60) {
                return Ok(cached.access_token.clone());
            }
        }

        let url = WebUrl::try_decode(&format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.tenant_id
        ))?;
        let body = format!(
            "client_id={}&client_secret={}&scope=https://graph.microsoft.com/.default&grant_type=client_credentials",
            percent_encoding::utf8_percent_encode(&self.client_id, percent_encoding::NON_ALPHANUMERIC),
            percent_encoding::utf8_percent_encode(&self.client_secret, percent_encoding::NON_ALPHANUMERIC),
        );
        let (value, _headers) = downloader
            .fetch_json(&url.try_join_href(&format!("?{body}"))?, None)
            .await?;
        let parsed: TokenResponse =
            serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;

        let expires_at = Instant::now() + Duration::from_secs(parsed.expires_in);
        *self.cached.write().await = Some(CachedToken {
            access_token: parsed.access_token.clone(),
            expires_at,
        });
        Ok(parsed.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_token_prefers_override() {
        let creds = Creds::new().with("github", "override-token");
        assert_eq!(effective_token(Some(&creds), "github", Some("public")), Some("override-token"));
        assert_eq!(effective_token(Some(&creds), "gitlab", Some("public")), Some("public"));
        assert_eq!(effective_token(None, "github", Some("public")), Some("public"));
    }
}
