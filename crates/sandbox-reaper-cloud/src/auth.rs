//! IAM token exchange
//!
//! Trades an account's master API key for a bearer token and caches it
//! until shortly before expiry. Every client in the engine shares one
//! authenticator per account.

use crate::error::{CloudError, CloudResult, classify_status};
use sandbox_reaper_common::Credential;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Refresh this long before the token actually expires
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Exchanges an API key for bearer tokens, caching between calls
pub struct IamAuthenticator {
    http: reqwest::Client,
    token_url: String,
    api_key: Credential,
    cached: Mutex<Option<CachedToken>>,
}

impl IamAuthenticator {
    pub fn new(http: reqwest::Client, token_url: impl Into<String>, api_key: Credential) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            api_key,
            cached: Mutex::new(None),
        }
    }

    /// A valid bearer token, fetched or refreshed as needed
    pub async fn token(&self) -> CloudResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref()
            && entry.expires_at > Instant::now() + EXPIRY_MARGIN
        {
            return Ok(entry.token.clone());
        }

        debug!("Exchanging API key for a fresh access token");
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "urn:ibm:params:oauth:grant-type:apikey"),
                ("apikey", self.api_key.expose()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match classify_status(status.as_u16(), body) {
                // Token endpoint failures are always auth failures from the
                // engine's point of view, whatever the status code.
                CloudError::Auth(msg) => CloudError::Auth(msg),
                other => CloudError::Auth(other.to_string()),
            });
        }

        let token: TokenResponse = response.json().await?;
        let entry = CachedToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        };
        *cached = Some(entry);
        Ok(token.access_token)
    }
}
