//! Allocator service client
//!
//! The allocator owns the account pool and its lifecycle state; this
//! client only reads the queues and requests transitions. Transitions are
//! idempotent on the allocator side, so a retried request after a partial
//! failure is harmless.

use anyhow::{Context, Result, bail};
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use sandbox_reaper_common::Credential;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// A sandbox account as the allocator reports it
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxAccount {
    pub account_name: String,
    pub cloud_provider: String,
    #[serde(alias = "master_api_key")]
    pub master_credential: Credential,
    /// Set by the allocator when the account is marked cleaned
    #[serde(default)]
    pub cleanup_time: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Client for the sandbox allocator API
pub struct AllocatorClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Credential,
}

impl AllocatorClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: Credential) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Exchange the static API key for a short-lived bearer token.
    ///
    /// Fetched fresh before each request batch; the allocator's tokens are
    /// short-lived enough that caching buys nothing within one invocation.
    async fn token(&self) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/token", self.base_url))
            .form(&[("api_key", self.api_key.expose())])
            .send()
            .await
            .context("Allocator token request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Allocator token exchange failed with status {status}");
        }
        let token: TokenResponse = response
            .json()
            .await
            .context("Allocator token response malformed")?;
        Ok(token.access_token)
    }

    async fn fetch_accounts(&self, path: &str) -> Result<Vec<SandboxAccount>> {
        let fetch = || async {
            let token = self.token().await?;
            let response = self
                .http
                .get(format!("{}{path}", self.base_url))
                .bearer_auth(token)
                .send()
                .await
                .context("Allocator request failed")?;

            let status = response.status();
            if !status.is_success() {
                bail!("Allocator returned status {status} for {path}");
            }
            response
                .json::<Vec<SandboxAccount>>()
                .await
                .context("Allocator account list malformed")
        };

        fetch
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(500))
                    .with_max_delay(Duration::from_secs(5))
                    .with_max_times(3),
            )
            .notify(|e, dur| {
                warn!(delay = ?dur, error = %e, "Allocator fetch failed, retrying");
            })
            .await
    }

    /// Accounts flagged for cleanup
    pub async fn accounts_needing_cleanup(&self) -> Result<Vec<SandboxAccount>> {
        self.fetch_accounts("/sandbox/cleanup").await
    }

    /// Accounts flagged for usage verification
    pub async fn accounts_needing_verify(&self) -> Result<Vec<SandboxAccount>> {
        self.fetch_accounts("/sandbox/release").await
    }

    async fn transition(&self, path: &str, account: &SandboxAccount) -> Result<()> {
        let token = self.token().await?;
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .form(&[
                ("account_name", account.account_name.as_str()),
                ("cloud_provider", account.cloud_provider.as_str()),
            ])
            .send()
            .await
            .context("Allocator transition request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!(
                "Allocator transition {path} failed with status {status} for account {}",
                account.account_name
            );
        }
        debug!(account = %account.account_name, path, "Allocator transition accepted");
        Ok(())
    }

    /// Mark the account cleaned; the allocator records `cleanup_time`
    pub async fn mark_cleaned(&self, account: &SandboxAccount) -> Result<()> {
        self.transition("/sandbox/cleanup", account).await
    }

    /// Mark the account released back to the pool
    pub async fn mark_released(&self, account: &SandboxAccount) -> Result<()> {
        self.transition("/sandbox/release", account).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_record_accepts_legacy_credential_field() {
        let account: SandboxAccount = serde_json::from_str(
            r#"{"account_name": "acct-1", "cloud_provider": "ibm",
                "master_api_key": "legacy-secret"}"#,
        )
        .unwrap();
        assert_eq!(account.master_credential.expose(), "legacy-secret");
        assert!(account.cleanup_time.is_none());

        let account: SandboxAccount = serde_json::from_str(
            r#"{"account_name": "acct-2", "cloud_provider": "ibm",
                "master_credential": "secret",
                "cleanup_time": "2026-08-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(account.master_credential.expose(), "secret");
        assert!(account.cleanup_time.is_some());
    }

    #[test]
    fn test_account_debug_redacts_credential() {
        let account: SandboxAccount = serde_json::from_str(
            r#"{"account_name": "acct-1", "cloud_provider": "ibm",
                "master_credential": "super-secret"}"#,
        )
        .unwrap();
        let debug = format!("{account:?}");
        assert!(!debug.contains("super-secret"));
    }
}
