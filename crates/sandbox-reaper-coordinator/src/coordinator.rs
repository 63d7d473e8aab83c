//! Sandbox lifecycle coordinator
//!
//! Drives accounts through cleanup, verification, and release. Each
//! invocation runs the cleanup poll then the verify poll to completion.
//! Failures are isolated per account: one bad credential or allocator
//! hiccup never stops the rest of the batch.
//!
//! An account is marked cleaned whether or not teardown got everything.
//! Leaving a partially-cleaned account queued forever, with an operator
//! that never retries, is worse than surfacing it loudly and moving on;
//! the dirty outcome is pushed as a metric and reflected in the exit code.

use crate::allocator::{AllocatorClient, SandboxAccount};
use crate::config::CloudConfig;
use crate::gate::{GateConfig, ReleaseGate, Verdict, verification_due};
use crate::metrics::MetricsSink;
use crate::usage::UsageStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sandbox_reaper_cloud::{Teardown, TeardownReport};
use sandbox_reaper_common::metrics::CleanupStatus;
use tracing::{error, info, warn};

/// Seam between the coordinator and the teardown engine
#[async_trait]
pub trait AccountCleaner: Send + Sync {
    async fn clean(&self, account: &SandboxAccount) -> Result<TeardownReport>;
}

/// Production cleaner: one full teardown per account credential
pub struct CloudCleaner {
    http: reqwest::Client,
    config: CloudConfig,
}

impl CloudCleaner {
    pub fn new(http: reqwest::Client, config: CloudConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl AccountCleaner for CloudCleaner {
    async fn clean(&self, account: &SandboxAccount) -> Result<TeardownReport> {
        Teardown::new(
            self.http.clone(),
            account.master_credential.clone(),
            self.config.endpoints.clone(),
        )
        .with_region_denylist(self.config.region_denylist.clone())
        .with_policies(self.config.policies.clone())
        .run()
        .await
    }
}

/// Counts of what one invocation did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Accounts cleaned with nothing left behind
    pub cleaned: usize,
    /// Accounts cleaned with residual resources
    pub dirty: usize,
    /// Accounts released back to the pool
    pub released: usize,
    /// Accounts still accruing cost
    pub blocked: usize,
    /// Accounts whose usage data was missing
    pub deferred: usize,
    /// Accounts inside their grace period
    pub not_yet_due: usize,
    /// Accounts skipped because processing them failed outright
    pub failures: usize,
}

impl RunSummary {
    /// Whether the scheduler should alert on this invocation
    pub fn has_failures(&self) -> bool {
        self.failures > 0 || self.dirty > 0
    }
}

/// Coordinator over injected collaborators
pub struct Coordinator {
    allocator: AllocatorClient,
    cleaner: Box<dyn AccountCleaner>,
    usage: Box<dyn UsageStore>,
    metrics: MetricsSink,
    grace: Duration,
    gate: GateConfig,
    account_filter: Option<String>,
}

impl Coordinator {
    pub fn new(
        allocator: AllocatorClient,
        cleaner: Box<dyn AccountCleaner>,
        usage: Box<dyn UsageStore>,
        metrics: MetricsSink,
        grace: Duration,
        gate: GateConfig,
    ) -> Self {
        Self {
            allocator,
            cleaner,
            usage,
            metrics,
            grace,
            gate,
            account_filter: None,
        }
    }

    pub fn with_account_filter(mut self, filter: Option<String>) -> Self {
        self.account_filter = filter;
        self
    }

    fn skip(&self, account: &SandboxAccount) -> bool {
        match &self.account_filter {
            Some(filter) if *filter != account.account_name => {
                info!(account = %account.account_name, "Skipping account; filter excludes it");
                true
            }
            _ => false,
        }
    }

    /// Run both polls to completion
    pub async fn run(&mut self) -> RunSummary {
        let mut summary = RunSummary::default();
        self.cleanup_poll(&mut summary).await;
        self.verify_poll(&mut summary).await;
        summary
    }

    /// Tear down every account the allocator flags for cleanup
    pub async fn cleanup_poll(&mut self, summary: &mut RunSummary) {
        let accounts = match self.allocator.accounts_needing_cleanup().await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(error = %e, "Failed to fetch accounts needing cleanup");
                summary.failures += 1;
                return;
            }
        };
        if accounts.is_empty() {
            info!("No accounts need cleanup");
            return;
        }
        info!(count = accounts.len(), "Accounts need cleanup");

        for account in &accounts {
            if self.skip(account) {
                continue;
            }
            info!(
                account = %account.account_name,
                cloud_provider = %account.cloud_provider,
                "Starting cleanup"
            );

            let status = match self.cleaner.clean(account).await {
                Ok(report) if report.is_clean() => {
                    info!(account = %account.account_name, "Account fully cleaned");
                    summary.cleaned += 1;
                    CleanupStatus::Clean
                }
                Ok(report) => {
                    error!(
                        account = %account.account_name,
                        residual = report.residual_count(),
                        "Account could not be fully cleaned"
                    );
                    report.log_residual();
                    summary.dirty += 1;
                    CleanupStatus::Dirty
                }
                Err(e) => {
                    // Credential exchange or discovery failed; nothing was
                    // swept, so do not advance the account.
                    error!(account = %account.account_name, error = %e, "Cleanup failed; skipping account");
                    summary.failures += 1;
                    continue;
                }
            };

            self.metrics.record_cleanup_status(
                &account.account_name,
                &account.cloud_provider,
                status,
            );
            self.metrics.push().await;

            if let Err(e) = self.allocator.mark_cleaned(account).await {
                error!(account = %account.account_name, error = %e, "Failed to mark account cleaned");
                summary.failures += 1;
            }
        }
    }

    /// Evaluate every account the allocator flags for verification
    pub async fn verify_poll(&mut self, summary: &mut RunSummary) {
        let accounts = match self.allocator.accounts_needing_verify().await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(error = %e, "Failed to fetch accounts needing verification");
                summary.failures += 1;
                return;
            }
        };
        if accounts.is_empty() {
            info!("No accounts need usage verification");
            return;
        }
        info!(count = accounts.len(), "Accounts need verification");

        for account in &accounts {
            if self.skip(account) {
                continue;
            }

            let Some(cleanup_time) = account.cleanup_time else {
                warn!(
                    account = %account.account_name,
                    "Account queued for verification without a cleanup time"
                );
                summary.failures += 1;
                continue;
            };

            let now = Utc::now();
            if !verification_due(cleanup_time, self.grace, now) {
                info!(
                    account = %account.account_name,
                    due_at = %(cleanup_time + self.grace),
                    "Account not yet ready for verification"
                );
                summary.not_yet_due += 1;
                continue;
            }

            info!(account = %account.account_name, "Evaluating account usage");
            let gate = ReleaseGate::new(self.usage.as_ref(), self.gate);
            match gate.evaluate(&account.account_name, now).await {
                Ok(Verdict::Release { current, previous }) => {
                    self.metrics.record_usage(
                        &account.account_name,
                        &account.cloud_provider,
                        current,
                        previous,
                    );
                    self.metrics.push().await;
                    info!(
                        account = %account.account_name,
                        current, previous,
                        "No additional charges detected; releasing"
                    );
                    match self.allocator.mark_released(account).await {
                        Ok(()) => {
                            info!(account = %account.account_name, "Account released");
                            summary.released += 1;
                        }
                        Err(e) => {
                            error!(account = %account.account_name, error = %e, "Failed to mark account released");
                            summary.failures += 1;
                        }
                    }
                }
                Ok(Verdict::Block { current, previous }) => {
                    self.metrics.record_usage(
                        &account.account_name,
                        &account.cloud_provider,
                        current,
                        previous,
                    );
                    self.metrics.push().await;
                    // Expected steady state for an active account; it will
                    // be reconsidered on the next scheduled run.
                    warn!(
                        account = %account.account_name,
                        current, previous,
                        "Current charges exceed previous charges; not releasing"
                    );
                    summary.blocked += 1;
                }
                Ok(Verdict::Deferred) => {
                    summary.deferred += 1;
                }
                Err(e) => {
                    error!(account = %account.account_name, error = %e, "Usage store query failed");
                    summary.failures += 1;
                }
            }
        }
    }
}
