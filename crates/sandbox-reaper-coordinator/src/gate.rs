//! Usage verification gate
//!
//! Decides whether a cleaned account may be released: compare the cost
//! sample from a recent window against one from an earlier window, and
//! block the release while cost is still growing. Missing data defers the
//! decision: billing ingestion lags, and treating a gap as zero could
//! release an account that is still accruing charges.

use crate::usage::UsageStore;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

/// Timestamp prefix granularity for a window query
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Granularity {
    /// Match any sample within the hour
    Hour,
    /// Match the exact minute
    Minute,
}

impl Granularity {
    fn prefix(self, at: DateTime<Utc>) -> String {
        match self {
            Granularity::Hour => at.format("%Y-%m-%dT%H").to_string(),
            Granularity::Minute => at.format("%Y-%m-%dT%H:%M").to_string(),
        }
    }
}

/// One lookback window relative to "now"
#[derive(Debug, Clone, Copy)]
pub struct WindowSpec {
    pub offset_minutes: i64,
    pub granularity: Granularity,
}

impl WindowSpec {
    pub fn new(offset_minutes: i64, granularity: Granularity) -> Self {
        Self {
            offset_minutes,
            granularity,
        }
    }

    /// The timestamp prefix this window queries at a given instant
    pub fn prefix(&self, now: DateTime<Utc>) -> String {
        self.granularity
            .prefix(now - Duration::minutes(self.offset_minutes))
    }
}

/// The two non-overlapping windows the gate compares
#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    pub previous: WindowSpec,
    pub current: WindowSpec,
}

impl Default for GateConfig {
    fn default() -> Self {
        use sandbox_reaper_common::defaults::{
            DEFAULT_CURRENT_WINDOW_MINUTES, DEFAULT_PREVIOUS_WINDOW_MINUTES,
        };
        Self {
            previous: WindowSpec::new(DEFAULT_PREVIOUS_WINDOW_MINUTES, Granularity::Minute),
            current: WindowSpec::new(DEFAULT_CURRENT_WINDOW_MINUTES, Granularity::Hour),
        }
    }
}

/// Gate decision for one account in one poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// No cost growth; the account may be released
    Release { current: f64, previous: f64 },
    /// Cost grew; leave the account queued for a future poll
    Block { current: f64, previous: f64 },
    /// A window had no data; decide nothing this round
    Deferred,
}

/// Release is permitted iff cost did not increase. Equal cost is no growth.
pub fn is_eligible_for_release(current: f64, previous: f64) -> bool {
    current <= previous
}

/// An account becomes verification-eligible once the grace period after
/// its cleanup has fully elapsed.
pub fn verification_due(
    cleanup_time: DateTime<Utc>,
    grace: Duration,
    now: DateTime<Utc>,
) -> bool {
    now >= cleanup_time + grace
}

/// Evaluates the cost-window comparison against the usage store
pub struct ReleaseGate<'a> {
    store: &'a dyn UsageStore,
    config: GateConfig,
}

impl<'a> ReleaseGate<'a> {
    pub fn new(store: &'a dyn UsageStore, config: GateConfig) -> Self {
        Self { store, config }
    }

    pub async fn evaluate(&self, account: &str, now: DateTime<Utc>) -> Result<Verdict> {
        let previous_prefix = self.config.previous.prefix(now);
        let current_prefix = self.config.current.prefix(now);
        debug!(
            account,
            previous_window = %previous_prefix,
            current_window = %current_prefix,
            "Querying usage windows"
        );

        let previous = self.store.cost_at(account, &previous_prefix).await?;
        let current = self.store.cost_at(account, &current_prefix).await?;

        let (Some(previous), Some(current)) = (previous, current) else {
            info!(
                account,
                previous = ?previous,
                current = ?current,
                "Usage data missing for a window; deferring verification"
            );
            return Ok(Verdict::Deferred);
        };

        if is_eligible_for_release(current, previous) {
            Ok(Verdict::Release { current, previous })
        } else {
            Ok(Verdict::Block { current, previous })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;

    struct MapStore(HashMap<(String, String), f64>);

    impl MapStore {
        fn new(samples: &[(&str, &str, f64)]) -> Self {
            Self(
                samples
                    .iter()
                    .map(|(a, t, c)| ((a.to_string(), t.to_string()), *c))
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl UsageStore for MapStore {
        async fn cost_at(&self, account: &str, prefix: &str) -> Result<Option<f64>> {
            Ok(self
                .0
                .iter()
                .find(|((a, t), _)| a == account && t.starts_with(prefix))
                .map(|(_, cost)| *cost))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_release_decision_table() {
        assert!(is_eligible_for_release(100.0, 100.0));
        assert!(is_eligible_for_release(99.9, 100.0));
        assert!(!is_eligible_for_release(100.1, 100.0));
    }

    #[test]
    fn test_eligibility_boundary() {
        let cleanup = now();
        let grace = Duration::hours(8);
        assert!(verification_due(cleanup, grace, cleanup + grace));
        assert!(!verification_due(
            cleanup,
            grace,
            cleanup + grace - Duration::seconds(1)
        ));
    }

    #[test]
    fn test_window_prefixes() {
        // 12:00 minus 80 minutes = 10:40; minus 20 minutes = 11:40.
        let config = GateConfig::default();
        assert_eq!(config.previous.prefix(now()), "2026-08-01T10:40");
        assert_eq!(config.current.prefix(now()), "2026-08-01T11");
    }

    #[tokio::test]
    async fn test_equal_cost_releases() {
        let store = MapStore::new(&[
            ("acct-1", "2026-08-01T10:40", 12.50),
            ("acct-1", "2026-08-01T11:40", 12.50),
        ]);
        let gate = ReleaseGate::new(&store, GateConfig::default());
        let verdict = gate.evaluate("acct-1", now()).await.unwrap();
        assert_eq!(
            verdict,
            Verdict::Release {
                current: 12.50,
                previous: 12.50
            }
        );
    }

    #[tokio::test]
    async fn test_cost_growth_blocks() {
        let store = MapStore::new(&[
            ("acct-1", "2026-08-01T10:40", 100.0),
            ("acct-1", "2026-08-01T11:40", 100.1),
        ]);
        let gate = ReleaseGate::new(&store, GateConfig::default());
        let verdict = gate.evaluate("acct-1", now()).await.unwrap();
        assert_eq!(
            verdict,
            Verdict::Block {
                current: 100.1,
                previous: 100.0
            }
        );
    }

    #[tokio::test]
    async fn test_missing_window_defers() {
        // Previous window missing entirely.
        let store = MapStore::new(&[("acct-1", "2026-08-01T11:40", 50.0)]);
        let gate = ReleaseGate::new(&store, GateConfig::default());
        assert_eq!(gate.evaluate("acct-1", now()).await.unwrap(), Verdict::Deferred);

        // Current window missing.
        let store = MapStore::new(&[("acct-1", "2026-08-01T10:40", 50.0)]);
        let gate = ReleaseGate::new(&store, GateConfig::default());
        assert_eq!(gate.evaluate("acct-1", now()).await.unwrap(), Verdict::Deferred);
    }
}
