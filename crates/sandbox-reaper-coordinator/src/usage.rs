//! Usage store access
//!
//! The billing pipeline writes one cost sample per account per ingestion
//! tick; the coordinator only ever reads point samples by timestamp
//! prefix. The store is behind a trait so the gate can be tested without
//! a database file.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Read-side of the usage time series
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// The first sample for `account` whose timestamp starts with `prefix`,
    /// or `None` if the pipeline has not ingested one
    async fn cost_at(&self, account: &str, prefix: &str) -> Result<Option<f64>>;
}

/// SQLite-backed usage store, shared with the billing pipeline
pub struct SqliteUsageStore {
    pool: SqlitePool,
}

impl SqliteUsageStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid usage store URL")?
            .create_if_missing(true);
        // One pinned connection: an in-memory store (tests, local runs)
        // exists per connection, and this workload is a handful of point
        // reads per invocation anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open usage store")?;
        Ok(Self { pool })
    }

    /// Create the samples table if the billing pipeline has not yet.
    /// Matches the writer's schema; safe to run repeatedly.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS usage_samples (
                account_name TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                billable_cost REAL NOT NULL,
                PRIMARY KEY (account_name, timestamp)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert one sample; test and local-development helper
    pub async fn insert_sample(&self, account: &str, timestamp: &str, cost: f64) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO usage_samples (account_name, timestamp, billable_cost)
             VALUES (?1, ?2, ?3)",
        )
        .bind(account)
        .bind(timestamp)
        .bind(cost)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UsageStore for SqliteUsageStore {
    async fn cost_at(&self, account: &str, prefix: &str) -> Result<Option<f64>> {
        let row = sqlx::query(
            "SELECT billable_cost FROM usage_samples
             WHERE account_name = ?1 AND timestamp LIKE ?2 || '%'
             ORDER BY timestamp LIMIT 1",
        )
        .bind(account)
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await
        .context("Usage store query failed")?;
        Ok(row.map(|r| r.get::<f64, _>(0)))
    }
}
