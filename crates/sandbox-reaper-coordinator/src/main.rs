//! sandbox-reaper: reclaims temporary cloud sandbox accounts
//!
//! Scheduled periodically by an external scheduler; each invocation runs
//! the cleanup poll and the verify poll to completion and exits. At most
//! one instance may run at a time per account pool.

use anyhow::Result;
use chrono::Duration;
use clap::{Parser, Subcommand};
use sandbox_reaper_cloud::{CloudEndpoints, Teardown};
use sandbox_reaper_common::defaults::{
    DEFAULT_CURRENT_WINDOW_MINUTES, DEFAULT_GRACE_HOURS, DEFAULT_PREVIOUS_WINDOW_MINUTES,
    default_region_denylist,
};
use sandbox_reaper_common::{Credential, PlanPolicies};
use sandbox_reaper_coordinator::allocator::AllocatorClient;
use sandbox_reaper_coordinator::config::CloudConfig;
use sandbox_reaper_coordinator::coordinator::{CloudCleaner, Coordinator, RunSummary};
use sandbox_reaper_coordinator::gate::{GateConfig, Granularity, WindowSpec};
use sandbox_reaper_coordinator::metrics::MetricsSink;
use sandbox_reaper_coordinator::usage::SqliteUsageStore;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sandbox-reaper")]
#[command(about = "Tears down sandbox cloud accounts and releases them once billing settles")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Arguments shared by the coordinator subcommands
#[derive(clap::Args, Debug)]
struct ServiceArgs {
    /// Allocator service base URL
    #[arg(long, env = "ALLOCATOR_URL")]
    allocator_url: String,

    /// API key for the allocator token exchange
    #[arg(long, env = "ALLOCATOR_API_KEY", hide_env_values = true)]
    allocator_api_key: String,

    /// Usage store database URL
    #[arg(long, env = "USAGE_DB_URL")]
    usage_db_url: String,

    /// Metrics push gateway URL (omit to disable pushing)
    #[arg(long, env = "PUSH_GATEWAY_URL")]
    push_gateway_url: Option<String>,

    /// Only process this account
    #[arg(long, env = "SANDBOX_ACCOUNT")]
    account: Option<String>,

    /// Hours to wait after cleanup before verifying usage
    #[arg(long, env = "GRACE_HOURS", default_value_t = DEFAULT_GRACE_HOURS)]
    grace_hours: i64,

    /// Previous usage window, minutes back from now
    #[arg(long, default_value_t = DEFAULT_PREVIOUS_WINDOW_MINUTES)]
    previous_window_minutes: i64,

    /// Current usage window, minutes back from now
    #[arg(long, default_value_t = DEFAULT_CURRENT_WINDOW_MINUTES)]
    current_window_minutes: i64,

    /// Timestamp granularity for the previous window query
    #[arg(long, value_enum, default_value = "minute")]
    previous_granularity: Granularity,

    /// Timestamp granularity for the current window query
    #[arg(long, value_enum, default_value = "hour")]
    current_granularity: Granularity,

    /// Regions to skip (known-broken endpoints)
    #[arg(long = "skip-regions", env = "SKIP_REGIONS", value_delimiter = ',',
          default_values_t = default_region_denylist())]
    skip_regions: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the cleanup poll, then the verify poll
    Run(Box<ServiceArgs>),

    /// Run only the cleanup poll
    Clean(Box<ServiceArgs>),

    /// Run only the verify poll
    Verify(Box<ServiceArgs>),

    /// Tear down one account's resources directly, bypassing the allocator
    Teardown {
        /// Master API key of the account to tear down
        #[arg(long, env = "CLOUD_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Regions to skip (known-broken endpoints)
        #[arg(long = "skip-regions", value_delimiter = ',',
              default_values_t = default_region_denylist())]
        skip_regions: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(summary) if summary.has_failures() => {
            // Distinct from crashes so the scheduler can alert on partial
            // cleanups without treating them as process errors.
            std::process::exit(2);
        }
        Ok(_) => {}
        Err(e) => {
            print_error(&e);
            std::process::exit(1);
        }
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "\nError: {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  Caused by: {cause}");
        source = cause.source();
    }
}

async fn run() -> Result<RunSummary> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Run(service) => {
            let mut coordinator = build_coordinator(&service).await?;
            Ok(coordinator.run().await)
        }
        Command::Clean(service) => {
            let mut coordinator = build_coordinator(&service).await?;
            let mut summary = RunSummary::default();
            coordinator.cleanup_poll(&mut summary).await;
            Ok(summary)
        }
        Command::Verify(service) => {
            let mut coordinator = build_coordinator(&service).await?;
            let mut summary = RunSummary::default();
            coordinator.verify_poll(&mut summary).await;
            Ok(summary)
        }
        Command::Teardown {
            api_key,
            skip_regions,
        } => {
            let report = Teardown::new(
                reqwest::Client::new(),
                Credential::new(api_key),
                CloudEndpoints::default(),
            )
            .with_region_denylist(skip_regions)
            .run()
            .await?;

            let mut summary = RunSummary::default();
            if report.is_clean() {
                info!("Account fully cleaned");
                summary.cleaned = 1;
            } else {
                report.log_residual();
                summary.dirty = 1;
            }
            println!("\n=== Teardown Report ===");
            println!("Stuck resources:   {}", report.stuck.len());
            println!("Leftover services: {}", report.leftover_services.len());
            Ok(summary)
        }
    }
}

async fn build_coordinator(args: &ServiceArgs) -> Result<Coordinator> {
    let http = reqwest::Client::new();

    let allocator = AllocatorClient::new(
        http.clone(),
        args.allocator_url.trim_end_matches('/'),
        Credential::new(args.allocator_api_key.clone()),
    );

    let usage = SqliteUsageStore::connect(&args.usage_db_url).await?;
    usage.ensure_schema().await?;

    let metrics = MetricsSink::new(http.clone(), args.push_gateway_url.clone());

    let cloud = CloudConfig {
        endpoints: CloudEndpoints::default(),
        region_denylist: args.skip_regions.clone(),
        policies: PlanPolicies::default(),
    };
    let cleaner = CloudCleaner::new(http, cloud);

    let gate = GateConfig {
        previous: WindowSpec::new(args.previous_window_minutes, args.previous_granularity),
        current: WindowSpec::new(args.current_window_minutes, args.current_granularity),
    };

    info!(
        allocator = %args.allocator_url,
        grace_hours = args.grace_hours,
        account = ?args.account,
        "Coordinator configured"
    );

    Ok(Coordinator::new(
        allocator,
        Box::new(cleaner),
        Box::new(usage),
        metrics,
        Duration::hours(args.grace_hours),
        gate,
    )
    .with_account_filter(args.account.clone()))
}
