//! Default configuration values shared between the coordinator and CLI

/// Hours to wait after cleanup before an account may be verified
pub const DEFAULT_GRACE_HOURS: i64 = 8;

/// Minutes back from now for the previous usage window
pub const DEFAULT_PREVIOUS_WINDOW_MINUTES: i64 = 80;

/// Minutes back from now for the current usage window
pub const DEFAULT_CURRENT_WINDOW_MINUTES: i64 = 20;

/// Default metrics push gateway for local development
pub const DEFAULT_PUSH_GATEWAY_URL: &str = "http://localhost:9091";

/// Regions with known-broken list endpoints, skipped by default.
/// Tracked as configuration so an unbroken region can be re-enabled
/// without a code change.
pub const DEFAULT_REGION_DENYLIST: &[&str] = &["ca-tor"];

/// Returns the default region denylist as owned strings
pub fn default_region_denylist() -> Vec<String> {
    DEFAULT_REGION_DENYLIST
        .iter()
        .map(|s| s.to_string())
        .collect()
}
