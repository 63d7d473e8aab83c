//! Configuration types for the coordinator

use sandbox_reaper_cloud::CloudEndpoints;
use sandbox_reaper_common::PlanPolicies;

/// Cloud teardown behavior, shared by every account in a poll
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub endpoints: CloudEndpoints,
    /// Regions with known-broken endpoints, skipped entirely
    pub region_denylist: Vec<String>,
    pub policies: PlanPolicies,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            endpoints: CloudEndpoints::default(),
            region_denylist: sandbox_reaper_common::defaults::default_region_denylist(),
            policies: PlanPolicies::default(),
        }
    }
}
