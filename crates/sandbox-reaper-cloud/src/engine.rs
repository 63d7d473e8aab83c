//! The teardown engine
//!
//! Runs the deletion plan for one account: managed clusters first, then
//! every VPC kind per region in dependency order, then object storage once
//! the resource controller view has settled. Each kind gets the same
//! bounded sweep: delete everything listed, wait for the provider's async
//! deletion to start, then re-list and retry until the kind is empty or
//! the attempt budget is spent. Whatever survives is reported stuck; a
//! stuck kind never aborts the run.

use crate::adapter::{KindAdapter, Sweep};
use crate::auth::IamAuthenticator;
use crate::clusters::ClusterClient;
use crate::endpoints::CloudEndpoints;
use crate::platform::PlatformClient;
use crate::types::{ManagedResource, ResourceGroup, ServiceInstance};
use crate::vpc::VpcClient;
use anyhow::{Context, Result};
use sandbox_reaper_common::defaults::default_region_denylist;
use sandbox_reaper_common::plan::RetryPolicy;
use sandbox_reaper_common::resource_kind::REGIONAL_ORDER;
use sandbox_reaper_common::{Credential, PlanPolicies, ResourceKind};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// What one account's teardown left behind
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Resources that survived their kind's attempt budget
    pub stuck: Vec<ManagedResource>,
    /// Service instances still registered after the full plan ran
    pub leftover_services: Vec<ServiceInstance>,
}

impl TeardownReport {
    /// True when nothing survived and the account is fully cleaned
    pub fn is_clean(&self) -> bool {
        self.stuck.is_empty() && self.leftover_services.is_empty()
    }

    pub fn residual_count(&self) -> usize {
        self.stuck.len() + self.leftover_services.len()
    }

    /// Flag every residual loudly; partial cleanups need human follow-up
    pub fn log_residual(&self) {
        for resource in &self.stuck {
            error!(
                kind = %resource.kind,
                id = %resource.id,
                region = %resource.region,
                status = ?resource.status,
                "Residual resource after teardown"
            );
        }
        for service in &self.leftover_services {
            error!(instance = %service.id, state = %service.state, "Residual service instance after teardown");
        }
    }
}

/// Tears down every resource one account owns
pub struct Teardown {
    http: reqwest::Client,
    auth: Arc<IamAuthenticator>,
    endpoints: CloudEndpoints,
    region_denylist: Vec<String>,
    policies: PlanPolicies,
}

impl Teardown {
    pub fn new(http: reqwest::Client, credential: Credential, endpoints: CloudEndpoints) -> Self {
        let auth = Arc::new(IamAuthenticator::new(
            http.clone(),
            endpoints.iam_token_url.clone(),
            credential,
        ));
        Self {
            http,
            auth,
            endpoints,
            region_denylist: default_region_denylist(),
            policies: PlanPolicies::default(),
        }
    }

    pub fn with_region_denylist(mut self, denylist: Vec<String>) -> Self {
        self.region_denylist = denylist;
        self
    }

    pub fn with_policies(mut self, policies: PlanPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Run the full deletion plan. Errors here mean the account could not
    /// be processed at all (credential exchange, region discovery); stuck
    /// resources are reported, not raised.
    pub async fn run(&self) -> Result<TeardownReport> {
        let platform = PlatformClient::new(
            self.http.clone(),
            Arc::clone(&self.auth),
            self.endpoints.resource_controller_url.clone(),
        );
        let resource_groups = platform
            .list_resource_groups()
            .await
            .context("Failed to enumerate resource groups")?;
        info!(count = resource_groups.len(), "Enumerated resource groups");

        let mut report = TeardownReport::default();

        // Clusters are global; deleting them up front also frees the VPC
        // objects their workers hold, which the regional loop would
        // otherwise find busy.
        report.stuck.extend(self.sweep_clusters().await);

        let vpc = VpcClient::new(
            self.http.clone(),
            Arc::clone(&self.auth),
            self.endpoints.vpc_url.clone(),
        );
        let regions = vpc
            .list_regions()
            .await
            .context("Failed to enumerate regions")?;

        for region in &regions {
            if self.region_denylist.iter().any(|d| d == &region.name) {
                info!(region = %region.name, "Skipping denylisted region");
                continue;
            }
            info!(region = %region.name, endpoint = %region.endpoint, "Processing region");
            let regional = vpc.for_region(region);
            report
                .stuck
                .extend(self.sweep_region(&regional, &resource_groups).await);
        }

        info!(
            settle_secs = self.policies.controller_settle.as_secs(),
            "Waiting for the resource controller to catch up"
        );
        sleep(self.policies.controller_settle).await;

        report
            .stuck
            .extend(self.sweep_object_storage(&platform, &resource_groups).await);
        report.leftover_services = platform.scan_leftovers(&resource_groups).await;

        Ok(report)
    }

    /// Run every kind of the regional plan, in order, against one region
    async fn sweep_region(
        &self,
        vpc: &VpcClient,
        resource_groups: &[ResourceGroup],
    ) -> Vec<ManagedResource> {
        let mut stuck = Vec::new();
        for kind in REGIONAL_ORDER {
            let policy = self.policies.for_kind(kind);
            match kind {
                ResourceKind::InstanceGroup => {
                    stuck.extend(sweep_instance_groups(vpc, &policy).await);
                }
                ResourceKind::FlowLogCollector => {
                    report_flow_log_collectors(vpc).await;
                }
                ResourceKind::Image => {
                    // The listing API requires a resource group filter
                    for rg in resource_groups {
                        let adapter = KindAdapter::for_images(vpc, rg.id.clone());
                        stuck.extend(sweep(&adapter, &policy).await);
                    }
                }
                _ => {
                    let adapter = KindAdapter::new(kind, vpc);
                    stuck.extend(sweep(&adapter, &policy).await);
                }
            }
        }
        stuck
    }

    async fn sweep_clusters(&self) -> Vec<ManagedResource> {
        let client = ClusterClient::new(
            self.http.clone(),
            Arc::clone(&self.auth),
            self.endpoints.containers_url.clone(),
        );
        let policy = self.policies.for_kind(ResourceKind::ManagedCluster);

        let clusters = match client.list_clusters().await {
            Ok(clusters) => clusters,
            Err(e) => {
                error!(error = %e, "Failed to list managed clusters");
                return Vec::new();
            }
        };
        if clusters.is_empty() {
            debug!("No managed clusters to delete");
            return Vec::new();
        }

        let mut any_deleted = false;
        for cluster in &clusters {
            if cluster.state == "deleting" {
                debug!(cluster = %cluster.id, "Cluster already deleting");
                continue;
            }
            info!(cluster = %cluster.id, name = %cluster.name, "Deleting managed cluster");
            match client.delete_cluster(&cluster.id).await {
                Ok(()) => any_deleted = true,
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    error!(cluster = %cluster.id, error = %e, "Failed to delete managed cluster");
                }
            }
        }

        if any_deleted {
            info!(
                settle_secs = policy.settle.as_secs(),
                "Waiting for managed clusters to delete"
            );
            sleep(policy.settle).await;
        }

        let mut remaining = match client.list_clusters().await {
            Ok(clusters) => clusters,
            Err(e) => {
                error!(error = %e, "Failed to re-list managed clusters");
                return Vec::new();
            }
        };
        let mut attempt = 1u32;
        while !remaining.is_empty() && attempt < policy.max_attempts {
            info!(
                attempt,
                remaining = remaining.len(),
                "Managed clusters still deleting"
            );
            sleep(policy.poll).await;
            attempt += 1;
            remaining = match client.list_clusters().await {
                Ok(clusters) => clusters,
                Err(e) => {
                    error!(error = %e, "Failed to re-list managed clusters");
                    return Vec::new();
                }
            };
        }

        if remaining.is_empty() {
            info!("No managed clusters remain");
            return Vec::new();
        }
        remaining
            .into_iter()
            .map(|cluster| {
                error!(cluster = %cluster.id, "Managed cluster could not be deleted; investigate");
                ManagedResource {
                    kind: ResourceKind::ManagedCluster,
                    id: cluster.id,
                    name: cluster.name,
                    region: "global".to_string(),
                    resource_group: None,
                    status: Some(cluster.state),
                }
            })
            .collect()
    }

    /// Object storage goes last: its instances only delete cleanly once the
    /// controller has caught up with the regional teardown.
    async fn sweep_object_storage(
        &self,
        platform: &PlatformClient,
        resource_groups: &[ResourceGroup],
    ) -> Vec<ManagedResource> {
        let policy = self.policies.for_kind(ResourceKind::ObjectStorage);
        let mut stuck = Vec::new();

        for rg in resource_groups {
            let instances = match platform.list_service_instances(&rg.id).await {
                Ok(instances) => instances,
                Err(e) => {
                    warn!(resource_group = %rg.id, error = %e, "Failed to list service instances");
                    continue;
                }
            };

            for instance in instances.into_iter().filter(ServiceInstance::is_object_storage) {
                info!(instance = %instance.id, "Deleting object storage instance");
                match platform.delete_service_instance(&instance.guid).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => {
                        error!(instance = %instance.id, error = %e, "Failed to delete object storage instance");
                    }
                }

                sleep(policy.settle).await;

                match platform.get_service_instance(&instance.guid).await {
                    Ok(current) if current.state == "removed" => {
                        info!(instance = %current.id, "Object storage instance deleted");
                    }
                    Ok(current) => {
                        warn!(
                            instance = %current.id,
                            state = %current.state,
                            "Object storage instance may not be deleted; investigate"
                        );
                        stuck.push(current.into_managed());
                    }
                    Err(e) if e.is_not_found() => {
                        info!(instance = %instance.id, "Object storage instance deleted");
                    }
                    Err(e) => {
                        warn!(instance = %instance.id, error = %e, "Could not confirm object storage deletion");
                        stuck.push(instance.into_managed());
                    }
                }
            }
        }
        stuck
    }
}

/// The generic sweep: delete everything listed, settle, then retry until
/// empty or out of attempts. Returns whatever is still present.
///
/// Every resource gets at most `policy.max_attempts` delete attempts
/// (initial pass included), however many remain.
pub async fn sweep(adapter: &dyn Sweep, policy: &RetryPolicy) -> Vec<ManagedResource> {
    let kind = adapter.kind();
    let scope = adapter.scope();

    let resources = list_or_empty(adapter).await;
    if resources.is_empty() {
        debug!(kind = %kind, scope = %scope, "Nothing to delete");
        return Vec::new();
    }

    info!(kind = %kind, scope = %scope, count = resources.len(), "Deleting resources");
    for resource in &resources {
        delete_one(adapter, resource).await;
    }
    sleep(policy.settle).await;

    let mut remaining = list_or_empty(adapter).await;
    let mut attempt = 1u32;
    while !remaining.is_empty() && attempt < policy.max_attempts {
        attempt += 1;
        for resource in &remaining {
            warn!(
                kind = %kind,
                id = %resource.id,
                status = ?resource.status,
                attempt,
                "Resource still present, retrying delete"
            );
            delete_one(adapter, resource).await;
        }
        sleep(policy.poll).await;
        remaining = list_or_empty(adapter).await;
    }

    if remaining.is_empty() {
        info!(kind = %kind, scope = %scope, "All resources deleted");
    } else {
        for resource in &remaining {
            error!(
                kind = %kind,
                id = %resource.id,
                status = ?resource.status,
                "Resource could not be deleted; investigate"
            );
        }
    }
    remaining
}

async fn delete_one(adapter: &dyn Sweep, resource: &ManagedResource) {
    if !adapter.delete_eligible(resource) {
        info!(
            kind = %resource.kind,
            id = %resource.id,
            status = ?resource.status,
            "Skipping delete; status not eligible"
        );
        return;
    }
    match adapter.delete(resource).await {
        Ok(()) => debug!(kind = %resource.kind, id = %resource.id, "Delete requested"),
        Err(e) => {
            // Failed deletes stay candidates for the next attempt
            error!(kind = %resource.kind, id = %resource.id, error = %e, "Delete failed");
        }
    }
}

/// A listing failure never aborts the plan: an unsupported or broken
/// region simply has nothing to delete.
async fn list_or_empty(adapter: &dyn Sweep) -> Vec<ManagedResource> {
    match adapter.list().await {
        Ok(resources) => resources,
        Err(e) if e.is_region_unavailable() => {
            debug!(kind = %adapter.kind(), "Region unavailable; treating as empty");
            Vec::new()
        }
        Err(e) => {
            error!(kind = %adapter.kind(), error = %e, "Listing failed; treating as empty");
            Vec::new()
        }
    }
}

/// Instance groups cannot be deleted while an autoscale manager can still
/// add members: drop the managers, scale to zero, wait for the memberships
/// to drain, then delete the group itself.
async fn sweep_instance_groups(vpc: &VpcClient, policy: &RetryPolicy) -> Vec<ManagedResource> {
    let groups = match vpc.list_instance_groups().await {
        Ok(groups) => groups,
        Err(e) if e.is_region_unavailable() => return Vec::new(),
        Err(e) => {
            error!(error = %e, "Failed to list instance groups");
            return Vec::new();
        }
    };
    if groups.is_empty() {
        debug!(region = %vpc.region(), "No instance groups to delete");
        return Vec::new();
    }

    for group in &groups {
        for manager in &group.managers {
            if let Err(e) = vpc
                .delete_instance_group_manager(&group.id, &manager.id)
                .await
                && !e.is_not_found()
            {
                error!(
                    group = %group.id,
                    manager = %manager.id,
                    error = %e,
                    "Failed to delete instance group manager"
                );
            }
        }

        if let Err(e) = vpc.zero_instance_group_membership(&group.id).await {
            error!(group = %group.id, error = %e, "Failed to zero membership count");
        }

        let mut memberships = list_memberships_or_empty(vpc, &group.id).await;
        let mut attempt = 1u32;
        while !memberships.is_empty() && attempt < policy.max_attempts {
            info!(
                group = %group.id,
                attempt,
                remaining = memberships.len(),
                "Waiting for instance group to drain"
            );
            sleep(policy.poll).await;
            attempt += 1;
            memberships = list_memberships_or_empty(vpc, &group.id).await;
        }

        info!(group = %group.id, name = %group.name, "Deleting instance group");
        match vpc.delete(ResourceKind::InstanceGroup, &group.id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => error!(group = %group.id, error = %e, "Failed to delete instance group"),
        }
    }

    match vpc.list_instance_groups().await {
        Ok(remaining) if remaining.is_empty() => {
            info!(region = %vpc.region(), "All instance groups deleted");
            Vec::new()
        }
        Ok(remaining) => remaining
            .into_iter()
            .map(|group| {
                error!(group = %group.id, "Instance group could not be deleted; investigate");
                ManagedResource {
                    kind: ResourceKind::InstanceGroup,
                    id: group.id,
                    name: group.name,
                    region: vpc.region().to_string(),
                    resource_group: group.resource_group.map(|rg| rg.id),
                    status: group.status,
                }
            })
            .collect(),
        Err(e) => {
            error!(error = %e, "Failed to re-list instance groups");
            Vec::new()
        }
    }
}

async fn list_memberships_or_empty(vpc: &VpcClient, group_id: &str) -> Vec<crate::types::Ref> {
    match vpc.list_instance_group_memberships(group_id).await {
        Ok(memberships) => memberships,
        Err(e) => {
            error!(group = %group_id, error = %e, "Failed to list instance group memberships");
            Vec::new()
        }
    }
}

/// Private flow log collectors have no delete path yet; their presence is
/// surfaced but never acted on.
async fn report_flow_log_collectors(vpc: &VpcClient) {
    match vpc.list(ResourceKind::FlowLogCollector, None).await {
        Ok(collectors) if collectors.is_empty() => {
            debug!(region = %vpc.region(), "No flow log collectors");
        }
        Ok(collectors) => {
            warn!(
                region = %vpc.region(),
                count = collectors.len(),
                "Flow log collectors exist and cannot be deleted"
            );
            for collector in collectors {
                warn!(id = %collector.id, "Flow log collector present");
            }
        }
        Err(e) if e.is_region_unavailable() => {}
        Err(e) => error!(error = %e, "Failed to list flow log collectors"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::delete_allowed;
    use crate::error::CloudError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn resource(kind: ResourceKind, id: &str, status: Option<&str>) -> ManagedResource {
        ManagedResource {
            kind,
            id: id.to_string(),
            name: id.to_string(),
            region: "r1".to_string(),
            resource_group: None,
            status: status.map(|s| s.to_string()),
        }
    }

    #[derive(Default)]
    struct MockState {
        resources: Vec<ManagedResource>,
        delete_attempts: HashMap<String, u32>,
        /// Deletes succeed and the resource disappears from later lists
        vanish_on_delete: bool,
        /// Deletes return an API error
        fail_deletes: bool,
        /// Lists return an API error
        fail_lists: bool,
    }

    struct MockSweep {
        kind: ResourceKind,
        state: Mutex<MockState>,
    }

    impl MockSweep {
        fn new(kind: ResourceKind, resources: Vec<ManagedResource>) -> Self {
            Self {
                kind,
                state: Mutex::new(MockState {
                    resources,
                    vanish_on_delete: true,
                    ..MockState::default()
                }),
            }
        }

        fn attempts(&self, id: &str) -> u32 {
            self.state
                .lock()
                .unwrap()
                .delete_attempts
                .get(id)
                .copied()
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl Sweep for MockSweep {
        fn kind(&self) -> ResourceKind {
            self.kind
        }

        fn scope(&self) -> String {
            "r1".to_string()
        }

        async fn list(&self) -> crate::error::CloudResult<Vec<ManagedResource>> {
            let state = self.state.lock().unwrap();
            if state.fail_lists {
                return Err(CloudError::Api {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(state.resources.clone())
        }

        async fn delete(&self, resource: &ManagedResource) -> crate::error::CloudResult<()> {
            let mut state = self.state.lock().unwrap();
            *state
                .delete_attempts
                .entry(resource.id.clone())
                .or_insert(0) += 1;
            if state.fail_deletes {
                return Err(CloudError::Api {
                    status: 500,
                    message: "delete failed".to_string(),
                });
            }
            if state.vanish_on_delete {
                state.resources.retain(|r| r.id != resource.id);
            }
            Ok(())
        }

        fn delete_eligible(&self, resource: &ManagedResource) -> bool {
            delete_allowed(self.kind, resource.status.as_deref())
        }
    }

    fn policy() -> RetryPolicy {
        PlanPolicies::default().for_kind(ResourceKind::Instance)
    }

    #[tokio::test(start_paused = true)]
    async fn test_deletes_everything_in_one_cycle() {
        let mock = MockSweep::new(
            ResourceKind::Instance,
            vec![
                resource(ResourceKind::Instance, "i-1", Some("running")),
                resource(ResourceKind::Instance, "i-2", Some("running")),
                resource(ResourceKind::Instance, "i-3", Some("running")),
            ],
        );

        let remaining = sweep(&mock, &policy()).await;
        assert!(remaining.is_empty());
        for id in ["i-1", "i-2", "i-3"] {
            assert_eq!(mock.attempts(id), 1, "{id} should be deleted exactly once");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_is_bounded() {
        // Delete always fails; the resource never leaves the listing.
        let mock = MockSweep {
            kind: ResourceKind::Subnet,
            state: Mutex::new(MockState {
                resources: vec![resource(ResourceKind::Subnet, "sub-1", Some("available"))],
                fail_deletes: true,
                ..MockState::default()
            }),
        };

        let remaining = sweep(&mock, &policy()).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "sub-1");
        assert_eq!(
            mock.attempts("sub-1"),
            6,
            "1 initial + 5 retries, never more"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_resource_is_reported_not_fatal() {
        // Delete is accepted but the resource never disappears.
        let mock = MockSweep {
            kind: ResourceKind::LoadBalancer,
            state: Mutex::new(MockState {
                resources: vec![resource(
                    ResourceKind::LoadBalancer,
                    "lb-1",
                    Some("active"),
                )],
                vanish_on_delete: false,
                ..MockState::default()
            }),
        };

        let remaining = sweep(&mock, &policy()).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "lb-1");
        assert_eq!(mock.attempts("lb-1"), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ineligible_status_is_skipped_not_deleted() {
        // A pending volume must never get a delete call, and it ends up
        // in the stuck report once the budget is exhausted.
        let mock = MockSweep {
            kind: ResourceKind::Volume,
            state: Mutex::new(MockState {
                resources: vec![resource(ResourceKind::Volume, "vol-1", Some("pending"))],
                vanish_on_delete: false,
                ..MockState::default()
            }),
        };

        let remaining = sweep(&mock, &policy()).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(mock.attempts("vol-1"), 0, "ineligible volume must be skipped");
    }

    #[tokio::test(start_paused = true)]
    async fn test_eligible_volume_is_deleted() {
        let mock = MockSweep::new(
            ResourceKind::Volume,
            vec![
                resource(ResourceKind::Volume, "vol-ok", Some("available")),
                resource(ResourceKind::Volume, "vol-bad", Some("failed")),
            ],
        );

        let remaining = sweep(&mock, &policy()).await;
        assert!(remaining.is_empty());
        assert_eq!(mock.attempts("vol-ok"), 1);
        assert_eq!(mock.attempts("vol-bad"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_listing_short_circuits() {
        let mock = MockSweep::new(ResourceKind::SshKey, Vec::new());
        let remaining = sweep(&mock, &policy()).await;
        assert!(remaining.is_empty());
        assert!(mock.state.lock().unwrap().delete_attempts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_error_treated_as_empty() {
        let mock = MockSweep {
            kind: ResourceKind::Vpc,
            state: Mutex::new(MockState {
                resources: vec![resource(ResourceKind::Vpc, "vpc-1", None)],
                fail_lists: true,
                ..MockState::default()
            }),
        };

        let remaining = sweep(&mock, &policy()).await;
        assert!(remaining.is_empty(), "listing failure must not abort the plan");
        assert_eq!(mock.attempts("vpc-1"), 0);
    }

    #[test]
    fn test_report_cleanliness() {
        let mut report = TeardownReport::default();
        assert!(report.is_clean());
        assert_eq!(report.residual_count(), 0);

        report
            .stuck
            .push(resource(ResourceKind::LoadBalancer, "lb-1", Some("active")));
        assert!(!report.is_clean());
        assert_eq!(report.residual_count(), 1);
    }
}
