//! The sweep capability and its per-kind dispatch
//!
//! The engine needs exactly three things from a resource kind: list what
//! remains, delete one, and say whether a delete may be attempted in the
//! resource's current state. [`KindAdapter`] provides those over the VPC
//! client for every ordinary kind; the engine special-cases the rest.

use crate::error::CloudResult;
use crate::types::ManagedResource;
use crate::vpc::VpcClient;
use async_trait::async_trait;
use sandbox_reaper_common::ResourceKind;

/// Statuses in which a volume delete is accepted
const VOLUME_DELETE_STATUSES: &[&str] = &["available", "failed"];

/// Statuses in which a load balancer delete is accepted
const LOAD_BALANCER_DELETE_STATUSES: &[&str] = &["active", "failed"];

/// Whether a delete may be attempted for this kind in this status.
///
/// Volumes and load balancers reject deletes outside an explicit allow-set;
/// attempting anyway just burns an attempt on a guaranteed 409.
pub fn delete_allowed(kind: ResourceKind, status: Option<&str>) -> bool {
    let allowed = match kind {
        ResourceKind::Volume => VOLUME_DELETE_STATUSES,
        ResourceKind::LoadBalancer => LOAD_BALANCER_DELETE_STATUSES,
        _ => return true,
    };
    status.is_some_and(|status| allowed.contains(&status))
}

/// What the generic sweep routine needs from a resource kind
#[async_trait]
pub trait Sweep: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Scope label for logging (region, or region/resource-group)
    fn scope(&self) -> String;

    async fn list(&self) -> CloudResult<Vec<ManagedResource>>;

    /// Delete one resource. "Already gone" must be reported as success.
    async fn delete(&self, resource: &ManagedResource) -> CloudResult<()>;

    /// Whether a delete may be attempted in the resource's current state.
    /// Ineligible resources are skipped, not treated as failures.
    fn delete_eligible(&self, _resource: &ManagedResource) -> bool {
        true
    }
}

/// Sweep implementation for any plain VPC collection
pub struct KindAdapter<'a> {
    kind: ResourceKind,
    vpc: &'a VpcClient,
    resource_group: Option<String>,
}

impl<'a> KindAdapter<'a> {
    pub fn new(kind: ResourceKind, vpc: &'a VpcClient) -> Self {
        Self {
            kind,
            vpc,
            resource_group: None,
        }
    }

    /// Images can only be listed per resource group
    pub fn for_images(vpc: &'a VpcClient, resource_group: String) -> Self {
        Self {
            kind: ResourceKind::Image,
            vpc,
            resource_group: Some(resource_group),
        }
    }
}

#[async_trait]
impl Sweep for KindAdapter<'_> {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn scope(&self) -> String {
        match &self.resource_group {
            Some(rg) => format!("{}/{rg}", self.vpc.region()),
            None => self.vpc.region().to_string(),
        }
    }

    async fn list(&self) -> CloudResult<Vec<ManagedResource>> {
        self.vpc.list(self.kind, self.resource_group.as_deref()).await
    }

    async fn delete(&self, resource: &ManagedResource) -> CloudResult<()> {
        match self.vpc.delete(self.kind, &resource.id).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    fn delete_eligible(&self, resource: &ManagedResource) -> bool {
        delete_allowed(self.kind, resource.status.as_deref())
    }
}
