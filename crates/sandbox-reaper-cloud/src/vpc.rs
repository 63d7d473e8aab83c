//! VPC service client
//!
//! One client per regional endpoint. All collections share the same
//! list/delete plumbing; the per-kind differences are a path, a response
//! key, and (for images) a mandatory resource group filter.

use crate::auth::IamAuthenticator;
use crate::error::{CloudError, CloudResult, classify_status};
use crate::types::{InstanceGroup, ManagedResource, RawResource, Ref, Region};
use sandbox_reaper_common::ResourceKind;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Pinned API version date sent with every request
const API_VERSION: &str = "2025-03-25";

/// Page size for list calls. Sandbox accounts never get close to this.
const PAGE_LIMIT: &str = "100";

/// VPC collection path and response key per kind. Global kinds are handled
/// by their own services and have no VPC collection.
fn collection(kind: ResourceKind) -> Option<(&'static str, &'static str)> {
    match kind {
        ResourceKind::InstanceGroup => Some(("instance_groups", "instance_groups")),
        ResourceKind::InstanceTemplate => Some(("instance/templates", "templates")),
        ResourceKind::Instance => Some(("instances", "instances")),
        ResourceKind::Volume => Some(("volumes", "volumes")),
        ResourceKind::SshKey => Some(("keys", "keys")),
        ResourceKind::Image => Some(("images", "images")),
        ResourceKind::VpnGateway => Some(("vpn_gateways", "vpn_gateways")),
        ResourceKind::LoadBalancer => Some(("load_balancers", "load_balancers")),
        ResourceKind::EndpointGateway => Some(("endpoint_gateways", "endpoint_gateways")),
        ResourceKind::FlowLogCollector => Some(("flow_log_collectors", "flow_log_collectors")),
        ResourceKind::Subnet => Some(("subnets", "subnets")),
        ResourceKind::PublicGateway => Some(("public_gateways", "public_gateways")),
        ResourceKind::FloatingIp => Some(("floating_ips", "floating_ips")),
        ResourceKind::Vpc => Some(("vpcs", "vpcs")),
        ResourceKind::SecurityGroup => Some(("security_groups", "security_groups")),
        ResourceKind::ManagedCluster | ResourceKind::ObjectStorage => None,
    }
}

/// Client for one VPC regional endpoint
pub struct VpcClient {
    http: reqwest::Client,
    auth: Arc<IamAuthenticator>,
    base_url: String,
    region: String,
}

impl VpcClient {
    pub fn new(
        http: reqwest::Client,
        auth: Arc<IamAuthenticator>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            auth,
            base_url: base_url.into(),
            region: String::new(),
        }
    }

    /// A client bound to the endpoint a region advertises
    pub fn for_region(&self, region: &Region) -> Self {
        Self {
            http: self.http.clone(),
            auth: Arc::clone(&self.auth),
            base_url: format!("{}/v1", region.endpoint),
            region: region.name.clone(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    async fn get_collection<T: DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
        extra: &[(&str, &str)],
    ) -> CloudResult<Vec<T>> {
        let token = self.auth.token().await?;
        let mut query = vec![
            ("version", API_VERSION),
            ("generation", "2"),
            ("limit", PAGE_LIMIT),
        ];
        query.extend_from_slice(extra);

        let response = self
            .http
            .get(format!("{}/{path}", self.base_url))
            .bearer_auth(token)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }

        let body: serde_json::Value = response.json().await?;
        let items = body
            .get(key)
            .cloned()
            .unwrap_or(serde_json::Value::Array(Vec::new()));
        Ok(serde_json::from_value(items)?)
    }

    /// Regions this account can hold resources in
    pub async fn list_regions(&self) -> CloudResult<Vec<Region>> {
        self.get_collection("regions", "regions", &[]).await
    }

    /// List all resources of a kind in this region. Images require a
    /// resource group filter; other kinds ignore it.
    pub async fn list(
        &self,
        kind: ResourceKind,
        resource_group: Option<&str>,
    ) -> CloudResult<Vec<ManagedResource>> {
        let Some((path, key)) = collection(kind) else {
            return Ok(Vec::new());
        };

        let mut extra = Vec::new();
        if kind == ResourceKind::Image
            && let Some(rg) = resource_group
        {
            extra.push(("resource_group.id", rg));
        }

        let raw: Vec<RawResource> = self.get_collection(path, key, &extra).await?;
        Ok(raw
            .into_iter()
            .map(|r| r.into_managed(kind, &self.region))
            .collect())
    }

    /// Delete one resource. Success includes the provider's async-accepted
    /// responses; callers decide how to treat `NotFound`.
    pub async fn delete(&self, kind: ResourceKind, id: &str) -> CloudResult<()> {
        let Some((path, _)) = collection(kind) else {
            return Err(CloudError::NotFound(format!(
                "{kind} is not a VPC collection"
            )));
        };
        let token = self.auth.token().await?;
        let response = self
            .http
            .delete(format!("{}/{path}/{id}", self.base_url))
            .bearer_auth(token)
            .query(&[("version", API_VERSION), ("generation", "2")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }
        Ok(())
    }

    /// Instance groups with their autoscale managers attached
    pub async fn list_instance_groups(&self) -> CloudResult<Vec<InstanceGroup>> {
        self.get_collection("instance_groups", "instance_groups", &[])
            .await
    }

    pub async fn delete_instance_group_manager(
        &self,
        group_id: &str,
        manager_id: &str,
    ) -> CloudResult<()> {
        let token = self.auth.token().await?;
        let response = self
            .http
            .delete(format!(
                "{}/instance_groups/{group_id}/managers/{manager_id}",
                self.base_url
            ))
            .bearer_auth(token)
            .query(&[("version", API_VERSION), ("generation", "2")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }
        Ok(())
    }

    /// Scale an instance group down to zero members
    pub async fn zero_instance_group_membership(&self, group_id: &str) -> CloudResult<()> {
        let token = self.auth.token().await?;
        let response = self
            .http
            .patch(format!("{}/instance_groups/{group_id}", self.base_url))
            .bearer_auth(token)
            .query(&[("version", API_VERSION), ("generation", "2")])
            .json(&serde_json::json!({ "membership_count": 0 }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }
        Ok(())
    }

    pub async fn list_instance_group_memberships(
        &self,
        group_id: &str,
    ) -> CloudResult<Vec<Ref>> {
        self.get_collection(
            &format!("instance_groups/{group_id}/memberships"),
            "memberships",
            &[],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_table_covers_regional_kinds() {
        for kind in sandbox_reaper_common::resource_kind::REGIONAL_ORDER {
            assert!(
                collection(kind).is_some(),
                "{kind} must map to a VPC collection"
            );
        }
        assert!(collection(ResourceKind::ManagedCluster).is_none());
        assert!(collection(ResourceKind::ObjectStorage).is_none());
    }

    #[test]
    fn test_template_collection_path_differs_from_key() {
        let (path, key) = collection(ResourceKind::InstanceTemplate).unwrap();
        assert_eq!(path, "instance/templates");
        assert_eq!(key, "templates");
    }
}
