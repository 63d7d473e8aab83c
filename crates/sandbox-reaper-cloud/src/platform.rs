//! Resource manager and resource controller clients
//!
//! The resource manager enumerates the account's resource groups; the
//! resource controller owns the account-level view of service instances,
//! which is where object storage lives and where leftovers show up after
//! the regional sweep.

use crate::auth::IamAuthenticator;
use crate::error::{CloudResult, classify_status};
use crate::types::{ResourceGroup, ServiceInstance};
use std::sync::Arc;
use tracing::{info, warn};

/// Service offerings the controller lists but nobody can delete; they are
/// excluded from the leftover report rather than flagged forever.
const UNDELETABLE_OFFERINGS: &[&str] = &["security-advisor", "schematics"];

pub struct PlatformClient {
    http: reqwest::Client,
    auth: Arc<IamAuthenticator>,
    base_url: String,
}

impl PlatformClient {
    pub fn new(
        http: reqwest::Client,
        auth: Arc<IamAuthenticator>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            auth,
            base_url: base_url.into(),
        }
    }

    async fn get_resources<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> CloudResult<Vec<T>> {
        let token = self.auth.token().await?;
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }

        let body: serde_json::Value = response.json().await?;
        let items = body
            .get("resources")
            .cloned()
            .unwrap_or(serde_json::Value::Array(Vec::new()));
        Ok(serde_json::from_value(items)?)
    }

    /// The account's resource groups, enumerated once per teardown
    pub async fn list_resource_groups(&self) -> CloudResult<Vec<ResourceGroup>> {
        self.get_resources("/v2/resource_groups", &[]).await
    }

    /// Service instances in one resource group
    pub async fn list_service_instances(
        &self,
        resource_group: &str,
    ) -> CloudResult<Vec<ServiceInstance>> {
        self.get_resources(
            "/v2/resource_instances",
            &[("resource_group_id", resource_group)],
        )
        .await
    }

    /// Recursively delete a service instance and everything under it
    pub async fn delete_service_instance(&self, guid: &str) -> CloudResult<()> {
        let token = self.auth.token().await?;
        let response = self
            .http
            .delete(format!("{}/v2/resource_instances/{guid}", self.base_url))
            .bearer_auth(token)
            .query(&[("recursive", "true")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }
        Ok(())
    }

    pub async fn get_service_instance(&self, guid: &str) -> CloudResult<ServiceInstance> {
        let token = self.auth.token().await?;
        let response = self
            .http
            .get(format!("{}/v2/resource_instances/{guid}", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }
        Ok(response.json().await?)
    }

    /// Everything still registered to the account across all resource
    /// groups, minus the offerings nobody can delete. A non-empty result
    /// after teardown means the account is not fully cleaned.
    pub async fn scan_leftovers(
        &self,
        resource_groups: &[ResourceGroup],
    ) -> Vec<ServiceInstance> {
        let mut leftovers = Vec::new();
        for rg in resource_groups {
            match self.list_service_instances(&rg.id).await {
                Ok(instances) if instances.is_empty() => {
                    info!(resource_group = %rg.id, "No service instances remain");
                }
                Ok(instances) => {
                    // The controller briefly keeps tombstones around in
                    // `removed` state; those are not leftovers.
                    for instance in instances.into_iter().filter(|i| i.state != "removed") {
                        warn!(
                            resource_group = %rg.id,
                            instance = %instance.id,
                            "Resource group still has a service instance"
                        );
                        leftovers.push(instance);
                    }
                }
                Err(e) => {
                    warn!(resource_group = %rg.id, error = %e, "Leftover scan failed");
                }
            }
        }
        leftovers.retain(|instance| {
            !UNDELETABLE_OFFERINGS
                .iter()
                .any(|offering| instance.id.contains(offering))
        });
        leftovers
    }
}
