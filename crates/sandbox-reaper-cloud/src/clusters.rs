//! Managed container cluster client
//!
//! Clusters are account-global: the container service lists and deletes
//! them outside any VPC region, and `deleteResources=true` takes the
//! cluster's worker VPC objects down with it.

use crate::auth::IamAuthenticator;
use crate::error::{CloudResult, classify_status};
use crate::types::Cluster;
use std::sync::Arc;

pub struct ClusterClient {
    http: reqwest::Client,
    auth: Arc<IamAuthenticator>,
    base_url: String,
}

impl ClusterClient {
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

    /// All managed clusters in the account
    pub async fn list_clusters(&self) -> CloudResult<Vec<Cluster>> {
        let token = self.auth.token().await?;
        let response = self
            .http
            .get(format!("{}/global/v2/vpc/getClusters", self.base_url))
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

    /// Delete a cluster along with the resources it provisioned
    pub async fn delete_cluster(&self, cluster_id: &str) -> CloudResult<()> {
        let token = self.auth.token().await?;
        let response = self
            .http
            .delete(format!("{}/global/v1/clusters/{cluster_id}", self.base_url))
            .bearer_auth(token)
            .query(&[("deleteResources", "true")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }
        Ok(())
    }
}
