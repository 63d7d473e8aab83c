//! Typed records for the provider's API payloads
//!
//! Wire payloads are converted into [`ManagedResource`] once at ingestion;
//! nothing downstream touches raw JSON. The raw record tolerates the
//! provider's three different status field names so one type covers every
//! VPC collection.

use sandbox_reaper_common::ResourceKind;
use serde::Deserialize;

/// A discovered resource owned by the account being torn down.
///
/// Ephemeral: rediscovered on every list call, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedResource {
    pub kind: ResourceKind,
    pub id: String,
    pub name: String,
    pub region: String,
    pub resource_group: Option<String>,
    pub status: Option<String>,
}

/// Reference-by-id payload fragment (`{"id": "..."}`)
#[derive(Debug, Clone, Deserialize)]
pub struct Ref {
    pub id: String,
}

/// One resource as listed by any VPC collection endpoint.
///
/// Load balancers report `provisioning_status`, endpoint gateways report
/// `lifecycle_state`, everything else reports `status`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawResource {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub lifecycle_state: Option<String>,
    #[serde(default)]
    pub provisioning_status: Option<String>,
    #[serde(default)]
    pub resource_group: Option<Ref>,
}

impl RawResource {
    fn status(&self) -> Option<String> {
        self.status
            .clone()
            .or_else(|| self.provisioning_status.clone())
            .or_else(|| self.lifecycle_state.clone())
    }

    pub fn into_managed(self, kind: ResourceKind, region: &str) -> ManagedResource {
        let status = self.status();
        ManagedResource {
            kind,
            id: self.id,
            name: self.name,
            region: region.to_string(),
            resource_group: self.resource_group.map(|rg| rg.id),
            status,
        }
    }
}

/// A region as advertised by the VPC API
#[derive(Debug, Clone, Deserialize)]
pub struct Region {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// A resource group from the resource manager
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// An instance group with its autoscale managers
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub managers: Vec<Ref>,
    #[serde(default)]
    pub resource_group: Option<Ref>,
}

/// A managed container cluster (global scope)
#[derive(Debug, Clone, Deserialize)]
pub struct Cluster {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
}

/// A service instance from the resource controller
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInstance {
    /// CRN-style identifier; offering name is embedded in it
    pub id: String,
    pub guid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub resource_group_id: Option<String>,
}

impl ServiceInstance {
    /// Whether this is an object storage instance
    pub fn is_object_storage(&self) -> bool {
        self.id.contains("cloud-object-storage")
    }

    pub fn into_managed(self) -> ManagedResource {
        ManagedResource {
            kind: ResourceKind::ObjectStorage,
            id: self.id,
            name: self.name,
            region: "global".to_string(),
            resource_group: self.resource_group_id,
            status: Some(self.state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_field_coalescing() {
        let volume: RawResource = serde_json::from_str(
            r#"{"id": "vol-1", "name": "data", "status": "available",
                "resource_group": {"id": "rg-1"}}"#,
        )
        .unwrap();
        let managed = volume.into_managed(ResourceKind::Volume, "r1");
        assert_eq!(managed.status.as_deref(), Some("available"));
        assert_eq!(managed.resource_group.as_deref(), Some("rg-1"));

        let lb: RawResource = serde_json::from_str(
            r#"{"id": "lb-1", "provisioning_status": "active"}"#,
        )
        .unwrap();
        let managed = lb.into_managed(ResourceKind::LoadBalancer, "r1");
        assert_eq!(managed.status.as_deref(), Some("active"));

        let egw: RawResource =
            serde_json::from_str(r#"{"id": "egw-1", "lifecycle_state": "stable"}"#).unwrap();
        let managed = egw.into_managed(ResourceKind::EndpointGateway, "r1");
        assert_eq!(managed.status.as_deref(), Some("stable"));
    }

    #[test]
    fn test_object_storage_detection() {
        let cos = ServiceInstance {
            id: "crn:v1:bluemix:public:cloud-object-storage:global:a/1:inst-1::".to_string(),
            guid: "inst-1".to_string(),
            name: "cos".to_string(),
            state: "active".to_string(),
            resource_group_id: None,
        };
        assert!(cos.is_object_storage());

        let other = ServiceInstance {
            id: "crn:v1:bluemix:public:secrets-manager:us-south:a/1:inst-2::".to_string(),
            guid: "inst-2".to_string(),
            name: "sm".to_string(),
            state: "active".to_string(),
            resource_group_id: None,
        };
        assert!(!other.is_object_storage());
    }
}
