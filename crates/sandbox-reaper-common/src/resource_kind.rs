//! Cloud resource kinds and teardown ordering
//!
//! Provides consistent teardown priority across the engine. Resources must
//! be deleted in dependency order or the provider rejects the delete.

/// Kinds of cloud resources a sandbox account can accumulate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Managed container cluster (global scope, deleted before the region loop)
    ManagedCluster,
    /// Instance group (autoscale managers and memberships must drain first)
    InstanceGroup,
    /// Instance template
    InstanceTemplate,
    /// Compute instance (must be gone before volumes become reclaimable)
    Instance,
    /// Block storage volume (delete only in `available` or `failed`)
    Volume,
    /// SSH key
    SshKey,
    /// Custom image (listed per resource group)
    Image,
    /// VPN gateway
    VpnGateway,
    /// Load balancer (retry delete only in `active` or `failed`)
    LoadBalancer,
    /// Endpoint gateway
    EndpointGateway,
    /// Flow log collector (no delete path; presence is only reported)
    FlowLogCollector,
    /// Subnet
    Subnet,
    /// Public gateway
    PublicGateway,
    /// Floating IP
    FloatingIp,
    /// VPC (subnets and gateways must be gone first)
    Vpc,
    /// Security group
    SecurityGroup,
    /// Object storage service instance (global scope, deleted after the region loop)
    ObjectStorage,
}

/// The fixed per-region deletion order. This is an invariant of the engine,
/// not configuration: each kind is only swept once every kind before it has
/// been driven to empty (or reported stuck).
pub const REGIONAL_ORDER: [ResourceKind; 15] = [
    ResourceKind::InstanceGroup,
    ResourceKind::InstanceTemplate,
    ResourceKind::Instance,
    ResourceKind::Volume,
    ResourceKind::SshKey,
    ResourceKind::Image,
    ResourceKind::VpnGateway,
    ResourceKind::LoadBalancer,
    ResourceKind::EndpointGateway,
    ResourceKind::FlowLogCollector,
    ResourceKind::Subnet,
    ResourceKind::PublicGateway,
    ResourceKind::FloatingIp,
    ResourceKind::Vpc,
    ResourceKind::SecurityGroup,
];

impl ResourceKind {
    /// Get teardown priority (lower number = torn down first)
    ///
    /// Clusters are global and go before any regional work; object storage
    /// is global and goes after every region has been swept, because its
    /// controller view only stabilizes once the regional cleanup settles.
    /// Within a region, compute must drain before storage and networking,
    /// and the VPC itself is close to last.
    pub fn teardown_priority(self) -> u8 {
        match self {
            ResourceKind::ManagedCluster => 0,
            ResourceKind::InstanceGroup => 1,
            ResourceKind::InstanceTemplate => 2,
            ResourceKind::Instance => 3,
            ResourceKind::Volume => 4,
            ResourceKind::SshKey => 5,
            ResourceKind::Image => 6,
            ResourceKind::VpnGateway => 7,
            ResourceKind::LoadBalancer => 8,
            ResourceKind::EndpointGateway => 9,
            ResourceKind::FlowLogCollector => 10,
            ResourceKind::Subnet => 11,
            ResourceKind::PublicGateway => 12,
            ResourceKind::FloatingIp => 13,
            ResourceKind::Vpc => 14,
            ResourceKind::SecurityGroup => 15,
            ResourceKind::ObjectStorage => 16,
        }
    }

    /// Whether this kind is swept once per account rather than once per region
    pub fn is_global(self) -> bool {
        matches!(
            self,
            ResourceKind::ManagedCluster | ResourceKind::ObjectStorage
        )
    }

    /// Whether the engine has a delete path for this kind
    pub fn is_deletable(self) -> bool {
        !matches!(self, ResourceKind::FlowLogCollector)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::ManagedCluster => "managed-cluster",
            ResourceKind::InstanceGroup => "instance-group",
            ResourceKind::InstanceTemplate => "instance-template",
            ResourceKind::Instance => "instance",
            ResourceKind::Volume => "volume",
            ResourceKind::SshKey => "ssh-key",
            ResourceKind::Image => "image",
            ResourceKind::VpnGateway => "vpn-gateway",
            ResourceKind::LoadBalancer => "load-balancer",
            ResourceKind::EndpointGateway => "endpoint-gateway",
            ResourceKind::FlowLogCollector => "flow-log-collector",
            ResourceKind::Subnet => "subnet",
            ResourceKind::PublicGateway => "public-gateway",
            ResourceKind::FloatingIp => "floating-ip",
            ResourceKind::Vpc => "vpc",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::ObjectStorage => "object-storage",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clusters_before_everything_regional() {
        for kind in REGIONAL_ORDER {
            assert!(
                ResourceKind::ManagedCluster.teardown_priority() < kind.teardown_priority(),
                "Clusters must drain before regional kind {kind}"
            );
        }
    }

    #[test]
    fn test_object_storage_after_everything_regional() {
        for kind in REGIONAL_ORDER {
            assert!(
                kind.teardown_priority() < ResourceKind::ObjectStorage.teardown_priority(),
                "Object storage must wait for regional kind {kind}"
            );
        }
    }

    #[test]
    fn test_compute_before_volumes() {
        assert!(
            ResourceKind::Instance.teardown_priority() < ResourceKind::Volume.teardown_priority(),
            "Instances must be gone before their volumes are reclaimable"
        );
        assert!(
            ResourceKind::InstanceGroup.teardown_priority()
                < ResourceKind::Instance.teardown_priority(),
            "Instance groups must drain before individual instances"
        );
    }

    #[test]
    fn test_network_before_vpc() {
        for kind in [
            ResourceKind::Subnet,
            ResourceKind::PublicGateway,
            ResourceKind::FloatingIp,
            ResourceKind::LoadBalancer,
            ResourceKind::EndpointGateway,
        ] {
            assert!(
                kind.teardown_priority() < ResourceKind::Vpc.teardown_priority(),
                "{kind} must be released before the VPC can be deleted"
            );
        }
    }

    #[test]
    fn test_regional_order_matches_priorities() {
        let mut sorted = REGIONAL_ORDER;
        sorted.sort_by_key(|k| k.teardown_priority());
        assert_eq!(sorted, REGIONAL_ORDER, "Plan order must match priorities");
    }

    #[test]
    fn test_flow_log_collectors_are_not_deletable() {
        assert!(!ResourceKind::FlowLogCollector.is_deletable());
        for kind in REGIONAL_ORDER {
            if kind != ResourceKind::FlowLogCollector {
                assert!(kind.is_deletable(), "{kind} should have a delete path");
            }
        }
    }

    #[test]
    fn test_global_kinds() {
        assert!(ResourceKind::ManagedCluster.is_global());
        assert!(ResourceKind::ObjectStorage.is_global());
        for kind in REGIONAL_ORDER {
            assert!(!kind.is_global(), "{kind} is swept per region");
        }
    }
}
