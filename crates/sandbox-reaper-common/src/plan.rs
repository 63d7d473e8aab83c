//! Retry and settle timing for the deletion plan
//!
//! Every kind gets the same bounded-retry sweep; only the waits differ.
//! The settle interval gives the provider's async deletion time to start
//! before the first re-list, the poll interval paces the retry loop.

use crate::resource_kind::ResourceKind;
use std::time::Duration;

/// Total delete attempts per resource per scope: 1 initial + 5 retries.
pub const MAX_DELETE_ATTEMPTS: u32 = 6;

/// Timing for one kind's sweep
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Wait after the initial delete pass, before the first re-list
    pub settle: Duration,
    /// Wait between retry attempts
    pub poll: Duration,
    /// Total delete attempts (initial pass included)
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const fn new(settle_secs: u64, poll_secs: u64) -> Self {
        Self {
            settle: Duration::from_secs(settle_secs),
            poll: Duration::from_secs(poll_secs),
            max_attempts: MAX_DELETE_ATTEMPTS,
        }
    }
}

/// The per-kind timing table plus the global settle points
#[derive(Debug, Clone)]
pub struct PlanPolicies {
    /// Wait before the object-storage phase, letting the resource
    /// controller catch up with the regional deletions
    pub controller_settle: Duration,
    /// Scale applied to every wait; tests set this to zero
    scale: f64,
}

impl Default for PlanPolicies {
    fn default() -> Self {
        Self {
            controller_settle: Duration::from_secs(60),
            scale: 1.0,
        }
    }
}

impl PlanPolicies {
    /// Policies with all waits zeroed, for tests
    pub fn instant() -> Self {
        Self {
            controller_settle: Duration::ZERO,
            scale: 0.0,
        }
    }

    pub fn for_kind(&self, kind: ResourceKind) -> RetryPolicy {
        let base = base_policy(kind);
        RetryPolicy {
            settle: base.settle.mul_f64(self.scale),
            poll: base.poll.mul_f64(self.scale),
            max_attempts: base.max_attempts,
        }
    }
}

/// Unscaled timing per kind. Clusters take by far the longest to tear down;
/// load balancers and VPN gateways also deprovision slowly.
fn base_policy(kind: ResourceKind) -> RetryPolicy {
    match kind {
        ResourceKind::ManagedCluster => RetryPolicy::new(600, 60),
        ResourceKind::InstanceGroup => RetryPolicy::new(15, 15),
        ResourceKind::InstanceTemplate => RetryPolicy::new(15, 15),
        ResourceKind::Instance => RetryPolicy::new(30, 15),
        ResourceKind::Volume => RetryPolicy::new(30, 15),
        ResourceKind::SshKey => RetryPolicy::new(30, 15),
        ResourceKind::Image => RetryPolicy::new(30, 15),
        ResourceKind::VpnGateway => RetryPolicy::new(90, 15),
        ResourceKind::LoadBalancer => RetryPolicy::new(120, 30),
        ResourceKind::EndpointGateway => RetryPolicy::new(30, 15),
        ResourceKind::FlowLogCollector => RetryPolicy::new(0, 0),
        ResourceKind::Subnet => RetryPolicy::new(30, 15),
        ResourceKind::PublicGateway => RetryPolicy::new(30, 15),
        ResourceKind::FloatingIp => RetryPolicy::new(30, 15),
        ResourceKind::Vpc => RetryPolicy::new(30, 15),
        ResourceKind::SecurityGroup => RetryPolicy::new(15, 15),
        ResourceKind::ObjectStorage => RetryPolicy::new(20, 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_kind::REGIONAL_ORDER;

    #[test]
    fn test_attempt_budget_is_six() {
        let policies = PlanPolicies::default();
        for kind in REGIONAL_ORDER {
            assert_eq!(policies.for_kind(kind).max_attempts, 6);
        }
    }

    #[test]
    fn test_intervals_within_bounds() {
        let policies = PlanPolicies::default();
        for kind in REGIONAL_ORDER {
            if kind == ResourceKind::FlowLogCollector {
                continue;
            }
            let policy = policies.for_kind(kind);
            assert!(
                (15..=600).contains(&policy.settle.as_secs()),
                "{kind} settle out of range"
            );
            assert!(
                (15..=60).contains(&policy.poll.as_secs()),
                "{kind} poll out of range"
            );
        }
    }

    #[test]
    fn test_instant_policies_do_not_wait() {
        let policies = PlanPolicies::instant();
        assert_eq!(policies.controller_settle, Duration::ZERO);
        for kind in REGIONAL_ORDER {
            let policy = policies.for_kind(kind);
            assert_eq!(policy.settle, Duration::ZERO);
            assert_eq!(policy.poll, Duration::ZERO);
            assert_eq!(policy.max_attempts, 6, "scaling must not touch the budget");
        }
    }

    #[test]
    fn test_slow_kinds_settle_longer() {
        let policies = PlanPolicies::default();
        let lb = policies.for_kind(ResourceKind::LoadBalancer);
        let subnet = policies.for_kind(ResourceKind::Subnet);
        assert!(lb.settle > subnet.settle);
        let cluster = policies.for_kind(ResourceKind::ManagedCluster);
        assert_eq!(cluster.settle.as_secs(), 600);
    }
}
