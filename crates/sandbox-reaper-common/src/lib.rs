//! sandbox-reaper-common - shared vocabulary for the sandbox reaper
//!
//! Resource kinds and their teardown ordering, the retry/settle plan,
//! metric names, and defaults shared between the cloud and coordinator
//! crates live here so both sides agree on them.

pub mod credential;
pub mod defaults;
pub mod metrics;
pub mod plan;
pub mod resource_kind;

pub use credential::Credential;
pub use plan::{PlanPolicies, RetryPolicy};
pub use resource_kind::ResourceKind;
