//! sandbox-reaper-cloud - cloud API clients and the teardown engine
//!
//! Everything needed to tear one sandbox account down: credential
//! exchange, the VPC/platform/container service clients, and the engine
//! that drives the deletion plan across regions.

pub mod adapter;
pub mod auth;
pub mod clusters;
pub mod endpoints;
pub mod engine;
pub mod error;
pub mod platform;
pub mod types;
pub mod vpc;

pub use endpoints::CloudEndpoints;
pub use engine::{Teardown, TeardownReport};
pub use error::{CloudError, CloudResult};
pub use types::ManagedResource;
