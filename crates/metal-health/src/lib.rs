//! Health checks of metal components
//!
//! Checks are registered per extension kind and condition type in
//! [`registry`]. The [`aggregator`] evaluates them periodically and publishes
//! the worst result per condition into the extension resource's status.

#![deny(missing_docs)]

pub mod aggregator;
pub mod check;
pub mod deployment;
pub mod duros;
pub mod firewall;
pub mod loadbalancer;
pub mod nodes;
pub mod registry;
pub mod shoot_client;
pub mod types;

pub use aggregator::HealthAggregator;
pub use check::{CheckContext, HealthCheck, PreCheck};
pub use registry::{default_registrations, HealthRegistration};
pub use shoot_client::{SecretShootClientFactory, ShootClient, ShootClientFactory};
pub use types::{HealthResult, HealthStatus};
