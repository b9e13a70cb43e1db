//! Common types for the metal extension: configuration, errors, resource
//! models and Kubernetes helpers

#![deny(missing_docs)]

pub mod client;
pub mod config;
pub mod crd;
pub mod error;
pub mod imagevector;
pub mod kube_utils;
pub mod secrets;
pub mod telemetry;

pub use config::ControllerConfiguration;
pub use error::Error;
pub use imagevector::ImageVector;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Name of the cloud provider credentials Secret in a shoot namespace
pub const CLOUDPROVIDER_SECRET_NAME: &str = "cloudprovider";

/// Finalizer the machine controller keys on for credentials Secrets
pub const MACHINE_CONTROLLER_FINALIZER: &str = "machine.sapcloud.io/machine-controller";

/// Namespace of the shoot's kube-system components
pub const KUBE_SYSTEM_NAMESPACE: &str = "kube-system";
