//! Resource types of the host and of metal components
//!
//! These are consumer-side models: the extension never installs their CRDs.

mod cluster;
mod duros;
mod etcd;
mod extension;
mod firewall;
mod osc;
mod types;

pub use cluster::{
    CloudProfile, CloudProfileConfig, CloudProfileSpec, Cluster, ClusterSpec, ControlPlaneConfig,
    ControlPlaneFeatureGates, InfrastructureConfig, MetalControlPlane, NetworkIsolation,
    NetworkIsolationAllowedNetworks, Partition, RegistryMirror, Shoot, ShootKubernetes,
    ShootMetadata, ShootNetworking, ShootProvider, ShootSpec, NETWORKING_TYPE_CALICO,
};
pub use duros::{
    Duros, DurosSpec, DurosStatus, ManagedResourceStatus, ReconcileStatus, DUROS_RESOURCE_NAME,
    MANAGED_RESOURCE_STATE_RUNNING,
};
pub use etcd::{Etcd, EtcdBackupSpec, EtcdSpec, ETCD_EVENTS, ETCD_MAIN};
pub use extension::{
    extension_conditions, extension_type, ExtensionKind, EXTENSIONS_GROUP, EXTENSIONS_VERSION,
    PROVIDER_TYPE_METAL,
};
pub use firewall::{Firewall, FirewallSpec, FirewallStatus, FIREWALL_NAME, FIREWALL_NAMESPACE};
pub use osc::{
    ContainerdConfig, CriConfig, File, FileContent, FileContentInline, OperatingSystemConfig,
    OperatingSystemConfigSpec, RegistryCapability, RegistryConfig, RegistryHost, Unit,
    ENCODING_BASE64, KUBELET_CONFIG_PATH, KUBELET_UNIT_NAME,
};
pub use types::{
    merge_condition, Condition, ConditionStatus, SHOOT_CONTROL_PLANE_HEALTHY,
    SHOOT_EVERY_NODE_READY, SHOOT_SYSTEM_COMPONENTS_HEALTHY,
};
