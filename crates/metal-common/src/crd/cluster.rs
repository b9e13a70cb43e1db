//! Cluster descriptor published by the host for every shoot
//!
//! The host stores the shoot, its cloud profile and its seed as raw objects in
//! a cluster-scoped `Cluster` resource named after the shoot's seed namespace.
//! Only the fields this extension reads are modelled; everything else is
//! ignored on decode.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Networking type that ships the metal load balancer
pub const NETWORKING_TYPE_CALICO: &str = "calico";

/// Raw descriptors of a shoot's surroundings
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "extensions.gardener.cloud",
    version = "v1alpha1",
    kind = "Cluster",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Raw cloud profile
    #[serde(default)]
    pub cloud_profile: serde_json::Value,
    /// Raw seed
    #[serde(default)]
    pub seed: serde_json::Value,
    /// Raw shoot
    #[serde(default)]
    pub shoot: serde_json::Value,
}

impl Cluster {
    /// Decode the shoot
    pub fn shoot(&self) -> Result<Shoot> {
        decode("spec.shoot", &self.spec.shoot)
    }

    /// Decode the cloud profile
    pub fn cloud_profile(&self) -> Result<CloudProfile> {
        decode("spec.cloudProfile", &self.spec.cloud_profile)
    }

    /// Registry mirrors configured for the shoot's partition
    ///
    /// Empty when the shoot has no partition or the partition has no network
    /// isolation.
    pub fn registry_mirrors(&self) -> Result<Vec<RegistryMirror>> {
        let shoot = self.shoot()?;
        let Some(partition_id) = shoot.infrastructure_config()?.partition_id else {
            return Ok(Vec::new());
        };
        let profile_config = self.cloud_profile()?.provider_config()?;

        Ok(profile_config
            .metal_control_planes
            .values()
            .find_map(|cp| cp.partitions.get(&partition_id))
            .and_then(|p| p.network_isolation.as_ref())
            .map(|n| n.registry_mirrors.clone())
            .unwrap_or_default())
    }
}

fn decode<T: DeserializeOwned + Default>(field: &str, value: &serde_json::Value) -> Result<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value.clone())
        .map_err(|e| Error::serialization_for_kind("Cluster", format!("{field}: {e}")))
}

/// Shoot as far as this extension reads it
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Shoot {
    /// Metadata
    #[serde(default)]
    pub metadata: ShootMetadata,
    /// Spec
    #[serde(default)]
    pub spec: ShootSpec,
}

/// Shoot metadata
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShootMetadata {
    /// Shoot name
    #[serde(default)]
    pub name: String,
    /// Project namespace
    #[serde(default)]
    pub namespace: String,
    /// Set while the shoot is being deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Shoot spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShootSpec {
    /// Kubernetes settings
    #[serde(default)]
    pub kubernetes: ShootKubernetes,
    /// Networking settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networking: Option<ShootNetworking>,
    /// Provider settings
    #[serde(default)]
    pub provider: ShootProvider,
}

/// Shoot kubernetes settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShootKubernetes {
    /// Kubernetes version
    #[serde(default)]
    pub version: String,
}

/// Shoot networking settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShootNetworking {
    /// Network plugin (e.g. calico, cilium)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Node CIDR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<String>,
}

/// Shoot provider settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShootProvider {
    /// Provider type
    #[serde(rename = "type", default)]
    pub type_: String,
    /// Raw infrastructure config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_config: Option<serde_json::Value>,
    /// Raw control plane config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_config: Option<serde_json::Value>,
}

impl Shoot {
    /// Networking type, if set
    pub fn networking_type(&self) -> Option<&str> {
        self.spec.networking.as_ref()?.type_.as_deref()
    }

    /// Whether the shoot is being deleted
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Decode the provider infrastructure config
    pub fn infrastructure_config(&self) -> Result<InfrastructureConfig> {
        match &self.spec.provider.infrastructure_config {
            Some(v) => decode("spec.provider.infrastructureConfig", v),
            None => Ok(InfrastructureConfig::default()),
        }
    }

    /// Decode the provider control plane config
    pub fn control_plane_config(&self) -> Result<ControlPlaneConfig> {
        match &self.spec.provider.control_plane_config {
            Some(v) => decode("spec.provider.controlPlaneConfig", v),
            None => Ok(ControlPlaneConfig::default()),
        }
    }
}

/// Metal infrastructure config of a shoot
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureConfig {
    /// Partition the shoot runs in
    #[serde(rename = "partitionID", default, skip_serializing_if = "Option::is_none")]
    pub partition_id: Option<String>,
    /// Project in the metal API
    #[serde(rename = "projectID", default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// Metal control plane config of a shoot
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneConfig {
    /// Optional features of the control plane
    #[serde(default)]
    pub feature_gates: ControlPlaneFeatureGates,
}

/// Per-shoot control plane features
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneFeatureGates {
    /// Deploy the audit-forwarder sidecar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_audit: Option<bool>,
    /// Forward audit logs to splunk as well
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_to_splunk: Option<bool>,
}

/// Cloud profile as far as this extension reads it
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudProfile {
    /// Spec
    #[serde(default)]
    pub spec: CloudProfileSpec,
}

/// Cloud profile spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudProfileSpec {
    /// Raw metal cloud profile config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_config: Option<serde_json::Value>,
}

impl CloudProfile {
    /// Decode the metal cloud profile config
    pub fn provider_config(&self) -> Result<CloudProfileConfig> {
        match &self.spec.provider_config {
            Some(v) => decode("spec.cloudProfile.spec.providerConfig", v),
            None => Ok(CloudProfileConfig::default()),
        }
    }
}

/// Metal cloud profile config
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudProfileConfig {
    /// Metal control planes keyed by name
    #[serde(default)]
    pub metal_control_planes: BTreeMap<String, MetalControlPlane>,
}

/// One metal control plane of the cloud profile
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetalControlPlane {
    /// Partitions keyed by partition ID
    #[serde(default)]
    pub partitions: BTreeMap<String, Partition>,
}

/// Partition settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    /// Network isolation for shoots in this partition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_isolation: Option<NetworkIsolation>,
}

/// Network isolation settings of a partition
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkIsolation {
    /// Networks reachable from isolated shoots
    #[serde(default)]
    pub allowed_networks: NetworkIsolationAllowedNetworks,
    /// Registry mirrors replacing public registries
    #[serde(default)]
    pub registry_mirrors: Vec<RegistryMirror>,
}

/// Networks reachable from isolated shoots
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkIsolationAllowedNetworks {
    /// Allowed ingress CIDRs
    #[serde(default)]
    pub ingress: Vec<String>,
    /// Allowed egress CIDRs
    #[serde(default)]
    pub egress: Vec<String>,
}

/// A registry mirror serving images of one or more upstream registries
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryMirror {
    /// Mirror name
    pub name: String,
    /// Mirror URL (e.g. https://registry-a)
    pub endpoint: String,
    /// Mirror IP
    #[serde(default)]
    pub ip: String,
    /// Mirror port
    #[serde(default)]
    pub port: i32,
    /// Upstream registries this mirror serves
    #[serde(default)]
    pub mirror_of: Vec<String>,
}
