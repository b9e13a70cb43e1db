//! Controller configuration
//!
//! The configuration is a versioned YAML document read once at process start.
//! After [`ControllerConfiguration::load`] returns, the value is shared behind
//! an `Arc` and never mutated.
//!
//! ```yaml
//! apiVersion: metal.provider.extensions.config.gardener.cloud/v1alpha1
//! kind: ControllerConfiguration
//! machineImages:
//!   - name: ubuntu
//!     version: "24.04"
//!     image: ubuntu-24.04
//! etcd:
//!   storage:
//!     className: premium
//!     capacity: 20Gi
//!   backup:
//!     schedule: "0 */24 * * *"
//!     deltaSnapshotPeriod: 5m
//! auth:
//!   enabled: true
//!   providerTenant: metal
//! clusterAudit:
//!   enabled: true
//! imagePullPolicy: IfNotPresent
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crd::ControlPlaneFeatureGates;
use crate::{Error, Result};

/// API version of the configuration document
pub const CONFIG_API_VERSION: &str = "metal.provider.extensions.config.gardener.cloud/v1alpha1";

/// Kind of the configuration document
pub const CONFIG_KIND: &str = "ControllerConfiguration";

/// Sync period used by health checks when none is configured
pub const DEFAULT_HEALTH_SYNC_PERIOD: Duration = Duration::from_secs(30);

/// Process-wide configuration of the metal extension
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ControllerConfiguration {
    /// Must be [`CONFIG_API_VERSION`]
    #[serde(default)]
    pub api_version: String,

    /// Must be [`CONFIG_KIND`]
    #[serde(default)]
    pub kind: String,

    /// Machine image table; `(name, version)` is unique
    #[serde(default)]
    pub machine_images: Vec<MachineImage>,

    /// etcd sizing and backup policy
    #[serde(default)]
    pub etcd: EtcdConfig,

    /// Authentication webhook wiring
    #[serde(default)]
    pub auth: AuthConfig,

    /// Cluster audit (audit-forwarder sidecar)
    #[serde(default)]
    pub cluster_audit: ClusterAuditConfig,

    /// Splunk variant of the cluster audit
    #[serde(default)]
    pub audit_to_splunk: AuditToSplunkConfig,

    /// Storage backends
    #[serde(default)]
    pub storage: StorageConfig,

    /// Networks considered internal by the firewall
    #[serde(default)]
    pub firewall_internal_prefixes: Vec<String>,

    /// Pull policy for images injected by the extension
    #[serde(default)]
    pub image_pull_policy: ImagePullPolicy,

    /// Optional pull secret for injected images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secret: Option<ImagePullSecret>,

    /// Health check tuning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_config: Option<HealthCheckConfig>,
}

/// One row of the machine image table
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MachineImage {
    /// Logical image name (e.g. "ubuntu")
    pub name: String,
    /// Image version
    pub version: String,
    /// Concrete image reference
    pub image: String,
}

/// etcd configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EtcdConfig {
    /// Volume settings for etcd-main
    #[serde(default)]
    pub storage: EtcdStorage,
    /// Backup cadence
    #[serde(default)]
    pub backup: EtcdBackup,
}

/// etcd volume settings; absence means "inherit default"
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EtcdStorage {
    /// Storage class of the etcd volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Volume size, as a Kubernetes quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,
}

/// etcd backup settings; absence means "inherit default"
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EtcdBackup {
    /// Cron schedule of full snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Period between delta snapshots (e.g. "5m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_snapshot_period: Option<String>,
}

/// Authentication webhook settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuthConfig {
    /// Wire the kube-apiserver to the token authentication webhook
    #[serde(default)]
    pub enabled: bool,
    /// Tenant of the provider operating the seed
    #[serde(default)]
    pub provider_tenant: String,
}

/// Cluster audit settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClusterAuditConfig {
    /// Allow shoots to enable the audit-forwarder sidecar
    #[serde(default)]
    pub enabled: bool,
}

/// Splunk audit settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuditToSplunkConfig {
    /// Allow shoots to additionally forward audit logs to splunk
    #[serde(default)]
    pub enabled: bool,
    /// HEC token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hec_token: Option<String>,
    /// Splunk index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    /// HEC host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hec_host: Option<String>,
    /// HEC port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hec_port: Option<u16>,
    /// Use TLS towards the HEC endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_enabled: Option<bool>,
    /// CA bundle of the HEC endpoint
    #[serde(default, rename = "hecCAFile", skip_serializing_if = "Option::is_none")]
    pub hec_ca_file: Option<String>,
}

/// Storage backend settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StorageConfig {
    /// Duros block storage
    #[serde(default)]
    pub duros: DurosConfig,
}

/// Duros block storage settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DurosConfig {
    /// Deploy the storage controller for shoots
    #[serde(default)]
    pub enabled: bool,
    /// Per-partition storage settings keyed by partition ID
    #[serde(default)]
    pub partition_config: BTreeMap<String, DurosPartitionConfig>,
}

/// Duros settings for one partition
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DurosPartitionConfig {
    /// Storage endpoints
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Admin key used to sign tokens
    #[serde(default)]
    pub admin_key: String,
    /// Admin token
    #[serde(default)]
    pub admin_token: String,
    /// API endpoint of the storage controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
    /// CA for the API endpoint
    #[serde(default, rename = "apiCA", skip_serializing_if = "Option::is_none")]
    pub api_ca: Option<String>,
    /// Client certificate for the API endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_cert: Option<String>,
    /// Client key for the API endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Storage classes offered in this partition
    #[serde(default)]
    pub storage_classes: Vec<DurosStorageClass>,
}

/// Storage class offered by Duros
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DurosStorageClass {
    /// Storage class name
    pub name: String,
    /// Number of replicas
    #[serde(default)]
    pub replica_count: i32,
    /// Enable compression
    #[serde(default)]
    pub compression: bool,
}

/// Image pull policy for injected containers
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ImagePullPolicy {
    /// Always pull
    Always,
    /// Pull only if the image is missing on the node
    #[default]
    IfNotPresent,
    /// Never pull
    Never,
}

impl ImagePullPolicy {
    /// The Kubernetes spelling of the policy
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "Always",
            Self::IfNotPresent => "IfNotPresent",
            Self::Never => "Never",
        }
    }
}

impl std::fmt::Display for ImagePullPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pull secret for injected images
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ImagePullSecret {
    /// base64-encoded docker config JSON
    #[serde(rename = "dockerconfigjson")]
    pub docker_config_json: String,
}

impl ImagePullSecret {
    /// Decode the docker config JSON
    pub fn decode(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(self.docker_config_json.trim())
            .map_err(|e| {
                Error::invalid_config_field("imagePullSecret.dockerconfigjson", e.to_string())
            })
    }
}

/// Health check settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HealthCheckConfig {
    /// Period between health check rounds (e.g. "30s")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_period: Option<String>,
}

impl ControllerConfiguration {
    /// Read, decode and validate the configuration file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&raw)?;
        debug!(path = %path.display(), "Loaded controller configuration");
        Ok(config)
    }

    /// Decode and validate a configuration document
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(raw).map_err(|e| Error::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.api_version != CONFIG_API_VERSION {
            return Err(Error::invalid_config_field(
                "apiVersion",
                format!("expected {CONFIG_API_VERSION}, got {:?}", self.api_version),
            ));
        }
        if self.kind != CONFIG_KIND {
            return Err(Error::invalid_config_field(
                "kind",
                format!("expected {CONFIG_KIND}, got {:?}", self.kind),
            ));
        }

        let mut seen = HashSet::new();
        for (i, image) in self.machine_images.iter().enumerate() {
            if !seen.insert((image.name.as_str(), image.version.as_str())) {
                return Err(Error::invalid_config_field(
                    format!("machineImages[{i}]"),
                    format!("duplicate image {} {}", image.name, image.version),
                ));
            }
        }

        self.delta_snapshot_period()?;
        self.health_sync_period()?;

        for (i, prefix) in self.firewall_internal_prefixes.iter().enumerate() {
            prefix.parse::<ipnet::IpNet>().map_err(|e| {
                Error::invalid_config_field(
                    format!("firewallInternalPrefixes[{i}]"),
                    format!("{prefix:?} is not a CIDR: {e}"),
                )
            })?;
        }

        if let Some(secret) = &self.image_pull_secret {
            secret.decode()?;
        }

        Ok(())
    }

    /// The configured delta snapshot period, if any
    pub fn delta_snapshot_period(&self) -> Result<Option<Duration>> {
        self.etcd
            .backup
            .delta_snapshot_period
            .as_deref()
            .map(|raw| parse_duration("etcd.backup.deltaSnapshotPeriod", raw))
            .transpose()
    }

    /// The health check sync period, defaulting to 30s
    pub fn health_sync_period(&self) -> Result<Duration> {
        match self
            .health_check_config
            .as_ref()
            .and_then(|c| c.sync_period.as_deref())
        {
            Some(raw) => parse_duration("healthCheckConfig.syncPeriod", raw),
            None => Ok(DEFAULT_HEALTH_SYNC_PERIOD),
        }
    }

    /// Whether the audit-forwarder is active for a shoot with these feature gates
    pub fn cluster_audit_enabled(&self, gates: &ControlPlaneFeatureGates) -> bool {
        self.cluster_audit.enabled && gates.cluster_audit.unwrap_or(false)
    }

    /// Whether audit logs are additionally forwarded to splunk
    pub fn audit_to_splunk_enabled(&self, gates: &ControlPlaneFeatureGates) -> bool {
        self.cluster_audit_enabled(gates)
            && self.audit_to_splunk.enabled
            && gates.audit_to_splunk.unwrap_or(false)
    }
}

/// Parse a duration string like `5m` or `1h30m`
pub fn parse_duration(field: &str, raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| Error::invalid_config_field(field, format!("{raw:?} is not a duration: {e}")))
}

/// Render a duration the way Kubernetes serializes `metav1.Duration`
///
/// `5m` becomes `5m0s`, `1h` becomes `1h0m0s`, `90s` becomes `1m30s`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let nanos = d.subsec_nanos();

    if secs == 0 {
        return match nanos {
            0 => "0s".to_string(),
            n if n % 1_000_000 == 0 => format!("{}ms", n / 1_000_000),
            n if n % 1_000 == 0 => format!("{}µs", n / 1_000),
            n => format!("{n}ns"),
        };
    }

    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if nanos == 0 {
        out.push_str(&format!("{seconds}s"));
    } else {
        let frac = format!("{nanos:09}");
        out.push_str(&format!("{seconds}.{}s", frac.trim_end_matches('0')));
    }
    out
}
