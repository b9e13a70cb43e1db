//! etcd custom resource reconciled by the etcd operator
//!
//! Unknown fields are kept in `extra` maps so an object decoded here and
//! encoded again differs from the input only where a mutator changed it.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the main etcd of a shoot control plane
pub const ETCD_MAIN: &str = "etcd-main";

/// Name of the events etcd of a shoot control plane
pub const ETCD_EVENTS: &str = "etcd-events";

/// etcd cluster spec
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "druid.gardener.cloud",
    version = "v1alpha1",
    kind = "Etcd",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSpec {
    /// Size of the etcd volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_capacity: Option<Quantity>,

    /// Storage class of the etcd volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Backup settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<EtcdBackupSpec>,

    /// Fields not modelled here
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// etcd backup settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EtcdBackupSpec {
    /// Cron schedule of full snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_snapshot_schedule: Option<String>,

    /// Period between delta snapshots (e.g. "5m0s")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_snapshot_period: Option<String>,

    /// Fields not modelled here
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}
