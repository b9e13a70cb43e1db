//! Duros storage controller resource

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the Duros resource in a shoot namespace
pub const DUROS_RESOURCE_NAME: &str = "shoot-default-storage";

/// State of a managed resource that is healthy
pub const MANAGED_RESOURCE_STATE_RUNNING: &str = "Running";

/// Duros spec, only carried through
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "storage.metal-stack.io",
    version = "v1",
    kind = "Duros",
    namespaced,
    status = "DurosStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct DurosSpec {
    /// Fields not modelled here
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Observed state of the storage controller
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DurosStatus {
    /// Result of the last reconciliation
    #[serde(default)]
    pub reconcile_status: ReconcileStatus,
    /// States of the resources the controller deploys
    #[serde(default)]
    pub managed_resource_statuses: Vec<ManagedResourceStatus>,
}

/// Result of the last reconciliation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStatus {
    /// When the controller last reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile: Option<String>,
    /// Error of the last reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// State of one managed resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedResourceStatus {
    /// Resource name
    #[serde(default)]
    pub name: String,
    /// Resource group
    #[serde(default)]
    pub group: String,
    /// Resource kind
    #[serde(default)]
    pub kind: String,
    /// Resource state
    #[serde(default)]
    pub state: String,
    /// Description of the state
    #[serde(default)]
    pub description: String,
}
