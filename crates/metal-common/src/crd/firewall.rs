//! Firewall resource reconciled by the firewall controller inside the shoot

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the firewall resource
pub const FIREWALL_NAME: &str = "firewall";

/// Namespace of the firewall resource in the shoot
pub const FIREWALL_NAMESPACE: &str = "firewall";

/// Firewall spec
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "metal-stack.io",
    version = "v1",
    kind = "Firewall",
    namespaced,
    status = "FirewallStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct FirewallSpec {
    /// Controller version the firewall should run
    #[serde(default)]
    pub controller_version: String,

    /// Fields not modelled here
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Firewall status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FirewallStatus {
    /// Controller version reported by the firewall; empty for old controllers
    #[serde(default)]
    pub controller_version: String,
}
