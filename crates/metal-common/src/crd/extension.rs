//! Extension resources whose health this extension reports
//!
//! The host owns these resources; this extension only reads `spec.type` and
//! writes `status.conditions`, so they are accessed as dynamic objects.

use kube::api::{ApiResource, DynamicObject, GroupVersionKind};

use super::types::Condition;
use crate::{Error, Result};

/// API group of the extension resources
pub const EXTENSIONS_GROUP: &str = "extensions.gardener.cloud";

/// API version of the extension resources
pub const EXTENSIONS_VERSION: &str = "v1alpha1";

/// Provider type handled by this extension
pub const PROVIDER_TYPE_METAL: &str = "metal";

/// Extension resource kinds with health checks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtensionKind {
    /// ControlPlane
    ControlPlane,
    /// Infrastructure
    Infrastructure,
    /// Worker
    Worker,
}

impl ExtensionKind {
    /// All kinds, in reconciliation order
    pub const ALL: [ExtensionKind; 3] = [Self::ControlPlane, Self::Infrastructure, Self::Worker];

    /// Kind name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ControlPlane => "ControlPlane",
            Self::Infrastructure => "Infrastructure",
            Self::Worker => "Worker",
        }
    }

    /// Resource plural
    pub fn plural(&self) -> &'static str {
        match self {
            Self::ControlPlane => "controlplanes",
            Self::Infrastructure => "infrastructures",
            Self::Worker => "workers",
        }
    }

    /// API resource for dynamic access
    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(EXTENSIONS_GROUP, EXTENSIONS_VERSION, self.kind()),
            self.plural(),
        )
    }
}

impl std::fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// `spec.type` of an extension object
pub fn extension_type(obj: &DynamicObject) -> Option<&str> {
    obj.data.get("spec")?.get("type")?.as_str()
}

/// `status.conditions` of an extension object
pub fn extension_conditions(obj: &DynamicObject) -> Result<Vec<Condition>> {
    match obj.data.get("status").and_then(|s| s.get("conditions")) {
        Some(raw) if !raw.is_null() => serde_json::from_value(raw.clone())
            .map_err(|e| Error::serialization_for_kind("Condition", e.to_string())),
        _ => Ok(Vec::new()),
    }
}
