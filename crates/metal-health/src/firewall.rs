//! Firewall controller version check

use async_trait::async_trait;
use kube::api::DynamicObject;

use metal_common::crd::{Firewall, FIREWALL_NAME, FIREWALL_NAMESPACE};
use metal_common::{Error, Result};

use crate::check::{CheckContext, HealthCheck};
use crate::types::HealthResult;

/// Compares the firewall controller version in the shoot with the desired one
#[derive(Clone, Debug)]
pub struct FirewallCheck {
    /// Treat a firewall that has not reported a version yet as healthy
    pub allow_unversioned: bool,
}

impl Default for FirewallCheck {
    fn default() -> Self {
        Self {
            allow_unversioned: true,
        }
    }
}

impl FirewallCheck {
    fn evaluate(&self, firewall: &Firewall) -> HealthResult {
        let desired = &firewall.spec.controller_version;
        let actual = firewall
            .status
            .as_ref()
            .map(|s| s.controller_version.as_str())
            .unwrap_or_default();

        if actual.is_empty() && self.allow_unversioned {
            return HealthResult::healthy();
        }
        if desired != actual {
            return HealthResult::unhealthy(format!(
                "firewall controller version skew: desired {desired:?}, running {actual:?}"
            ));
        }
        HealthResult::healthy()
    }
}

#[async_trait]
impl HealthCheck for FirewallCheck {
    fn name(&self) -> &str {
        "firewall"
    }

    async fn check(&self, ctx: &CheckContext, _target: &DynamicObject) -> Result<HealthResult> {
        let firewall = ctx
            .shoot()
            .await?
            .get_firewall(FIREWALL_NAMESPACE, FIREWALL_NAME)
            .await?
            .ok_or_else(|| {
                Error::not_found("firewall", format!("{FIREWALL_NAMESPACE}/{FIREWALL_NAME}"))
            })?;
        Ok(self.evaluate(&firewall))
    }
}
