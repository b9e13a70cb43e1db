//! Which checks feed which condition of which extension kind

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use metal_common::crd::{
    Cluster, ExtensionKind, NETWORKING_TYPE_CALICO, SHOOT_CONTROL_PLANE_HEALTHY,
    SHOOT_EVERY_NODE_READY, SHOOT_SYSTEM_COMPONENTS_HEALTHY,
};
use metal_common::{ControllerConfiguration, Error, Result};

use crate::check::{HealthCheck, PreCheck};
use crate::deployment::SeedDeploymentCheck;
use crate::duros::DurosCheck;
use crate::firewall::FirewallCheck;
use crate::loadbalancer::LoadBalancerCheck;
use crate::nodes::NodesCheck;

/// Cloud controller manager Deployment on the seed
pub const CLOUD_CONTROLLER_MANAGER: &str = "cloud-controller-manager";

/// Machine controller manager Deployment on the seed
pub const MACHINE_CONTROLLER_MANAGER: &str = "machine-controller-manager";

/// One check contributing to one condition of one extension kind
#[derive(Clone)]
pub struct HealthRegistration {
    /// Extension kind the condition is published on
    pub kind: ExtensionKind,
    /// Condition type
    pub condition: &'static str,
    /// The evaluator
    pub check: Arc<dyn HealthCheck>,
    /// Optional gate; a gated-out check counts as healthy
    pub pre_check: Option<PreCheck>,
}

impl HealthRegistration {
    /// Register `check` without a gate
    pub fn new(
        kind: ExtensionKind,
        condition: &'static str,
        check: impl HealthCheck + 'static,
    ) -> Self {
        Self {
            kind,
            condition,
            check: Arc::new(check),
            pre_check: None,
        }
    }

    /// Gate the check
    pub fn with_pre_check(
        mut self,
        pre_check: impl Fn(&ControllerConfiguration, &Cluster) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.pre_check = Some(Arc::new(pre_check));
        self
    }

    /// Whether the check applies to this shoot
    pub fn applies(&self, config: &ControllerConfiguration, cluster: &Cluster) -> bool {
        self.pre_check
            .as_ref()
            .map_or(true, |pre_check| pre_check(config, cluster))
    }
}

impl fmt::Debug for HealthRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthRegistration")
            .field("kind", &self.kind)
            .field("condition", &self.condition)
            .field("check", &self.check.name())
            .field("pre_check", &self.pre_check.is_some())
            .finish()
    }
}

fn duros_enabled(config: &ControllerConfiguration, _cluster: &Cluster) -> bool {
    config.storage.duros.enabled
}

fn calico_networking(_config: &ControllerConfiguration, cluster: &Cluster) -> bool {
    cluster
        .shoot()
        .is_ok_and(|shoot| shoot.networking_type() == Some(NETWORKING_TYPE_CALICO))
}

/// The checks this extension runs
pub fn default_registrations() -> Vec<HealthRegistration> {
    vec![
        HealthRegistration::new(
            ExtensionKind::ControlPlane,
            SHOOT_CONTROL_PLANE_HEALTHY,
            SeedDeploymentCheck::new(CLOUD_CONTROLLER_MANAGER),
        ),
        HealthRegistration::new(
            ExtensionKind::ControlPlane,
            SHOOT_SYSTEM_COMPONENTS_HEALTHY,
            DurosCheck,
        )
        .with_pre_check(duros_enabled),
        HealthRegistration::new(
            ExtensionKind::ControlPlane,
            SHOOT_SYSTEM_COMPONENTS_HEALTHY,
            LoadBalancerCheck,
        )
        .with_pre_check(calico_networking),
        HealthRegistration::new(
            ExtensionKind::Infrastructure,
            SHOOT_SYSTEM_COMPONENTS_HEALTHY,
            FirewallCheck::default(),
        ),
        HealthRegistration::new(
            ExtensionKind::Worker,
            SHOOT_CONTROL_PLANE_HEALTHY,
            SeedDeploymentCheck::new(MACHINE_CONTROLLER_MANAGER),
        ),
        HealthRegistration::new(ExtensionKind::Worker, SHOOT_EVERY_NODE_READY, NodesCheck),
    ]
}

/// Reject a table registering the same check twice for one condition
pub fn validate_registrations(registrations: &[HealthRegistration]) -> Result<()> {
    let mut seen = HashSet::new();
    for r in registrations {
        if !seen.insert((r.kind, r.condition, r.check.name())) {
            return Err(Error::invalid_config(format!(
                "health check {} registered twice for {} {}",
                r.check.name(),
                r.kind,
                r.condition
            )));
        }
    }
    Ok(())
}

/// Condition types of a kind in registration order, without repeats
pub fn conditions_of(
    registrations: &[HealthRegistration],
    kind: ExtensionKind,
) -> Vec<&'static str> {
    let mut conditions: Vec<&'static str> = Vec::new();
    for r in registrations.iter().filter(|r| r.kind == kind) {
        if !conditions.contains(&r.condition) {
            conditions.push(r.condition);
        }
    }
    conditions
}
