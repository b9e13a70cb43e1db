//! metallb configuration health

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::DynamicObject;

use metal_common::Result;

use crate::check::{CheckContext, HealthCheck};
use crate::types::HealthResult;

/// Namespace of the load balancer in the shoot
pub const METALLB_NAMESPACE: &str = "metallb-system";

/// ConfigMap the load balancer reports its config state in
pub const METALLB_HEALTH_CONFIG_MAP: &str = "health";

/// Reads the load balancer's config state from the shoot
#[derive(Clone, Debug, Default)]
pub struct LoadBalancerCheck;

#[async_trait]
impl HealthCheck for LoadBalancerCheck {
    fn name(&self) -> &str {
        "loadbalancer"
    }

    async fn check(&self, ctx: &CheckContext, _target: &DynamicObject) -> Result<HealthResult> {
        let health = ctx
            .shoot()
            .await?
            .get_config_map(METALLB_NAMESPACE, METALLB_HEALTH_CONFIG_MAP)
            .await?;
        Ok(evaluate(health.as_ref()))
    }
}

fn evaluate(health: Option<&ConfigMap>) -> HealthResult {
    let flag = |key: &str| {
        health
            .and_then(|cm| cm.data.as_ref())
            .and_then(|d| d.get(key))
            .is_some_and(|v| v == "1")
    };

    if !flag("configLoaded") {
        HealthResult::unhealthy("load balancer config not loaded")
    } else if flag("configStale") {
        HealthResult::unhealthy("load balancer config is stale or erroneous")
    } else {
        HealthResult::healthy()
    }
}
