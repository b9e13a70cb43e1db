//! Duros storage controller health

use async_trait::async_trait;
use kube::api::DynamicObject;

use metal_common::crd::{Duros, DUROS_RESOURCE_NAME, MANAGED_RESOURCE_STATE_RUNNING};
use metal_common::Result;

use crate::check::{CheckContext, HealthCheck};
use crate::types::HealthResult;

/// Checks the shoot's Duros resource on the seed
///
/// Shoots without Duros storage have no such resource and count as healthy.
#[derive(Clone, Debug, Default)]
pub struct DurosCheck;

#[async_trait]
impl HealthCheck for DurosCheck {
    fn name(&self) -> &str {
        "duros"
    }

    async fn check(&self, ctx: &CheckContext, _target: &DynamicObject) -> Result<HealthResult> {
        let duros = ctx
            .seed()
            .get_duros(ctx.namespace(), DUROS_RESOURCE_NAME)
            .await?;
        Ok(duros.as_ref().map(evaluate).unwrap_or_else(HealthResult::healthy))
    }
}

fn evaluate(duros: &Duros) -> HealthResult {
    let Some(status) = &duros.status else {
        return HealthResult::healthy();
    };

    let mut problems = Vec::new();
    if let Some(err) = status.reconcile_status.error.as_deref().filter(|e| !e.is_empty()) {
        problems.push(format!("reconcile error: {err}"));
    }
    for resource in &status.managed_resource_statuses {
        if resource.state != MANAGED_RESOURCE_STATE_RUNNING {
            problems.push(format!(
                "{} {} is {}",
                resource.kind, resource.name, resource.state
            ));
        }
    }

    if problems.is_empty() {
        HealthResult::healthy()
    } else {
        HealthResult::unhealthy(problems.join(", "))
    }
}
