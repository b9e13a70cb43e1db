//! Availability of control plane Deployments on the seed

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::DynamicObject;

use metal_common::Result;

use crate::check::{CheckContext, HealthCheck};
use crate::types::HealthResult;

/// Checks that a Deployment in the shoot namespace is fully available
#[derive(Clone, Debug)]
pub struct SeedDeploymentCheck {
    name: &'static str,
}

impl SeedDeploymentCheck {
    /// Check the Deployment called `name`
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl HealthCheck for SeedDeploymentCheck {
    fn name(&self) -> &str {
        self.name
    }

    async fn check(&self, ctx: &CheckContext, _target: &DynamicObject) -> Result<HealthResult> {
        let deployment = ctx.seed().get_deployment(ctx.namespace(), self.name).await?;
        Ok(match deployment {
            Some(d) => evaluate(self.name, &d),
            None => HealthResult::unhealthy(format!("deployment {} is missing", self.name)),
        })
    }
}

fn evaluate(name: &str, deployment: &Deployment) -> HealthResult {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let status = deployment.status.as_ref();
    let available = status.and_then(|s| s.available_replicas).unwrap_or(0);

    let unavailable = status
        .and_then(|s| s.conditions.as_ref())
        .into_iter()
        .flatten()
        .find(|c| c.type_ == "Available" && c.status == "False");
    if let Some(condition) = unavailable {
        return HealthResult::unhealthy(format!(
            "deployment {name} is unavailable: {}",
            condition.message.as_deref().unwrap_or_default()
        ));
    }

    if available < desired {
        return HealthResult::unhealthy(format!(
            "deployment {name} has {available}/{desired} replicas available"
        ));
    }
    HealthResult::healthy()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::test_support::*;
    use crate::shoot_client::MockShootClientFactory;
    use crate::types::HealthStatus;
    use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentSpec, DeploymentStatus};
    use metal_common::client::MockSeedClient;
    use rstest::rstest;

    fn deployment(replicas: i32, available: i32, available_condition: Option<&str>) -> Deployment {
        Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                available_replicas: Some(available),
                conditions: available_condition.map(|status| {
                    vec![DeploymentCondition {
                        type_: "Available".to_string(),
                        status: status.to_string(),
                        message: Some("minimum replicas unavailable".to_string()),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(deployment(2, 2, Some("True")), HealthStatus::True)]
    #[case(deployment(1, 1, None), HealthStatus::True)]
    #[case(deployment(2, 1, Some("True")), HealthStatus::False)]
    #[case(deployment(1, 1, Some("False")), HealthStatus::False)]
    #[case(deployment(0, 0, None), HealthStatus::True)]
    fn availability(#[case] d: Deployment, #[case] expected: HealthStatus) {
        assert_eq!(evaluate("cloud-controller-manager", &d).status, expected);
    }

    #[tokio::test]
    async fn missing_deployment_is_unhealthy() {
        let mut seed = MockSeedClient::new();
        seed.expect_get_deployment()
            .withf(|ns, name| ns == NAMESPACE && name == "machine-controller-manager")
            .returning(|_, _| Ok(None));
        let ctx = context(seed, MockShootClientFactory::new());

        let result = SeedDeploymentCheck::new("machine-controller-manager")
            .check(&ctx, &target())
            .await
            .unwrap();
        assert_eq!(result.status, HealthStatus::False);
        assert!(result.detail.unwrap().contains("missing"));
    }
}
