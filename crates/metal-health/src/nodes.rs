//! Node readiness in the shoot

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::DynamicObject;
use kube::ResourceExt;

use metal_common::Result;

use crate::check::{CheckContext, HealthCheck};
use crate::types::HealthResult;

/// Every node of the shoot must report `Ready=True`
#[derive(Clone, Debug, Default)]
pub struct NodesCheck;

#[async_trait]
impl HealthCheck for NodesCheck {
    fn name(&self) -> &str {
        "nodes"
    }

    async fn check(&self, ctx: &CheckContext, _target: &DynamicObject) -> Result<HealthResult> {
        let nodes = ctx.shoot().await?.list_nodes().await?;
        Ok(evaluate(&nodes))
    }
}

fn is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .into_iter()
        .flatten()
        .any(|c| c.type_ == "Ready" && c.status == "True")
}

fn evaluate(nodes: &[Node]) -> HealthResult {
    let not_ready: Vec<String> = nodes
        .iter()
        .filter(|n| !is_ready(n))
        .map(|n| n.name_any())
        .collect();

    if not_ready.is_empty() {
        HealthResult::healthy()
    } else {
        HealthResult::unhealthy(format!("nodes not ready: {}", not_ready.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::test_support::*;
    use crate::shoot_client::MockShootClient;
    use crate::types::HealthStatus;
    use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use metal_common::client::MockSeedClient;

    fn node(name: &str, ready: Option<&str>) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                conditions: ready.map(|status| {
                    vec![NodeCondition {
                        type_: "Ready".to_string(),
                        status: status.to_string(),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn empty_shoot_is_ready() {
        assert!(evaluate(&[]).is_healthy());
    }

    #[test]
    fn names_every_node_that_is_not_ready() {
        let result = evaluate(&[
            node("worker-a", Some("True")),
            node("worker-b", Some("False")),
            node("worker-c", Some("Unknown")),
            node("worker-d", None),
        ]);
        assert_eq!(result.status, HealthStatus::False);
        assert_eq!(
            result.detail.as_deref(),
            Some("nodes not ready: worker-b, worker-c, worker-d")
        );
    }

    #[tokio::test]
    async fn lists_nodes_in_shoot() {
        let mut shoot = MockShootClient::new();
        shoot
            .expect_list_nodes()
            .returning(|| Ok(vec![node("worker-a", Some("True"))]));
        let ctx = context(MockSeedClient::new(), factory(shoot));

        assert!(NodesCheck.check(&ctx, &target()).await.unwrap().is_healthy());
    }
}
