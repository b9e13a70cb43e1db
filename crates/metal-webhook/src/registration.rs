//! MutatingWebhookConfiguration for the served webhooks

use std::sync::Arc;

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;

use crate::context::Mutator;

/// Where the host reaches the admission server
#[derive(Clone, Debug)]
pub struct WebhookEndpoint {
    /// Name of the configuration object
    pub name: String,
    /// Namespace of the Service in front of the server
    pub service_namespace: String,
    /// Name of the Service
    pub service_name: String,
    /// Service port
    pub port: i32,
    /// PEM bundle the API server uses to verify the serving certificate
    pub ca_bundle: Vec<u8>,
}

/// Build one webhook entry per mutator with rules for its kinds
pub fn mutating_webhook_configuration(
    endpoint: &WebhookEndpoint,
    mutators: &[Arc<dyn Mutator>],
) -> MutatingWebhookConfiguration {
    let webhooks = mutators
        .iter()
        .map(|m| MutatingWebhook {
            name: format!("{}.metal.extensions.gardener.cloud", m.name()),
            admission_review_versions: vec!["v1".to_string()],
            client_config: WebhookClientConfig {
                ca_bundle: Some(ByteString(endpoint.ca_bundle.clone())),
                service: Some(ServiceReference {
                    namespace: endpoint.service_namespace.clone(),
                    name: endpoint.service_name.clone(),
                    path: Some(format!("/webhooks/{}", m.name())),
                    port: Some(endpoint.port),
                }),
                url: None,
            },
            rules: Some(
                m.kinds()
                    .iter()
                    .map(|kind| {
                        let (group, version, resource) = kind.group_version_resource();
                        RuleWithOperations {
                            api_groups: Some(vec![group.to_string()]),
                            api_versions: Some(vec![version.to_string()]),
                            resources: Some(vec![resource.to_string()]),
                            operations: Some(vec!["CREATE".to_string(), "UPDATE".to_string()]),
                            scope: Some("Namespaced".to_string()),
                        }
                    })
                    .collect(),
            ),
            failure_policy: Some("Fail".to_string()),
            side_effects: "None".to_string(),
            timeout_seconds: Some(10),
            ..Default::default()
        })
        .collect();

    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(endpoint.name.clone()),
            ..Default::default()
        },
        webhooks: Some(webhooks),
    }
}
