//! kube-controller-manager Deployment of the shoot control plane

use k8s_openapi::api::apps::v1::Deployment;
use tracing::debug;

use metal_common::Result;

use super::{cloudprovider_checksum, ensure_checksum_annotation, CLOUD_PROVIDER_FLAG};
use crate::context::MutationContext;
use crate::ensure::{ensure_annotation_or_label, ensure_string_with_prefix, find_with_name_mut};

/// Name of the Deployment and of its main container
pub const KUBE_CONTROLLER_MANAGER: &str = "kube-controller-manager";

/// Network policy labels granting access to the metal API and the shoot's networks
pub const NETWORK_POLICY_LABELS: [&str; 3] = [
    "networking.gardener.cloud/to-public-networks",
    "networking.gardener.cloud/to-private-networks",
    "networking.gardener.cloud/to-blocked-cidrs",
];

const ALLOWED: &str = "allowed";

/// Mutate the kube-controller-manager Deployment
pub async fn ensure_kube_controller_manager(
    ctx: &MutationContext,
    deployment: &mut Deployment,
) -> Result<()> {
    let checksum = cloudprovider_checksum(ctx).await?;
    apply_kube_controller_manager(deployment, &checksum);
    Ok(())
}

/// Apply the cloud provider flag, network labels and checksum
pub fn apply_kube_controller_manager(deployment: &mut Deployment, checksum: &str) {
    let Some(spec) = deployment.spec.as_mut() else {
        return;
    };
    let Some(container) = spec
        .template
        .spec
        .as_mut()
        .and_then(|pod| find_with_name_mut(&mut pod.containers, KUBE_CONTROLLER_MANAGER))
    else {
        debug!("kube-controller-manager container not found, skipping");
        return;
    };

    ensure_string_with_prefix(
        container.command.get_or_insert_with(Vec::new),
        "--cloud-provider=",
        CLOUD_PROVIDER_FLAG,
    );

    let meta = spec.template.metadata.get_or_insert_with(Default::default);
    for label in NETWORK_POLICY_LABELS {
        ensure_annotation_or_label(&mut meta.labels, label, ALLOWED);
    }
    ensure_checksum_annotation(&mut spec.template, checksum);
}
