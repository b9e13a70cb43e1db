//! Control plane webhook
//!
//! Adjusts the shoot control plane components the host renders into the seed
//! (kube-apiserver, kube-controller-manager) and the worker
//! OperatingSystemConfig so that they cooperate with the metal cloud
//! controller manager, the token authentication webhook and audit forwarding.

pub mod apiserver;
pub mod audit;
pub mod containerd;
pub mod controller_manager;
pub mod konnectivity;
pub mod kubelet;
pub mod osc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PodTemplateSpec;
use tracing::{debug, info};

use metal_common::kube_utils::secret_checksum;
use metal_common::{Error, Result, CLOUDPROVIDER_SECRET_NAME};

use crate::context::{MutableObject, MutationContext, Mutator, ObjectKind};
use crate::ensure::ensure_annotation_or_label;

/// Cloud provider flag of control plane components and the kubelet
pub const CLOUD_PROVIDER_FLAG: &str = "--cloud-provider=external";

/// Pod annotation rolling components on credential changes
pub const CHECKSUM_ANNOTATION: &str = "checksum/secret-cloudprovider";

/// Checksum of the cloudprovider secret in the context namespace
pub(crate) async fn cloudprovider_checksum(ctx: &MutationContext) -> Result<String> {
    let secret = ctx
        .seed()
        .get_secret(ctx.namespace(), CLOUDPROVIDER_SECRET_NAME)
        .await?
        .ok_or_else(|| {
            Error::not_found(
                "secret",
                format!("{}/{}", ctx.namespace(), CLOUDPROVIDER_SECRET_NAME),
            )
        })?;
    Ok(secret_checksum(&secret))
}

pub(crate) fn ensure_checksum_annotation(template: &mut PodTemplateSpec, checksum: &str) {
    let meta = template.metadata.get_or_insert_with(Default::default);
    ensure_annotation_or_label(&mut meta.annotations, CHECKSUM_ANNOTATION, checksum);
}

/// The `controlplane` webhook
#[derive(Clone, Debug, Default)]
pub struct ControlPlaneMutator;

#[async_trait]
impl Mutator for ControlPlaneMutator {
    fn name(&self) -> &'static str {
        "controlplane"
    }

    fn kinds(&self) -> &'static [ObjectKind] {
        &[ObjectKind::Deployment, ObjectKind::OperatingSystemConfig]
    }

    async fn mutate(
        &self,
        ctx: &MutationContext,
        new: &mut MutableObject,
        _old: Option<&MutableObject>,
    ) -> Result<()> {
        match new {
            MutableObject::Deployment(d) => match d.metadata.name.clone().as_deref() {
                Some(apiserver::KUBE_APISERVER) => {
                    info!(namespace = ctx.namespace(), "Mutating kube-apiserver");
                    apiserver::ensure_kube_apiserver(ctx, d).await
                }
                Some(controller_manager::KUBE_CONTROLLER_MANAGER) => {
                    info!(namespace = ctx.namespace(), "Mutating kube-controller-manager");
                    controller_manager::ensure_kube_controller_manager(ctx, d).await
                }
                other => {
                    debug!(name = ?other, "Deployment not handled by controlplane webhook");
                    Ok(())
                }
            },
            MutableObject::OperatingSystemConfig(config) => {
                let mirrors = match ctx.cluster().await? {
                    Some(cluster) => cluster.registry_mirrors()?,
                    None => Vec::new(),
                };
                info!(
                    namespace = ctx.namespace(),
                    osc = ?config.metadata.name,
                    mirrors = mirrors.len(),
                    "Mutating operating system config"
                );
                osc::ensure_operating_system_config(config, &mirrors)
            }
            other => {
                debug!(kind = %other.kind(), "Kind not handled by controlplane webhook");
                Ok(())
            }
        }
    }
}
