//! Control plane exposure webhook
//!
//! Once the host's load balancer for the kube-apiserver Service has an
//! address, the apiserver advertises it. etcd gets the exposure context's
//! storage fallback.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use tracing::{debug, info};

use metal_common::Result;

use crate::context::{MutableObject, MutationContext, Mutator, ObjectKind};
use crate::controlplane::apiserver::KUBE_APISERVER;
use crate::ensure::{ensure_string_with_prefix, find_with_name_mut};
use crate::etcd::{old_etcd, EtcdPolicy};

/// Load balancer address of a Service, IP preferred over hostname
pub fn load_balancer_address(service: &Service) -> Option<&str> {
    service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_deref()?
        .iter()
        .find_map(|i| {
            i.ip
                .as_deref()
                .filter(|ip| !ip.is_empty())
                .or(i.hostname.as_deref().filter(|h| !h.is_empty()))
        })
}

/// Set the advertised address flags of the kube-apiserver container
pub fn apply_advertise_address(deployment: &mut Deployment, address: &str) -> bool {
    let Some(container) = deployment
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
        .and_then(|pod| find_with_name_mut(&mut pod.containers, KUBE_APISERVER))
    else {
        return false;
    };

    let command = container.command.get_or_insert_with(Vec::new);
    ensure_string_with_prefix(
        command,
        "--advertise-address=",
        &format!("--advertise-address={address}"),
    );
    ensure_string_with_prefix(
        command,
        "--external-hostname=",
        &format!("--external-hostname={address}"),
    );
    true
}

/// The `controlplaneexposure` webhook
#[derive(Clone, Debug, Default)]
pub struct ExposureMutator;

#[async_trait]
impl Mutator for ExposureMutator {
    fn name(&self) -> &'static str {
        "controlplaneexposure"
    }

    fn kinds(&self) -> &'static [ObjectKind] {
        &[ObjectKind::Deployment, ObjectKind::Etcd]
    }

    async fn mutate(
        &self,
        ctx: &MutationContext,
        new: &mut MutableObject,
        old: Option<&MutableObject>,
    ) -> Result<()> {
        match new {
            MutableObject::Deployment(d) if d.metadata.name.as_deref() == Some(KUBE_APISERVER) => {
                let service = ctx.seed().get_service(ctx.namespace(), KUBE_APISERVER).await?;
                let Some(address) = service.as_ref().and_then(load_balancer_address) else {
                    debug!(
                        namespace = ctx.namespace(),
                        "kube-apiserver service has no ingress yet"
                    );
                    return Ok(());
                };
                info!(namespace = ctx.namespace(), address, "Advertising load balancer address");
                if !apply_advertise_address(d, address) {
                    debug!("kube-apiserver container not found, skipping");
                }
                Ok(())
            }
            MutableObject::Etcd(etcd) => {
                EtcdPolicy::EXPOSURE.ensure(ctx.config(), etcd, old_etcd(old))
            }
            other => {
                debug!(
                    kind = %other.kind(),
                    name = other.name(),
                    "Not handled by exposure webhook"
                );
                Ok(())
            }
        }
    }
}
