//! Shoot-side webhook
//!
//! Registered for the vpn-shoot Deployment in the shoot's kube-system. It
//! only records that it saw the object and admits it unchanged.
// TODO: attach the node network to vpn-shoot once the env var contract with
// the VPN image is settled.

use async_trait::async_trait;
use tracing::{debug, info};

use metal_common::{Result, KUBE_SYSTEM_NAMESPACE};

use crate::context::{MutableObject, MutationContext, Mutator, ObjectKind};

/// Name of the shoot's VPN Deployment
pub const VPN_SHOOT: &str = "vpn-shoot";

/// The `shoot` webhook
#[derive(Clone, Debug, Default)]
pub struct ShootMutator;

#[async_trait]
impl Mutator for ShootMutator {
    fn name(&self) -> &'static str {
        "shoot"
    }

    fn kinds(&self) -> &'static [ObjectKind] {
        &[ObjectKind::Deployment]
    }

    async fn mutate(
        &self,
        ctx: &MutationContext,
        new: &mut MutableObject,
        _old: Option<&MutableObject>,
    ) -> Result<()> {
        match new {
            MutableObject::Deployment(d)
                if ctx.namespace() == KUBE_SYSTEM_NAMESPACE
                    && d.metadata.name.as_deref() == Some(VPN_SHOOT) =>
            {
                info!("Admitting vpn-shoot unchanged");
            }
            other => debug!(
                kind = %other.kind(),
                name = other.name(),
                "Not handled by shoot webhook"
            ),
        }
        Ok(())
    }
}
