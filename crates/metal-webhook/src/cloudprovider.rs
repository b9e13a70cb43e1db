//! Cloud provider credentials secret webhook
//!
//! The machine controller must be able to use the credentials until all
//! machines are gone, so the secret carries exactly its finalizer.

use async_trait::async_trait;
use tracing::{debug, info};

use metal_common::{Result, MACHINE_CONTROLLER_FINALIZER};

use crate::context::{MutableObject, MutationContext, Mutator, ObjectKind};

/// The `cloudprovider` webhook
#[derive(Clone, Debug, Default)]
pub struct CloudProviderSecretMutator;

#[async_trait]
impl Mutator for CloudProviderSecretMutator {
    fn name(&self) -> &'static str {
        "cloudprovider"
    }

    fn kinds(&self) -> &'static [ObjectKind] {
        &[ObjectKind::Secret]
    }

    async fn mutate(
        &self,
        ctx: &MutationContext,
        new: &mut MutableObject,
        _old: Option<&MutableObject>,
    ) -> Result<()> {
        let MutableObject::Secret(secret) = new else {
            debug!(kind = %new.kind(), "Kind not handled by cloudprovider webhook");
            return Ok(());
        };
        info!(
            namespace = ctx.namespace(),
            secret = ?secret.metadata.name,
            "Setting machine controller finalizer"
        );
        secret.metadata.finalizers = Some(vec![MACHINE_CONTROLLER_FINALIZER.to_string()]);
        Ok(())
    }
}
