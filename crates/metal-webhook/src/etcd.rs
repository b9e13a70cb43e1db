//! etcd storage and backup settings
//!
//! Storage capacity and class of an etcd cannot change once its volume
//! exists, so updates always carry over the prior values. Backup settings
//! follow the configuration on every call.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::{debug, info};

use metal_common::config::{format_duration, parse_duration, ControllerConfiguration};
use metal_common::crd::{Etcd, ETCD_MAIN};
use metal_common::Result;

use crate::context::{MutableObject, MutationContext, Mutator, ObjectKind};

/// Capacity fallback in the seed provider context
pub const SEED_DEFAULT_CAPACITY: &str = "16Gi";

/// Capacity fallback in the control plane exposure context
pub const EXPOSURE_DEFAULT_CAPACITY: &str = "10Gi";

/// How etcd resources are defaulted in one webhook context
#[derive(Clone, Copy, Debug)]
pub struct EtcdPolicy {
    /// Capacity used when neither configuration nor prior object sets one
    pub default_capacity: &'static str,
}

impl EtcdPolicy {
    /// Policy of the seed provider webhook
    pub const SEED: Self = Self {
        default_capacity: SEED_DEFAULT_CAPACITY,
    };

    /// Policy of the control plane exposure webhook
    pub const EXPOSURE: Self = Self {
        default_capacity: EXPOSURE_DEFAULT_CAPACITY,
    };

    /// Apply storage and backup settings to `new`
    pub fn ensure(
        &self,
        config: &ControllerConfiguration,
        new: &mut Etcd,
        old: Option<&Etcd>,
    ) -> Result<()> {
        let is_main = new.metadata.name.as_deref() == Some(ETCD_MAIN);

        match old {
            Some(old) => {
                new.spec.storage_capacity = old.spec.storage_capacity.clone();
                new.spec.storage_class = old.spec.storage_class.clone();
                if new.spec.storage_capacity.is_none() && !is_main {
                    new.spec.storage_capacity = Some(Quantity(self.default_capacity.to_string()));
                }
            }
            None if is_main => {
                let storage = &config.etcd.storage;
                let capacity = storage.capacity.as_deref().unwrap_or(self.default_capacity);
                new.spec.storage_capacity = Some(Quantity(capacity.to_string()));
                if let Some(class) = &storage.class_name {
                    new.spec.storage_class = Some(class.clone());
                }
            }
            None => {
                if new.spec.storage_capacity.is_none() {
                    new.spec.storage_capacity = Some(Quantity(self.default_capacity.to_string()));
                }
            }
        }

        if is_main {
            let backup = &config.etcd.backup;
            if let Some(schedule) = &backup.schedule {
                new.spec.backup.get_or_insert_with(Default::default).full_snapshot_schedule =
                    Some(schedule.clone());
            }
            if let Some(raw) = &backup.delta_snapshot_period {
                let period = parse_duration("etcd.backup.deltaSnapshotPeriod", raw)?;
                new.spec.backup.get_or_insert_with(Default::default).delta_snapshot_period =
                    Some(format_duration(period));
            }
        }
        Ok(())
    }
}

/// Prior object of an update as an Etcd
pub(crate) fn old_etcd(old: Option<&MutableObject>) -> Option<&Etcd> {
    match old {
        Some(MutableObject::Etcd(e)) => Some(e),
        _ => None,
    }
}

/// The `seedprovider` webhook
#[derive(Clone, Debug, Default)]
pub struct SeedProviderMutator;

#[async_trait]
impl Mutator for SeedProviderMutator {
    fn name(&self) -> &'static str {
        "seedprovider"
    }

    fn kinds(&self) -> &'static [ObjectKind] {
        &[ObjectKind::Etcd]
    }

    async fn mutate(
        &self,
        ctx: &MutationContext,
        new: &mut MutableObject,
        old: Option<&MutableObject>,
    ) -> Result<()> {
        let MutableObject::Etcd(etcd) = new else {
            debug!(kind = %new.kind(), "Kind not handled by seedprovider webhook");
            return Ok(());
        };
        info!(namespace = ctx.namespace(), etcd = ?etcd.metadata.name, "Mutating etcd");
        EtcdPolicy::SEED.ensure(ctx.config(), etcd, old_etcd(old))
    }
}
