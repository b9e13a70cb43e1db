//! Periodic health evaluation of extension resources
//!
//! One task per extension kind lists the kind's metal resources every sync
//! period, evaluates their registered checks and publishes one condition per
//! condition type into `status.conditions`. Resources of a kind are evaluated
//! concurrently; a round finishes before the next one starts, so a resource
//! is never evaluated twice at once.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use kube::api::DynamicObject;
use kube::ResourceExt;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use metal_common::client::SeedClient;
use metal_common::crd::{
    extension_conditions, extension_type, merge_condition, Condition, ExtensionKind,
    PROVIDER_TYPE_METAL,
};
use metal_common::{ControllerConfiguration, Result};

use crate::check::CheckContext;
use crate::registry::{conditions_of, validate_registrations, HealthRegistration};
use crate::shoot_client::ShootClientFactory;
use crate::types::{reduce, to_condition, HealthResult};

/// Runs the registered checks and publishes their conditions
pub struct HealthAggregator {
    config: Arc<ControllerConfiguration>,
    seed: Arc<dyn SeedClient>,
    shoot_factory: Arc<dyn ShootClientFactory>,
    registrations: Vec<HealthRegistration>,
    period: Duration,
}

impl HealthAggregator {
    /// Create an aggregator over a validated registration table
    pub fn new(
        config: Arc<ControllerConfiguration>,
        seed: Arc<dyn SeedClient>,
        shoot_factory: Arc<dyn ShootClientFactory>,
        registrations: Vec<HealthRegistration>,
    ) -> Result<Self> {
        validate_registrations(&registrations)?;
        let period = config.health_sync_period()?;
        Ok(Self {
            config,
            seed,
            shoot_factory,
            registrations,
            period,
        })
    }

    /// Time between two rounds of a kind
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Extension kinds with at least one registered check
    pub fn kinds(&self) -> Vec<ExtensionKind> {
        ExtensionKind::ALL
            .into_iter()
            .filter(|k| self.registrations.iter().any(|r| r.kind == *k))
            .collect()
    }

    /// Run one loop per kind until `cancel` fires
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let tasks: Vec<_> = self
            .kinds()
            .into_iter()
            .map(|kind| {
                let aggregator = self.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { aggregator.run_kind(kind, cancel).await })
            })
            .collect();

        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!(error = %e, "Health check task panicked");
            }
        }
    }

    async fn run_kind(&self, kind: ExtensionKind, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(kind = %kind, period = ?self.period, "Health checks started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(kind = %kind, "Health checks stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_kind(kind, &cancel).await {
                        warn!(kind = %kind, error = %e, "Health check round failed");
                    }
                }
            }
        }
    }

    /// Evaluate and publish every metal resource of a kind once
    pub async fn sync_kind(&self, kind: ExtensionKind, cancel: &CancellationToken) -> Result<()> {
        let objects = self.seed.list_extensions(kind).await?;
        let metal: Vec<&DynamicObject> = objects
            .iter()
            .filter(|o| extension_type(o) == Some(PROVIDER_TYPE_METAL))
            .collect();
        debug!(kind = %kind, count = metal.len(), "Running health checks");

        join_all(metal.into_iter().map(|obj| self.sync_object(kind, obj, cancel))).await;
        Ok(())
    }

    async fn sync_object(
        &self,
        kind: ExtensionKind,
        obj: &DynamicObject,
        cancel: &CancellationToken,
    ) {
        let name = obj.name_any();
        let Some(namespace) = obj.namespace() else {
            warn!(kind = %kind, name = %name, "Extension resource without namespace");
            return;
        };

        let conditions = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(
                    kind = %kind,
                    namespace = %namespace,
                    name = %name,
                    "Abandoning health check"
                );
                return;
            }
            conditions = self.evaluate(kind, &namespace, obj) => conditions,
        };
        let Some(conditions) = conditions else {
            return;
        };
        if cancel.is_cancelled() {
            return;
        }

        let mut merged = match extension_conditions(obj) {
            Ok(existing) => existing,
            Err(e) => {
                warn!(
                    kind = %kind,
                    namespace = %namespace,
                    name = %name,
                    error = %e,
                    "Dropping undecodable conditions"
                );
                Vec::new()
            }
        };
        for condition in conditions {
            merge_condition(&mut merged, condition);
        }

        if let Err(e) = self
            .seed
            .patch_extension_conditions(kind, &namespace, &name, &merged)
            .await
        {
            warn!(
                kind = %kind,
                namespace = %namespace,
                name = %name,
                error = %e,
                "Failed to publish health conditions"
            );
        }
    }

    /// Conditions for one resource, `None` when its shoot is being deleted
    pub async fn evaluate(
        &self,
        kind: ExtensionKind,
        namespace: &str,
        target: &DynamicObject,
    ) -> Option<Vec<Condition>> {
        let condition_types = conditions_of(&self.registrations, kind);

        let cluster = match self.seed.get_cluster(namespace).await {
            Ok(Some(cluster)) => cluster,
            Ok(None) => {
                return Some(unknown(&condition_types, "cluster descriptor not found"));
            }
            Err(e) => return Some(unknown(&condition_types, &e.to_string())),
        };
        if cluster.shoot().is_ok_and(|s| s.is_deleting()) {
            debug!(
                kind = %kind,
                namespace = %namespace,
                "Skipping health checks of deleting shoot"
            );
            return None;
        }

        let ctx = CheckContext::new(
            namespace,
            cluster,
            self.config.clone(),
            self.seed.clone(),
            self.shoot_factory.clone(),
        );

        let mut results: Vec<(&'static str, Vec<HealthResult>)> =
            condition_types.iter().map(|c| (*c, Vec::new())).collect();
        for registration in self.registrations.iter().filter(|r| r.kind == kind) {
            let result = if !registration.applies(ctx.config(), ctx.cluster()) {
                HealthResult::healthy()
            } else {
                match registration.check.check(&ctx, target).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(
                            kind = %kind,
                            namespace = %namespace,
                            check = registration.check.name(),
                            error = %e,
                            "Health check could not be evaluated"
                        );
                        HealthResult::unknown(format!("{}: {e}", registration.check.name()))
                    }
                }
            };
            if let Some((_, bucket)) = results
                .iter_mut()
                .find(|(c, _)| *c == registration.condition)
            {
                bucket.push(result);
            }
        }

        Some(
            results
                .iter()
                .map(|(condition, bucket)| {
                    let reduced = reduce(bucket);
                    debug!(
                        kind = %kind,
                        namespace = %namespace,
                        condition = %condition,
                        status = %reduced.status,
                        "Evaluated condition"
                    );
                    to_condition(condition, &reduced)
                })
                .collect(),
        )
    }
}

fn unknown(condition_types: &[&'static str], detail: &str) -> Vec<Condition> {
    condition_types
        .iter()
        .map(|c| to_condition(c, &HealthResult::unknown(detail)))
        .collect()
}
