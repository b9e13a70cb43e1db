//! The check seam and what a check gets to see

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::DynamicObject;
use tokio::sync::OnceCell;

use metal_common::client::SeedClient;
use metal_common::crd::Cluster;
use metal_common::{ControllerConfiguration, Result};

use crate::shoot_client::{ShootClient, ShootClientFactory};
use crate::types::HealthResult;

/// Gate deciding whether a check applies to a shoot at all
///
/// A gated-out check counts as healthy.
pub type PreCheck = Arc<dyn Fn(&ControllerConfiguration, &Cluster) -> bool + Send + Sync>;

/// A single health evaluator
///
/// Errors mean the state could not be retrieved; the aggregator turns them
/// into `Unknown`. An unhealthy resource is an `Ok` result with status
/// `False`.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Short name used in logs and for duplicate detection
    fn name(&self) -> &str;

    /// Evaluate the check for an extension resource
    async fn check(&self, ctx: &CheckContext, target: &DynamicObject) -> Result<HealthResult>;
}

/// Inputs shared by all checks of one extension resource in one round
pub struct CheckContext {
    namespace: String,
    cluster: Cluster,
    config: Arc<ControllerConfiguration>,
    seed: Arc<dyn SeedClient>,
    shoot_factory: Arc<dyn ShootClientFactory>,
    shoot: OnceCell<Arc<dyn ShootClient>>,
}

impl CheckContext {
    /// Create a context for the shoot behind `namespace`
    pub fn new(
        namespace: impl Into<String>,
        cluster: Cluster,
        config: Arc<ControllerConfiguration>,
        seed: Arc<dyn SeedClient>,
        shoot_factory: Arc<dyn ShootClientFactory>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            cluster,
            config,
            seed,
            shoot_factory,
            shoot: OnceCell::new(),
        }
    }

    /// Seed namespace of the shoot
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Cluster descriptor
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Controller configuration
    pub fn config(&self) -> &ControllerConfiguration {
        &self.config
    }

    /// Seed client
    pub fn seed(&self) -> &dyn SeedClient {
        self.seed.as_ref()
    }

    /// Shoot client, built on first use and shared by later checks
    pub async fn shoot(&self) -> Result<&dyn ShootClient> {
        let client = self
            .shoot
            .get_or_try_init(|| self.shoot_factory.shoot_client(&self.namespace))
            .await?;
        Ok(client.as_ref())
    }
}
