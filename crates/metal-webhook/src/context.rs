//! Objects under mutation and the per-call context around them

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::debug;

use metal_common::client::SeedClient;
use metal_common::crd::{Cluster, Etcd, OperatingSystemConfig};
use metal_common::kube_utils::is_deleting;
use metal_common::{ControllerConfiguration, Error, ImageVector, Result};

/// Kinds the webhooks register for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// apps/v1 Deployment
    Deployment,
    /// druid.gardener.cloud/v1alpha1 Etcd
    Etcd,
    /// extensions.gardener.cloud/v1alpha1 OperatingSystemConfig
    OperatingSystemConfig,
    /// v1 Secret
    Secret,
}

impl ObjectKind {
    /// Resolve an admission request's group and kind
    pub fn from_group_kind(group: &str, kind: &str) -> Option<Self> {
        match (group, kind) {
            ("apps", "Deployment") => Some(Self::Deployment),
            ("druid.gardener.cloud", "Etcd") => Some(Self::Etcd),
            ("extensions.gardener.cloud", "OperatingSystemConfig") => {
                Some(Self::OperatingSystemConfig)
            }
            ("", "Secret") => Some(Self::Secret),
            _ => None,
        }
    }

    /// API group, version and resource plural for webhook rules
    pub fn group_version_resource(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Deployment => ("apps", "v1", "deployments"),
            Self::Etcd => ("druid.gardener.cloud", "v1alpha1", "etcds"),
            Self::OperatingSystemConfig => {
                ("extensions.gardener.cloud", "v1alpha1", "operatingsystemconfigs")
            }
            Self::Secret => ("", "v1", "secrets"),
        }
    }

    /// Kind name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::Etcd => "Etcd",
            Self::OperatingSystemConfig => "OperatingSystemConfig",
            Self::Secret => "Secret",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// A decoded object handed to a mutator
#[derive(Clone, Debug, PartialEq)]
pub enum MutableObject {
    /// A Deployment
    Deployment(Box<Deployment>),
    /// An Etcd
    Etcd(Box<Etcd>),
    /// An OperatingSystemConfig
    OperatingSystemConfig(Box<OperatingSystemConfig>),
    /// A Secret
    Secret(Box<Secret>),
}

impl MutableObject {
    /// Decode raw JSON as the given kind
    pub fn decode(kind: ObjectKind, value: serde_json::Value) -> Result<Self> {
        Ok(match kind {
            ObjectKind::Deployment => Self::Deployment(Box::new(decode_as(kind, value)?)),
            ObjectKind::Etcd => Self::Etcd(Box::new(decode_as(kind, value)?)),
            ObjectKind::OperatingSystemConfig => {
                Self::OperatingSystemConfig(Box::new(decode_as(kind, value)?))
            }
            ObjectKind::Secret => Self::Secret(Box::new(decode_as(kind, value)?)),
        })
    }

    /// Encode back to JSON
    pub fn to_value(&self) -> Result<serde_json::Value> {
        let value = match self {
            Self::Deployment(o) => serde_json::to_value(o.as_ref()),
            Self::Etcd(o) => serde_json::to_value(o.as_ref()),
            Self::OperatingSystemConfig(o) => serde_json::to_value(o.as_ref()),
            Self::Secret(o) => serde_json::to_value(o.as_ref()),
        };
        value.map_err(|e| Error::serialization_for_kind(self.kind().kind(), e.to_string()))
    }

    /// The object's kind
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Deployment(_) => ObjectKind::Deployment,
            Self::Etcd(_) => ObjectKind::Etcd,
            Self::OperatingSystemConfig(_) => ObjectKind::OperatingSystemConfig,
            Self::Secret(_) => ObjectKind::Secret,
        }
    }

    /// The object's metadata
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::Deployment(o) => &o.metadata,
            Self::Etcd(o) => &o.metadata,
            Self::OperatingSystemConfig(o) => &o.metadata,
            Self::Secret(o) => &o.metadata,
        }
    }

    /// The object's name, empty when unset
    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }
}

fn decode_as<T: DeserializeOwned>(kind: ObjectKind, value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::serialization_for_kind(kind.kind(), e.to_string()))
}

/// Everything a mutator may consult besides the object itself
///
/// The cluster descriptor is fetched on first use and cached for the rest of
/// the call.
pub struct MutationContext {
    config: Arc<ControllerConfiguration>,
    images: Arc<ImageVector>,
    seed: Arc<dyn SeedClient>,
    namespace: String,
    cluster: OnceCell<Option<Cluster>>,
}

impl MutationContext {
    /// Create a context for an object in `namespace`
    pub fn new(
        config: Arc<ControllerConfiguration>,
        images: Arc<ImageVector>,
        seed: Arc<dyn SeedClient>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            config,
            images,
            seed,
            namespace: namespace.into(),
            cluster: OnceCell::new(),
        }
    }

    /// Controller configuration
    pub fn config(&self) -> &ControllerConfiguration {
        &self.config
    }

    /// Component image table
    pub fn images(&self) -> &ImageVector {
        &self.images
    }

    /// Seed client
    pub fn seed(&self) -> &dyn SeedClient {
        self.seed.as_ref()
    }

    /// Namespace of the object under mutation
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Cluster descriptor of the namespace, `None` outside shoot namespaces
    pub async fn cluster(&self) -> Result<Option<&Cluster>> {
        let cluster = self
            .cluster
            .get_or_try_init(|| async {
                let cluster = self.seed.get_cluster(&self.namespace).await?;
                if cluster.is_none() {
                    debug!(namespace = %self.namespace, "No cluster descriptor for namespace");
                }
                Ok::<_, Error>(cluster)
            })
            .await?;
        Ok(cluster.as_ref())
    }
}

/// One admission webhook's mutation logic
#[async_trait]
pub trait Mutator: Send + Sync {
    /// Webhook name, also the last segment of its path
    fn name(&self) -> &'static str;

    /// Kinds the webhook registers for
    fn kinds(&self) -> &'static [ObjectKind];

    /// Mutate `new` in place
    ///
    /// `old` is the prior object on updates. Called only for live objects.
    async fn mutate(
        &self,
        ctx: &MutationContext,
        new: &mut MutableObject,
        old: Option<&MutableObject>,
    ) -> Result<()>;

    /// Mutate unless the object is being deleted
    async fn handle(
        &self,
        ctx: &MutationContext,
        new: &mut MutableObject,
        old: Option<&MutableObject>,
    ) -> Result<()> {
        if is_deleting(new.meta()) {
            debug!(
                webhook = self.name(),
                kind = %new.kind(),
                name = new.name(),
                "Object is being deleted, passing through"
            );
            return Ok(());
        }
        self.mutate(ctx, new, old).await
    }
}
