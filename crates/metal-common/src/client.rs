//! Seed cluster access
//!
//! Mutators and health checks read the seed through the [`SeedClient`] trait
//! so they can be tested against mocks. [`KubeSeedClient`] is the kube-rs
//! implementation used in production.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams};
use kube::Client;

use crate::crd::{Cluster, Condition, Duros, ExtensionKind};
use crate::Result;

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "metal-extension";

/// Trait abstracting seed cluster reads and status writes
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait SeedClient: Send + Sync {
    /// Get the cluster descriptor of a shoot namespace
    async fn get_cluster(&self, name: &str) -> Result<Option<Cluster>>;

    /// Get a Secret
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// List Secrets matching a label selector
    async fn list_secrets(&self, namespace: &str, label_selector: &str) -> Result<Vec<Secret>>;

    /// Get a Service
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;

    /// Get a Deployment
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>>;

    /// Get a Duros resource
    async fn get_duros(&self, namespace: &str, name: &str) -> Result<Option<Duros>>;

    /// List all extension objects of a kind
    async fn list_extensions(&self, kind: ExtensionKind) -> Result<Vec<DynamicObject>>;

    /// Replace `status.conditions` of an extension object
    async fn patch_extension_conditions(
        &self,
        kind: ExtensionKind,
        namespace: &str,
        name: &str,
        conditions: &[Condition],
    ) -> Result<()>;
}

/// Real seed client implementation
#[derive(Clone)]
pub struct KubeSeedClient {
    client: Client,
}

impl KubeSeedClient {
    /// Create a new KubeSeedClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The underlying kube Client
    pub fn kube_client(&self) -> Client {
        self.client.clone()
    }
}

#[async_trait]
impl SeedClient for KubeSeedClient {
    async fn get_cluster(&self, name: &str) -> Result<Option<Cluster>> {
        let api: Api<Cluster> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_secrets(&self, namespace: &str, label_selector: &str) -> Result<Vec<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(list.items)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_duros(&self, namespace: &str, name: &str) -> Result<Option<Duros>> {
        let api: Api<Duros> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_extensions(&self, kind: ExtensionKind) -> Result<Vec<DynamicObject>> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &kind.api_resource());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn patch_extension_conditions(
        &self,
        kind: ExtensionKind,
        namespace: &str,
        name: &str,
        conditions: &[Condition],
    ) -> Result<()> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource());
        let patch = serde_json::json!({ "status": { "conditions": conditions } });
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
