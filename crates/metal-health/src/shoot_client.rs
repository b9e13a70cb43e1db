//! Shoot cluster access for health checks
//!
//! Checks that look inside a shoot go through [`ShootClient`]. Clients are
//! built on demand by a [`ShootClientFactory`] from the host-managed
//! kubeconfig Secret in the shoot namespace.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Node};
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::debug;

use metal_common::client::SeedClient;
use metal_common::crd::Firewall;
use metal_common::kube_utils::create_client_from_kubeconfig_yaml;
use metal_common::{Error, Result};

/// Secret in the shoot namespace holding the host's shoot kubeconfig
pub const SHOOT_ACCESS_SECRET: &str = "gardener";

/// Key of the kubeconfig in [`SHOOT_ACCESS_SECRET`]
pub const SHOOT_ACCESS_KUBECONFIG_KEY: &str = "kubeconfig";

/// Reads from inside a shoot
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShootClient: Send + Sync {
    /// Get a Firewall
    async fn get_firewall(&self, namespace: &str, name: &str) -> Result<Option<Firewall>>;

    /// Get a ConfigMap
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    /// List all nodes
    async fn list_nodes(&self) -> Result<Vec<Node>>;
}

/// Builds shoot clients for shoot namespaces
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShootClientFactory: Send + Sync {
    /// Build a client for the shoot behind a seed namespace
    async fn shoot_client(&self, namespace: &str) -> Result<Arc<dyn ShootClient>>;
}

/// kube-rs shoot client
#[derive(Clone)]
pub struct KubeShootClient {
    client: Client,
}

impl KubeShootClient {
    /// Wrap a kube Client pointing at a shoot
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ShootClient for KubeShootClient {
    async fn get_firewall(&self, namespace: &str, name: &str) -> Result<Option<Firewall>> {
        let api: Api<Firewall> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

/// Factory reading the shoot kubeconfig from the seed
pub struct SecretShootClientFactory {
    seed: Arc<dyn SeedClient>,
}

impl SecretShootClientFactory {
    /// Create a factory reading access secrets through `seed`
    pub fn new(seed: Arc<dyn SeedClient>) -> Self {
        Self { seed }
    }
}

#[async_trait]
impl ShootClientFactory for SecretShootClientFactory {
    async fn shoot_client(&self, namespace: &str) -> Result<Arc<dyn ShootClient>> {
        let secret = self
            .seed
            .get_secret(namespace, SHOOT_ACCESS_SECRET)
            .await?
            .ok_or_else(|| {
                Error::not_found("secret", format!("{namespace}/{SHOOT_ACCESS_SECRET}"))
            })?;
        let kubeconfig = kubeconfig_from_secret(&secret)?;

        debug!(namespace = %namespace, "Creating shoot client");
        let client = create_client_from_kubeconfig_yaml(kubeconfig).await?;
        Ok(Arc::new(KubeShootClient::new(client)))
    }
}

fn kubeconfig_from_secret(secret: &k8s_openapi::api::core::v1::Secret) -> Result<&str> {
    let data = secret
        .data
        .as_ref()
        .and_then(|d| d.get(SHOOT_ACCESS_KUBECONFIG_KEY))
        .ok_or_else(|| {
            Error::not_found(
                "secret key",
                format!("{SHOOT_ACCESS_SECRET}.{SHOOT_ACCESS_KUBECONFIG_KEY}"),
            )
        })?;
    std::str::from_utf8(&data.0)
        .map_err(|e| Error::serialization_for_kind("kubeconfig", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::ByteString;
    use metal_common::client::MockSeedClient;
    use std::collections::BTreeMap;

    fn access_secret(data: &[(&str, &[u8])]) -> Secret {
        Secret {
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn kubeconfig_is_read_from_its_key() {
        let secret = access_secret(&[("kubeconfig", b"apiVersion: v1\nkind: Config\n")]);
        assert_eq!(
            kubeconfig_from_secret(&secret).unwrap(),
            "apiVersion: v1\nkind: Config\n"
        );
    }

    #[test]
    fn missing_key_is_not_found() {
        let secret = access_secret(&[("token", b"abc")]);
        assert!(kubeconfig_from_secret(&secret).unwrap_err().is_not_found());
    }

    #[test]
    fn non_utf8_kubeconfig_is_rejected() {
        let secret = access_secret(&[("kubeconfig", &[0xff, 0xfe])]);
        assert!(!kubeconfig_from_secret(&secret).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn missing_access_secret_is_not_found() {
        let mut seed = MockSeedClient::new();
        seed.expect_get_secret()
            .withf(|ns, name| ns == "shoot--prj--name" && name == SHOOT_ACCESS_SECRET)
            .returning(|_, _| Ok(None));
        let factory = SecretShootClientFactory::new(Arc::new(seed));

        let err = factory
            .shoot_client("shoot--prj--name")
            .await
            .err()
            .expect("no client without secret");
        assert!(err.is_not_found());
    }
}
