//! Shared Kubernetes utilities using kube-rs

use std::path::Path;
use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig: {}", e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    client_from_config(config)
}

/// Create a kube client from kubeconfig YAML (e.g. read from a Secret)
pub async fn create_client_from_kubeconfig_yaml(raw: &str) -> Result<Client, Error> {
    let kubeconfig = Kubeconfig::from_yaml(raw).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to parse kubeconfig: {}", e))
    })?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| {
            Error::internal_with_context(
                "create_client",
                format!("failed to load kubeconfig: {}", e),
            )
        })?;
    client_from_config(config)
}

fn client_from_config(mut config: Config) -> Result<Client, Error> {
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Whether an object carries a deletion timestamp
pub fn is_deleting(meta: &ObjectMeta) -> bool {
    meta.deletion_timestamp.is_some()
}

/// SHA-256 hex digest of a secret's data
///
/// Keys are hashed in sorted order, so the result only depends on content.
pub fn secret_checksum(secret: &Secret) -> String {
    use aws_lc_rs::digest;

    let mut ctx = digest::Context::new(&digest::SHA256);
    if let Some(data) = &secret.data {
        for (key, value) in data {
            ctx.update(key.as_bytes());
            ctx.update(&[0]);
            ctx.update(&value.0);
            ctx.update(&[0]);
        }
    }
    if let Some(data) = &secret.string_data {
        for (key, value) in data {
            ctx.update(key.as_bytes());
            ctx.update(&[0]);
            ctx.update(value.as_bytes());
            ctx.update(&[0]);
        }
    }
    ctx.finish()
        .as_ref()
        .iter()
        .fold(String::with_capacity(64), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}
