//! Cluster audit wiring of the kube-apiserver pod
//!
//! With cluster audit on, the apiserver writes its audit log into a shared
//! emptyDir and the `auditforwarder` sidecar ships it to the audittailer in
//! the shoot. Splunk forwarding adds a config map, a secret and the HEC token.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EmptyDirVolumeSource, EnvVar, EnvVarSource,
    KeyToPath, ObjectFieldSelector, PodSpec, ProjectedVolumeSource, ResourceRequirements,
    SecretKeySelector, SecretProjection, SecretVolumeSource, Volume, VolumeMount,
    VolumeProjection,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use metal_common::config::ImagePullPolicy;

use crate::ensure::{
    ensure_container_with_name, ensure_no_container_with_name, ensure_no_volume_with_name,
    ensure_volume_with_name, find_with_name, prune_empty,
};

/// Name of the sidecar container
pub const AUDIT_FORWARDER_CONTAINER: &str = "auditforwarder";
/// Shared audit log volume
pub const AUDIT_LOG_VOLUME: &str = "auditlog";
/// Mount path of the audit log volume
pub const AUDIT_LOG_PATH: &str = "/auditlog";
/// Audit policy config map volume
pub const AUDIT_POLICY_VOLUME: &str = "audit-policy-override";
/// Mount path of the audit policy
pub const AUDIT_POLICY_PATH: &str = "/etc/kubernetes/audit-override";
/// Credentials of the sidecar towards the shoot
pub const SHOOT_ACCESS_VOLUME: &str = "auditforwarder-shootaccess";
/// Mount path of the sidecar credentials
pub const SHOOT_ACCESS_PATH: &str = "/shootaccess";
/// Secret with the sidecar's shoot kubeconfig
pub const SHOOT_ACCESS_SECRET: &str = "shoot-access-auditforwarder";
/// Label selector of the rotated audittailer client certificates
pub const AUDITTAILER_CLIENT_SELECTOR: &str = "name=audittailer-client";
/// Konnectivity socket volume added by the host
pub const KONNECTIVITY_UDS_VOLUME: &str = "konnectivity-uds";
/// Mount path of the konnectivity socket
pub const KONNECTIVITY_UDS_PATH: &str = "/konnectivity-uds";
/// Splunk output config map and its volume
pub const SPLUNK_CONFIG_VOLUME: &str = "splunk-config";
/// Splunk credentials secret and its volume
pub const SPLUNK_SECRET_VOLUME: &str = "splunk-secret";
/// Key of the HEC token in the splunk secret
pub const SPLUNK_HEC_TOKEN_KEY: &str = "hec_token";

const SPLUNK_CONFIG_PATH: &str = "/fluent-bit/etc/add";
const SPLUNK_SECRET_PATH: &str = "/fluent-bit/etc/splunkca";

/// Whether the host put a konnectivity socket into the pod
pub fn has_konnectivity_uds(pod: &PodSpec) -> bool {
    pod.volumes
        .as_deref()
        .is_some_and(|v| find_with_name(v, KONNECTIVITY_UDS_VOLUME).is_some())
}

/// Settings of the audit-forwarder sidecar
#[derive(Clone, Debug)]
pub struct AuditForwarder<'a> {
    /// Image reference
    pub image: String,
    /// Pull policy
    pub pull_policy: ImagePullPolicy,
    /// Name of the latest audittailer client certificate secret
    pub client_secret: &'a str,
    /// Forward to splunk as well
    pub splunk: bool,
}

impl AuditForwarder<'_> {
    /// Build the sidecar for a pod with or without konnectivity socket
    ///
    /// The container is rebuilt from scratch so its env and mounts depend
    /// only on the two switches, never on an earlier version.
    pub fn container(&self, konnectivity: bool) -> Container {
        let mut env = vec![
            env_value("AUDIT_KUBECFG", &format!("{SHOOT_ACCESS_PATH}/kubeconfig")),
            env_value("AUDIT_NAMESPACE", "audit"),
            env_value("AUDIT_SERVICE_SELECTOR", "app.kubernetes.io/name=audittailer"),
            env_value("AUDIT_TLS_CA_FILE", "ca.crt"),
            env_value("AUDIT_TLS_CRT_FILE", "tls.crt"),
            env_value("AUDIT_TLS_KEY_FILE", "tls.key"),
            env_value("AUDIT_TLS_VHOST", "audittailer"),
            env_value("AUDIT_AUDIT_LOG_PATH", &format!("{AUDIT_LOG_PATH}/audit.log")),
            EnvVar {
                name: "AUDIT_POD_NAME".to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "metadata.name".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ];
        let mut mounts = vec![
            mount(AUDIT_LOG_VOLUME, AUDIT_LOG_PATH, false),
            mount(SHOOT_ACCESS_VOLUME, SHOOT_ACCESS_PATH, true),
        ];

        if konnectivity {
            env.push(env_value(
                "AUDIT_KONNECTIVITY_UDS_SOCKET",
                &format!("{KONNECTIVITY_UDS_PATH}/konnectivity-server.socket"),
            ));
            mounts.push(mount(KONNECTIVITY_UDS_VOLUME, KONNECTIVITY_UDS_PATH, false));
        }

        if self.splunk {
            env.push(EnvVar {
                name: "SPLUNK_HEC_TOKEN".to_string(),
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name: SPLUNK_SECRET_VOLUME.to_string(),
                        key: SPLUNK_HEC_TOKEN_KEY.to_string(),
                        optional: None,
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            });
            mounts.push(mount(SPLUNK_CONFIG_VOLUME, SPLUNK_CONFIG_PATH, true));
            mounts.push(mount(SPLUNK_SECRET_VOLUME, SPLUNK_SECRET_PATH, true));
        }

        Container {
            name: AUDIT_FORWARDER_CONTAINER.to_string(),
            image: Some(self.image.clone()),
            image_pull_policy: Some(self.pull_policy.as_str().to_string()),
            env: Some(env),
            volume_mounts: Some(mounts),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity("50m".to_string())),
                    ("memory".to_string(), Quantity("100Mi".to_string())),
                ])),
                limits: Some(BTreeMap::from([(
                    "memory".to_string(),
                    Quantity("200Mi".to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Add the sidecar and its volumes to the pod
    pub fn ensure(&self, pod: &mut PodSpec) {
        let konnectivity = has_konnectivity_uds(pod);
        ensure_container_with_name(&mut pod.containers, self.container(konnectivity));

        let volumes = pod.volumes.get_or_insert_with(Vec::new);
        ensure_volume_with_name(volumes, audit_log_volume());
        ensure_volume_with_name(volumes, audit_policy_volume());
        ensure_volume_with_name(volumes, shoot_access_volume(self.client_secret));
        if self.splunk {
            ensure_volume_with_name(volumes, config_map_volume(SPLUNK_CONFIG_VOLUME));
            ensure_volume_with_name(volumes, secret_volume(SPLUNK_SECRET_VOLUME));
        } else {
            ensure_no_volume_with_name(volumes, SPLUNK_CONFIG_VOLUME);
            ensure_no_volume_with_name(volumes, SPLUNK_SECRET_VOLUME);
        }
    }
}

/// Remove the sidecar and every audit volume from the pod
pub fn ensure_no_audit_forwarder(pod: &mut PodSpec) {
    ensure_no_container_with_name(&mut pod.containers, AUDIT_FORWARDER_CONTAINER);
    if let Some(volumes) = pod.volumes.as_mut() {
        for name in [
            AUDIT_LOG_VOLUME,
            AUDIT_POLICY_VOLUME,
            SHOOT_ACCESS_VOLUME,
            SPLUNK_CONFIG_VOLUME,
            SPLUNK_SECRET_VOLUME,
        ] {
            ensure_no_volume_with_name(volumes, name);
        }
    }
    prune_empty(&mut pod.volumes);
}

/// Shared emptyDir the apiserver writes its audit log to
pub fn audit_log_volume() -> Volume {
    Volume {
        name: AUDIT_LOG_VOLUME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

/// Config map with the shoot's audit policy
pub fn audit_policy_volume() -> Volume {
    config_map_volume(AUDIT_POLICY_VOLUME)
}

fn shoot_access_volume(client_secret: &str) -> Volume {
    let projection = |secret: &str, keys: &[&str]| VolumeProjection {
        secret: Some(SecretProjection {
            name: secret.to_string(),
            items: Some(
                keys.iter()
                    .map(|k| KeyToPath {
                        key: k.to_string(),
                        path: k.to_string(),
                        mode: None,
                    })
                    .collect(),
            ),
            optional: Some(false),
        }),
        ..Default::default()
    };

    Volume {
        name: SHOOT_ACCESS_VOLUME.to_string(),
        projected: Some(ProjectedVolumeSource {
            default_mode: Some(420),
            sources: Some(vec![
                projection(SHOOT_ACCESS_SECRET, &["kubeconfig"]),
                projection(client_secret, &["ca.crt", "tls.crt", "tls.key"]),
            ]),
        }),
        ..Default::default()
    }
}

/// Volume backed by the config map of the same name
pub fn config_map_volume(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: name.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Volume backed by the secret of the same name
pub fn secret_volume(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Volume mount by name
pub fn mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}

fn env_value(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}
