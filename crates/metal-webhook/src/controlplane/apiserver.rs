//! kube-apiserver Deployment of the shoot control plane

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::PodSpec;
use kube::ResourceExt;
use tracing::debug;

use metal_common::crd::ControlPlaneFeatureGates;
use metal_common::imagevector::IMAGE_AUDIT_FORWARDER;
use metal_common::secrets::latest_issued_secret;
use metal_common::Result;

use super::audit::{
    ensure_no_audit_forwarder, AuditForwarder, AUDITTAILER_CLIENT_SELECTOR, AUDIT_LOG_PATH,
    AUDIT_LOG_VOLUME, AUDIT_POLICY_PATH, AUDIT_POLICY_VOLUME,
};
use super::audit::{config_map_volume, mount, secret_volume};
use super::konnectivity::ensure_konnectivity_server;
use super::{cloudprovider_checksum, ensure_checksum_annotation, CLOUD_PROVIDER_FLAG};
use crate::context::MutationContext;
use crate::ensure::{
    ensure_no_volume_mount_with_name, ensure_string_with_prefix, ensure_volume_mount_with_name,
    ensure_volume_with_name, find_with_name_mut, prune_empty,
};

/// Name of the Deployment and of its main container
pub const KUBE_APISERVER: &str = "kube-apiserver";

/// Token webhook config map and volume
pub const AUTHN_WEBHOOK_CONFIG_VOLUME: &str = "authn-webhook-config";
/// Token webhook server certificate secret and volume
pub const AUTHN_WEBHOOK_CERTS_VOLUME: &str = "kube-jwt-authn-webhook-server";

const AUTHN_WEBHOOK_CONFIG_PATH: &str = "/etc/webhook/config";
const AUTHN_WEBHOOK_CERTS_PATH: &str = "/etc/webhook/certs";
const AUTHN_WEBHOOK_CONFIG_FILE: &str = "/etc/webhook/config/authn-webhook-config.json";

/// Everything the apiserver mutation depends on, resolved up front
#[derive(Clone, Debug, Default)]
pub struct ApiserverSettings<'a> {
    /// Token webhook authentication
    pub auth: bool,
    /// Audit forwarding, `None` when off
    pub audit: Option<AuditForwarder<'a>>,
    /// Checksum of the cloudprovider secret
    pub checksum: String,
}

/// Mutate the kube-apiserver Deployment
pub async fn ensure_kube_apiserver(
    ctx: &MutationContext,
    deployment: &mut Deployment,
) -> Result<()> {
    let config = ctx.config();
    let gates = match ctx.cluster().await? {
        Some(cluster) => cluster.shoot()?.control_plane_config()?.feature_gates,
        None => ControlPlaneFeatureGates::default(),
    };

    let audit = config.cluster_audit_enabled(&gates);
    let client_secret = if audit {
        let secrets = ctx
            .seed()
            .list_secrets(ctx.namespace(), AUDITTAILER_CLIENT_SELECTOR)
            .await?;
        Some(latest_issued_secret(&secrets)?.name_any())
    } else {
        None
    };

    let settings = ApiserverSettings {
        auth: config.auth.enabled,
        audit: match client_secret.as_deref() {
            Some(client_secret) => Some(AuditForwarder {
                image: ctx.images().find_image(IMAGE_AUDIT_FORWARDER, None)?.reference(),
                pull_policy: config.image_pull_policy,
                client_secret,
                splunk: config.audit_to_splunk_enabled(&gates),
            }),
            None => None,
        },
        checksum: cloudprovider_checksum(ctx).await?,
    };

    apply_kube_apiserver(deployment, &settings);
    Ok(())
}

/// Apply resolved settings to the kube-apiserver Deployment
pub fn apply_kube_apiserver(deployment: &mut Deployment, settings: &ApiserverSettings<'_>) {
    let Some(spec) = deployment.spec.as_mut() else {
        debug!("kube-apiserver deployment has no spec, skipping");
        return;
    };
    let Some(pod) = spec.template.spec.as_mut() else {
        debug!("kube-apiserver deployment has no pod spec, skipping");
        return;
    };

    if !ensure_apiserver_container(pod, settings) {
        debug!("kube-apiserver container not found, skipping");
        return;
    }

    if settings.auth {
        let volumes = pod.volumes.get_or_insert_with(Vec::new);
        ensure_volume_with_name(volumes, config_map_volume(AUTHN_WEBHOOK_CONFIG_VOLUME));
        ensure_volume_with_name(volumes, secret_volume(AUTHN_WEBHOOK_CERTS_VOLUME));
    }

    match &settings.audit {
        Some(forwarder) => forwarder.ensure(pod),
        None => ensure_no_audit_forwarder(pod),
    }

    if !ensure_konnectivity_server(pod) {
        debug!("No konnectivity-server container");
    }

    ensure_checksum_annotation(&mut spec.template, &settings.checksum);
}

fn ensure_apiserver_container(pod: &mut PodSpec, settings: &ApiserverSettings<'_>) -> bool {
    let Some(container) = find_with_name_mut(&mut pod.containers, KUBE_APISERVER) else {
        return false;
    };

    let command = container.command.get_or_insert_with(Vec::new);
    ensure_string_with_prefix(command, "--cloud-provider=", CLOUD_PROVIDER_FLAG);
    if settings.auth {
        ensure_string_with_prefix(
            command,
            "--authentication-token-webhook-config-file=",
            &format!("--authentication-token-webhook-config-file={AUTHN_WEBHOOK_CONFIG_FILE}"),
        );
    }
    if settings.audit.is_some() {
        for flag in [
            format!("--audit-policy-file={AUDIT_POLICY_PATH}/audit-policy.yaml"),
            format!("--audit-log-path={AUDIT_LOG_PATH}/audit.log"),
            "--audit-log-maxsize=100".to_string(),
            "--audit-log-maxbackup=1".to_string(),
        ] {
            let prefix = flag.split_inclusive('=').next().unwrap_or_default();
            ensure_string_with_prefix(command, prefix, &flag);
        }
    }

    let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
    if settings.auth {
        ensure_volume_mount_with_name(
            mounts,
            mount(AUTHN_WEBHOOK_CONFIG_VOLUME, AUTHN_WEBHOOK_CONFIG_PATH, true),
        );
        ensure_volume_mount_with_name(
            mounts,
            mount(AUTHN_WEBHOOK_CERTS_VOLUME, AUTHN_WEBHOOK_CERTS_PATH, true),
        );
    }
    if settings.audit.is_some() {
        ensure_volume_mount_with_name(mounts, mount(AUDIT_POLICY_VOLUME, AUDIT_POLICY_PATH, true));
        ensure_volume_mount_with_name(mounts, mount(AUDIT_LOG_VOLUME, AUDIT_LOG_PATH, false));
    } else {
        ensure_no_volume_mount_with_name(mounts, AUDIT_POLICY_VOLUME);
        ensure_no_volume_mount_with_name(mounts, AUDIT_LOG_VOLUME);
    }
    prune_empty(&mut container.volume_mounts);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::audit::{AUDIT_FORWARDER_CONTAINER, KONNECTIVITY_UDS_VOLUME};
    use crate::controlplane::CHECKSUM_ANNOTATION;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{Container, PodTemplateSpec, Volume};
    use metal_common::config::ImagePullPolicy;

    fn deployment(volumes: Vec<Volume>) -> Deployment {
        Deployment {
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: KUBE_APISERVER.to_string(),
                            command: Some(vec![
                                "/usr/local/bin/kube-apiserver".to_string(),
                                "--cloud-provider=".to_string(),
                            ]),
                            ..Default::default()
                        }],
                        volumes: (!volumes.is_empty()).then_some(volumes),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn forwarder() -> AuditForwarder<'static> {
        AuditForwarder {
            image: "auditforwarder:v1".to_string(),
            pull_policy: ImagePullPolicy::Always,
            client_secret: "audittailer-client-1",
            splunk: false,
        }
    }

    fn pod(d: &Deployment) -> &PodSpec {
        d.spec.as_ref().unwrap().template.spec.as_ref().unwrap()
    }

    #[test]
    fn plain_apiserver_only_gets_cloud_provider() {
        let mut d = deployment(vec![]);
        let settings = ApiserverSettings {
            checksum: "abc".into(),
            ..Default::default()
        };
        apply_kube_apiserver(&mut d, &settings);

        let p = pod(&d);
        assert_eq!(
            p.containers[0].command.as_deref().unwrap(),
            ["/usr/local/bin/kube-apiserver", "--cloud-provider=external"]
        );
        assert!(p.volumes.is_none());
        assert!(p.containers[0].volume_mounts.is_none());

        let template = &d.spec.as_ref().unwrap().template;
        let annotations = template.metadata.as_ref().unwrap().annotations.as_ref().unwrap();
        assert_eq!(annotations.get(CHECKSUM_ANNOTATION).map(String::as_str), Some("abc"));
    }

    #[test]
    fn audit_adds_flags_mounts_and_sidecar() {
        let mut d = deployment(vec![]);
        let settings = ApiserverSettings {
            audit: Some(forwarder()),
            ..Default::default()
        };
        apply_kube_apiserver(&mut d, &settings);

        let p = pod(&d);
        let command = p.containers[0].command.as_deref().unwrap();
        assert!(command.contains(&"--audit-log-maxsize=100".to_string()));
        assert!(command.contains(&"--audit-log-maxbackup=1".to_string()));
        assert_eq!(p.containers[1].name, AUDIT_FORWARDER_CONTAINER);

        let env = p.containers[1].env.as_deref().unwrap();
        assert!(!env.iter().any(|e| e.name == "AUDIT_KONNECTIVITY_UDS_SOCKET"));

        let once = d.clone();
        apply_kube_apiserver(&mut d, &settings);
        assert_eq!(d, once);
    }

    #[test]
    fn audit_off_removes_previous_sidecar() {
        let mut d = deployment(vec![Volume {
            name: KONNECTIVITY_UDS_VOLUME.to_string(),
            ..Default::default()
        }]);
        let audit = ApiserverSettings {
            audit: Some(forwarder()),
            ..Default::default()
        };
        apply_kube_apiserver(&mut d, &audit);
        apply_kube_apiserver(&mut d, &ApiserverSettings::default());

        let p = pod(&d);
        assert_eq!(p.containers.len(), 1);
        let volumes: Vec<_> = p
            .volumes
            .as_deref()
            .unwrap()
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(volumes, vec![KONNECTIVITY_UDS_VOLUME]);
        assert!(p.containers[0].volume_mounts.is_none());
    }

    #[test]
    fn missing_container_leaves_pod_alone() {
        let mut d = deployment(vec![]);
        let template = &mut d.spec.as_mut().unwrap().template;
        template.spec.as_mut().unwrap().containers[0].name = "other".into();
        let before = d.clone();
        let settings = ApiserverSettings {
            auth: true,
            ..Default::default()
        };
        apply_kube_apiserver(&mut d, &settings);

        assert_eq!(d, before);
    }
}
