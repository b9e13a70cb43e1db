//! Admission scenarios for the metal webhooks
//!
//! These tests tell the story of what the host sends through the webhooks
//! while it reconciles a shoot control plane, and what comes back. The seed
//! is mocked; everything else runs through the public mutator API.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, PodSpec, PodTemplateSpec, Probe, Secret, Volume,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use serde_json::json;

use metal_common::client::MockSeedClient;
use metal_common::crd::{
    Cluster, ClusterSpec, Etcd, EtcdSpec, RegistryCapability, RegistryConfig, RegistryHost,
    RegistryMirror, ETCD_MAIN,
};
use metal_common::{ControllerConfiguration, ImageVector};
use metal_webhook::cloudprovider::CloudProviderSecretMutator;
use metal_webhook::controlplane::containerd::ensure_containerd_registries;
use metal_webhook::controlplane::ControlPlaneMutator;
use metal_webhook::etcd::SeedProviderMutator;
use metal_webhook::exposure::ExposureMutator;
use metal_webhook::shoot::ShootMutator;
use metal_webhook::{MutableObject, MutationContext, Mutator};

const NAMESPACE: &str = "shoot--prj--name";

// =============================================================================
// Test Fixtures
// =============================================================================

fn config(extra: &str) -> ControllerConfiguration {
    ControllerConfiguration::from_yaml(&format!(
        "apiVersion: metal.provider.extensions.config.gardener.cloud/v1alpha1\n\
         kind: ControllerConfiguration\n{extra}"
    ))
    .expect("valid configuration")
}

fn images() -> ImageVector {
    ImageVector::from_yaml(concat!(
        "images:\n",
        "- name: auditforwarder\n",
        "  repository: ghcr.io/metal-stack/auditforwarder\n",
        "  tag: v0.4.2\n",
    ))
    .expect("valid image vector")
}

fn cluster(feature_gates: serde_json::Value) -> Cluster {
    Cluster::new(
        NAMESPACE,
        ClusterSpec {
            shoot: json!({
                "metadata": {"name": "name", "namespace": "garden-prj"},
                "spec": {
                    "kubernetes": {"version": "1.32.2"},
                    "networking": {"type": "calico", "nodes": "10.0.0.0/24"},
                    "provider": {
                        "type": "metal",
                        "controlPlaneConfig": {"featureGates": feature_gates}
                    }
                }
            }),
            ..Default::default()
        },
    )
}

fn cloudprovider_secret() -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some("cloudprovider".to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "metalAPIHMac".to_string(),
            ByteString(b"hmac".to_vec()),
        )])),
        ..Default::default()
    }
}

fn client_secret(name: &str, issued_at: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([
                ("name".to_string(), "audittailer-client".to_string()),
                ("issued-at-time".to_string(), issued_at.to_string()),
            ])),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A seed that knows the shoot's cluster, credentials and audit client certs
fn seed(cluster: Cluster) -> MockSeedClient {
    let mut seed = MockSeedClient::new();
    seed.expect_get_cluster()
        .returning(move |_| Ok(Some(cluster.clone())));
    seed.expect_get_secret()
        .withf(|ns, name| ns == NAMESPACE && name == "cloudprovider")
        .returning(|_, _| Ok(Some(cloudprovider_secret())));
    seed.expect_list_secrets()
        .withf(|ns, selector| ns == NAMESPACE && selector == "name=audittailer-client")
        .returning(|_, _| {
            Ok(vec![
                client_secret("audittailer-client-old", "1700000000"),
                client_secret("audittailer-client-new", "1700090000"),
            ])
        });
    seed
}

fn context(config: ControllerConfiguration, seed: MockSeedClient) -> MutationContext {
    MutationContext::new(Arc::new(config), Arc::new(images()), Arc::new(seed), NAMESPACE)
}

fn apiserver(volumes: Vec<Volume>, extra_containers: Vec<Container>) -> MutableObject {
    let mut containers = vec![Container {
        name: "kube-apiserver".to_string(),
        command: Some(vec![
            "/usr/local/bin/kube-apiserver".to_string(),
            "--enable-admission-plugins=NodeRestriction".to_string(),
        ]),
        ..Default::default()
    }];
    containers.extend(extra_containers);

    MutableObject::Deployment(Box::new(Deployment {
        metadata: ObjectMeta {
            name: Some("kube-apiserver".to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers,
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    }))
}

fn konnectivity_server() -> Container {
    let port = |name: &str, p: i32| ContainerPort {
        name: Some(name.to_string()),
        container_port: p,
        host_port: Some(p),
        ..Default::default()
    };
    Container {
        name: "konnectivity-server".to_string(),
        ports: Some(vec![port("adminport", 8132), port("healthport", 8133)]),
        liveness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                host: Some("127.0.0.1".to_string()),
                path: Some("/healthz".to_string()),
                port: IntOrString::Int(8133),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn etcd_main(capacity: Option<&str>, class: Option<&str>) -> MutableObject {
    let mut etcd = Etcd::new(
        ETCD_MAIN,
        EtcdSpec {
            storage_capacity: capacity.map(|c| Quantity(c.to_string())),
            storage_class: class.map(str::to_string),
            ..Default::default()
        },
    );
    etcd.metadata.namespace = Some(NAMESPACE.to_string());
    MutableObject::Etcd(Box::new(etcd))
}

fn pod(obj: &MutableObject) -> &PodSpec {
    match obj {
        MutableObject::Deployment(d) => d.spec.as_ref().unwrap().template.spec.as_ref().unwrap(),
        other => panic!("expected deployment, got {}", other.kind()),
    }
}

fn container<'a>(pod: &'a PodSpec, name: &str) -> Option<&'a Container> {
    pod.containers.iter().find(|c| c.name == name)
}

fn volume_names(pod: &PodSpec) -> Vec<&str> {
    pod.volumes
        .iter()
        .flatten()
        .map(|v| v.name.as_str())
        .collect()
}

fn env_value<'a>(c: &'a Container, name: &str) -> Option<&'a str> {
    c.env
        .iter()
        .flatten()
        .find(|e| e.name == name)
        .and_then(|e| e.value.as_deref())
}

const SPLUNK_CONFIG: &str = "clusterAudit:\n  enabled: true\nauditToSplunk:\n  enabled: true\n";

// =============================================================================
// kube-apiserver
// =============================================================================

/// Story: token authentication is switched on for the landscape; a shoot
/// without audit gets only the cloud provider flag and the webhook wiring.
#[tokio::test]
async fn story_apiserver_with_auth_and_no_audit() {
    let ctx = context(
        config("auth:\n  enabled: true\n  providerTenant: acme\n"),
        seed(cluster(json!({}))),
    );
    let mut obj = apiserver(vec![], vec![]);

    ControlPlaneMutator.handle(&ctx, &mut obj, None).await.unwrap();

    let p = pod(&obj);
    let apiserver = container(p, "kube-apiserver").unwrap();
    assert_eq!(
        apiserver.command.as_deref().unwrap(),
        [
            "/usr/local/bin/kube-apiserver",
            "--enable-admission-plugins=NodeRestriction",
            "--cloud-provider=external",
            concat!(
                "--authentication-token-webhook-config-file=",
                "/etc/webhook/config/authn-webhook-config.json",
            ),
        ]
    );
    let volumes = volume_names(p);
    assert!(volumes.contains(&"authn-webhook-config"));
    assert!(volumes.contains(&"kube-jwt-authn-webhook-server"));
    assert!(container(p, "auditforwarder").is_none());
}

/// Story: a shoot opts into cluster audit with splunk while the host runs
/// konnectivity over a unix socket; the sidecar tunnels through it.
#[tokio::test]
async fn story_apiserver_with_audit_splunk_and_konnectivity() {
    let ctx = context(
        config(SPLUNK_CONFIG),
        seed(cluster(json!({"clusterAudit": true, "auditToSplunk": true}))),
    );
    let uds = Volume {
        name: "konnectivity-uds".to_string(),
        empty_dir: Some(Default::default()),
        ..Default::default()
    };
    let mut obj = apiserver(vec![uds], vec![]);

    ControlPlaneMutator.handle(&ctx, &mut obj, None).await.unwrap();

    let p = pod(&obj);
    let command = container(p, "kube-apiserver").unwrap().command.clone().unwrap();
    let policy_flag = "--audit-policy-file=/etc/kubernetes/audit-override/audit-policy.yaml";
    assert!(command.contains(&policy_flag.to_string()));
    assert!(command.contains(&"--audit-log-path=/auditlog/audit.log".to_string()));

    let forwarder = container(p, "auditforwarder").expect("sidecar injected");
    assert_eq!(
        forwarder.image.as_deref(),
        Some("ghcr.io/metal-stack/auditforwarder:v0.4.2")
    );
    assert_eq!(
        env_value(forwarder, "AUDIT_KONNECTIVITY_UDS_SOCKET"),
        Some("/konnectivity-uds/konnectivity-server.socket")
    );
    let hec_token = forwarder
        .env
        .iter()
        .flatten()
        .find(|e| e.name == "SPLUNK_HEC_TOKEN")
        .and_then(|e| e.value_from.as_ref())
        .and_then(|s| s.secret_key_ref.as_ref())
        .expect("token from secret");
    assert_eq!(hec_token.name, "splunk-secret");
    assert_eq!(hec_token.key, "hec_token");

    let mounts: Vec<_> = forwarder
        .volume_mounts
        .iter()
        .flatten()
        .map(|m| m.name.as_str())
        .collect();
    for name in ["konnectivity-uds", "splunk-config", "splunk-secret"] {
        assert!(mounts.contains(&name), "missing mount {name}");
    }

    let projected = p
        .volumes
        .iter()
        .flatten()
        .find(|v| v.name == "auditforwarder-shootaccess")
        .and_then(|v| v.projected.as_ref())
        .expect("shoot access volume");
    let secrets: Vec<_> = projected
        .sources
        .iter()
        .flatten()
        .filter_map(|s| s.secret.as_ref().map(|s| s.name.as_str()))
        .collect();
    assert!(secrets.contains(&"audittailer-client-new"));
}

/// Story: the host exposes konnectivity ports on the node; the webhook makes
/// them pod-local so several apiservers can share a node.
#[tokio::test]
async fn story_konnectivity_ports_are_made_local() {
    let ctx = context(config(""), seed(cluster(json!({}))));
    let mut obj = apiserver(vec![], vec![konnectivity_server()]);

    ControlPlaneMutator.handle(&ctx, &mut obj, None).await.unwrap();

    let server = container(pod(&obj), "konnectivity-server").unwrap();
    for port in server.ports.iter().flatten() {
        assert_eq!(port.host_port.unwrap_or(0), 0, "port {:?}", port.name);
    }
    let http_get = server.liveness_probe.as_ref().unwrap().http_get.as_ref().unwrap();
    assert_eq!(http_get.host.as_deref().unwrap_or(""), "");
}

// =============================================================================
// Containerd mirrors
// =============================================================================

/// Story: a partition gets a registry mirror for quay.io while the node
/// already has a config for eu.gcr.io.
#[test]
fn story_registry_mirror_is_added_next_to_existing_upstream() {
    let mirror = RegistryMirror {
        name: "registry-a".to_string(),
        endpoint: "https://registry-a".to_string(),
        ip: "10.1.0.1".to_string(),
        port: 443,
        mirror_of: vec!["quay.io".to_string()],
    };
    let raw = json!({
        "upstream": "eu.gcr.io",
        "server": "https://eu.gcr.io",
        "hosts": [{"url": "https://eu.gcr.io", "overridePath": true}],
        "mirrorPolicy": "fallback"
    });
    let existing: RegistryConfig = serde_json::from_value(raw.clone()).unwrap();

    let out = ensure_containerd_registries(&[mirror], &[existing]);

    let unrelated = out.iter().find(|c| c.upstream == "eu.gcr.io").expect("eu.gcr.io config");
    assert_eq!(serde_json::to_value(unrelated).unwrap(), raw);
    let quay = out.iter().find(|c| c.upstream == "quay.io").expect("quay.io config");
    assert_eq!(
        quay.hosts,
        vec![RegistryHost {
            url: "https://registry-a".to_string(),
            capabilities: vec![RegistryCapability::Pull, RegistryCapability::Resolve],
            ..Default::default()
        }]
    );
    assert_eq!(quay.readiness_probe, Some(false));
}

// =============================================================================
// etcd
// =============================================================================

const ETCD_CONFIG: &str = concat!(
    "etcd:\n",
    "  storage:\n",
    "    capacity: 20Gi\n",
    "    className: premium\n",
    "  backup:\n",
    "    schedule: \"0 */24 * * *\"\n",
    "    deltaSnapshotPeriod: 5m\n",
);

fn etcd_spec(obj: &MutableObject) -> &EtcdSpec {
    match obj {
        MutableObject::Etcd(e) => &e.spec,
        other => panic!("expected etcd, got {}", other.kind()),
    }
}

/// Story: a new shoot's main etcd is created with the landscape's storage
/// and backup settings.
#[tokio::test]
async fn story_new_etcd_follows_configuration() {
    let ctx = context(config(ETCD_CONFIG), MockSeedClient::new());
    let mut obj = etcd_main(None, None);

    SeedProviderMutator.handle(&ctx, &mut obj, None).await.unwrap();

    let spec = etcd_spec(&obj);
    assert_eq!(spec.storage_capacity, Some(Quantity("20Gi".to_string())));
    assert_eq!(spec.storage_class.as_deref(), Some("premium"));
    let backup = spec.backup.as_ref().unwrap();
    assert_eq!(backup.full_snapshot_schedule.as_deref(), Some("0 */24 * * *"));
    assert_eq!(backup.delta_snapshot_period.as_deref(), Some("5m0s"));
}

/// Story: the landscape changes its storage defaults; existing etcds keep
/// their volumes but pick up the new backup settings.
#[tokio::test]
async fn story_existing_etcd_keeps_its_storage() {
    let ctx = context(config(ETCD_CONFIG), MockSeedClient::new());
    let old = etcd_main(Some("10Gi"), Some("standard"));
    let mut obj = etcd_main(Some("20Gi"), Some("premium"));

    SeedProviderMutator.handle(&ctx, &mut obj, Some(&old)).await.unwrap();

    let spec = etcd_spec(&obj);
    assert_eq!(spec.storage_capacity, Some(Quantity("10Gi".to_string())));
    assert_eq!(spec.storage_class.as_deref(), Some("standard"));
    let backup = spec.backup.as_ref().unwrap();
    assert_eq!(backup.full_snapshot_schedule.as_deref(), Some("0 */24 * * *"));
    assert_eq!(backup.delta_snapshot_period.as_deref(), Some("5m0s"));
}

// =============================================================================
// Exposure
// =============================================================================

/// Story: the apiserver's load balancer got an address and the apiserver
/// starts advertising it.
#[tokio::test]
async fn story_apiserver_advertises_load_balancer() {
    use k8s_openapi::api::core::v1::{
        LoadBalancerIngress, LoadBalancerStatus, Service, ServiceStatus,
    };

    let mut seed = MockSeedClient::new();
    seed.expect_get_service()
        .withf(|ns, name| ns == NAMESPACE && name == "kube-apiserver")
        .returning(|_, _| {
            Ok(Some(Service {
                status: Some(ServiceStatus {
                    load_balancer: Some(LoadBalancerStatus {
                        ingress: Some(vec![LoadBalancerIngress {
                            ip: Some("212.34.1.10".to_string()),
                            ..Default::default()
                        }]),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }))
        });
    let ctx = context(config(""), seed);
    let mut obj = apiserver(vec![], vec![]);

    ExposureMutator.handle(&ctx, &mut obj, None).await.unwrap();

    let command = container(pod(&obj), "kube-apiserver").unwrap().command.clone().unwrap();
    assert!(command.contains(&"--advertise-address=212.34.1.10".to_string()));
    assert!(command.contains(&"--external-hostname=212.34.1.10".to_string()));
}

// =============================================================================
// Properties
// =============================================================================

/// Mutating an already mutated object changes nothing, byte for byte
#[tokio::test]
async fn story_every_mutation_is_idempotent() {
    let uds = Volume {
        name: "konnectivity-uds".to_string(),
        ..Default::default()
    };
    let cases: Vec<(Box<dyn Mutator>, MutableObject, ControllerConfiguration)> = vec![
        (
            Box::new(ControlPlaneMutator),
            apiserver(vec![uds], vec![konnectivity_server()]),
            config(SPLUNK_CONFIG),
        ),
        (
            Box::new(SeedProviderMutator),
            etcd_main(None, None),
            config(ETCD_CONFIG),
        ),
        (
            Box::new(CloudProviderSecretMutator),
            MutableObject::Secret(Box::new(cloudprovider_secret())),
            config(""),
        ),
    ];

    for (mutator, mut obj, cfg) in cases {
        let ctx = context(
            cfg,
            seed(cluster(json!({"clusterAudit": true, "auditToSplunk": true}))),
        );
        mutator.handle(&ctx, &mut obj, None).await.unwrap();
        let once = serde_json::to_vec(&obj.to_value().unwrap()).unwrap();

        mutator.handle(&ctx, &mut obj, None).await.unwrap();
        let twice = serde_json::to_vec(&obj.to_value().unwrap()).unwrap();
        assert_eq!(once, twice, "{} is not idempotent", mutator.name());
    }
}

/// Objects on their way out are admitted exactly as sent
#[tokio::test]
async fn story_deleting_objects_pass_through() {
    let deleted_at = Some(Time(chrono::Utc::now()));

    let mut deployment = apiserver(vec![], vec![konnectivity_server()]);
    if let MutableObject::Deployment(d) = &mut deployment {
        d.metadata.deletion_timestamp = deleted_at.clone();
    }
    let mut etcd = etcd_main(None, None);
    if let MutableObject::Etcd(e) = &mut etcd {
        e.metadata.deletion_timestamp = deleted_at.clone();
    }
    let mut secret = cloudprovider_secret();
    secret.metadata.deletion_timestamp = deleted_at.clone();

    let cases: Vec<(Box<dyn Mutator>, MutableObject)> = vec![
        (Box::new(ControlPlaneMutator), deployment.clone()),
        (Box::new(ExposureMutator), deployment.clone()),
        (Box::new(SeedProviderMutator), etcd.clone()),
        (Box::new(ExposureMutator), etcd),
        (Box::new(CloudProviderSecretMutator), MutableObject::Secret(Box::new(secret))),
        (Box::new(ShootMutator), deployment),
    ];

    for (mutator, obj) in cases {
        // No expectations: any seed access fails the test
        let ctx = context(config(ETCD_CONFIG), MockSeedClient::new());
        let mut mutated = obj.clone();
        mutator.handle(&ctx, &mut mutated, None).await.unwrap();
        assert_eq!(mutated, obj, "{} changed a deleting object", mutator.name());
    }
}

/// The credentials secret always ends up with exactly the machine finalizer
#[tokio::test]
async fn story_cloudprovider_secret_gets_machine_finalizer() {
    let ctx = context(config(""), MockSeedClient::new());
    let mut secret = cloudprovider_secret();
    secret.metadata.finalizers = Some(vec!["other/finalizer".to_string()]);
    let mut obj = MutableObject::Secret(Box::new(secret));

    CloudProviderSecretMutator.handle(&ctx, &mut obj, None).await.unwrap();

    assert_eq!(
        obj.meta().finalizers.as_deref(),
        Some(&["machine.sapcloud.io/machine-controller".to_string()][..])
    );
}
