//! konnectivity-server container of the kube-apiserver pod
//!
//! The host exposes the admin and health ports on the node. Metal seeds run
//! several apiservers per node, so those host ports collide and are dropped,
//! together with the liveness probe's host override.

use k8s_openapi::api::core::v1::PodSpec;

use crate::ensure::find_with_name_mut;

/// konnectivity-server container name
pub const KONNECTIVITY_SERVER_CONTAINER: &str = "konnectivity-server";

const LOCAL_PORTS: [&str; 2] = ["adminport", "healthport"];

/// Clear host ports and the liveness probe host of konnectivity-server
///
/// Returns false when the pod has no such container.
pub fn ensure_konnectivity_server(pod: &mut PodSpec) -> bool {
    let Some(container) = find_with_name_mut(&mut pod.containers, KONNECTIVITY_SERVER_CONTAINER)
    else {
        return false;
    };

    for port in container.ports.iter_mut().flatten() {
        if LOCAL_PORTS.contains(&port.name.as_deref().unwrap_or_default()) {
            port.host_port = None;
        }
    }

    if let Some(http_get) = container
        .liveness_probe
        .as_mut()
        .and_then(|p| p.http_get.as_mut())
    {
        http_get.host = None;
    }
    true
}
