//! Worker OperatingSystemConfig: kubelet unit, kubelet config and registries

use tracing::debug;

use metal_common::crd::{
    ContainerdConfig, CriConfig, OperatingSystemConfig, RegistryMirror, KUBELET_CONFIG_PATH,
    KUBELET_UNIT_NAME,
};
use metal_common::Result;

use super::containerd::ensure_containerd_registries;
use super::kubelet::{ensure_kubelet_configuration, ensure_kubelet_service_unit};

const CRI_CONTAINERD: &str = "containerd";

/// Apply the kubelet and containerd adjustments to an OperatingSystemConfig
pub fn ensure_operating_system_config(
    osc: &mut OperatingSystemConfig,
    mirrors: &[RegistryMirror],
) -> Result<()> {
    let name = osc.metadata.name.clone().unwrap_or_default();

    match osc.spec.units.iter_mut().find(|u| u.name == KUBELET_UNIT_NAME) {
        Some(unit) => match unit.content.as_deref().and_then(ensure_kubelet_service_unit) {
            Some(content) => unit.content = Some(content),
            None => debug!(osc = %name, "kubelet unit has no ExecStart, skipping"),
        },
        None => debug!(osc = %name, "No kubelet unit"),
    }

    if let Some(inline) = osc
        .spec
        .files
        .iter_mut()
        .find(|f| f.path == KUBELET_CONFIG_PATH)
        .and_then(|f| f.content.inline.as_mut())
    {
        if ensure_kubelet_configuration(inline)? {
            debug!(osc = %name, "Removed obsolete kubelet feature gates");
        }
    }

    if !mirrors.is_empty() {
        let cri = osc.spec.cri_config.get_or_insert_with(|| CriConfig {
            name: CRI_CONTAINERD.to_string(),
            ..Default::default()
        });
        let containerd = cri.containerd.get_or_insert_with(ContainerdConfig::default);
        containerd.registries = ensure_containerd_registries(mirrors, &containerd.registries);
    }
    Ok(())
}
