//! containerd registry mirrors from the partition's network isolation

use std::collections::HashSet;

use metal_common::crd::{RegistryCapability, RegistryConfig, RegistryHost, RegistryMirror};

/// Merge the partition's registry mirrors into existing registry configs
///
/// Every upstream a mirror stands in for gets a config pointing at the mirror
/// endpoint. An existing config for such an upstream keeps its place; its
/// hosts are replaced only when none of them is the mirror endpoint. Configs
/// for unrelated upstreams are kept unchanged, new ones are appended in mirror
/// order. When two mirrors claim the same upstream the first one wins.
pub fn ensure_containerd_registries(
    mirrors: &[RegistryMirror],
    configs: &[RegistryConfig],
) -> Vec<RegistryConfig> {
    let mut seen = HashSet::new();
    let desired: Vec<RegistryConfig> = mirrors
        .iter()
        .flat_map(|m| m.mirror_of.iter().map(move |upstream| (upstream, m)))
        .filter(|(upstream, _)| seen.insert(upstream.as_str()))
        .map(|(upstream, mirror)| RegistryConfig {
            upstream: upstream.clone(),
            server: None,
            hosts: vec![RegistryHost {
                url: mirror.endpoint.clone(),
                capabilities: vec![RegistryCapability::Pull, RegistryCapability::Resolve],
                ca_certs: Vec::new(),
                ..Default::default()
            }],
            readiness_probe: Some(false),
            ..Default::default()
        })
        .collect();

    let mut result: Vec<RegistryConfig> = configs
        .iter()
        .map(|existing| {
            let Some(want) = desired.iter().find(|d| d.upstream == existing.upstream) else {
                return existing.clone();
            };
            let endpoint = &want.hosts[0].url;
            if existing.hosts.iter().any(|h| &h.url == endpoint) {
                existing.clone()
            } else {
                RegistryConfig {
                    hosts: want.hosts.clone(),
                    ..existing.clone()
                }
            }
        })
        .collect();

    for want in desired {
        if !configs.iter().any(|c| c.upstream == want.upstream) {
            result.push(want);
        }
    }
    result
}
