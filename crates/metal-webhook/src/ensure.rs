//! Upsert and removal helpers for object lists
//!
//! Kubernetes pod specs keep containers, volumes, mounts and env vars in
//! ordered lists keyed by name. Every helper here treats the first entry with
//! a name as the authoritative one: setting replaces that entry in place (or
//! appends), removing drops every entry with the name. Order of the remaining
//! entries is never changed, so applying the same helper twice yields the same
//! list.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, ContainerPort, EnvVar, Volume, VolumeMount};

/// A list element identified by its name
pub trait Named {
    /// The element's name
    fn name(&self) -> &str;
}

impl Named for Container {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Volume {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for VolumeMount {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for EnvVar {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for ContainerPort {
    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

/// Replace the first element named like `item`, or append it
pub fn ensure_with_name<T: Named>(items: &mut Vec<T>, item: T) {
    match items.iter().position(|i| i.name() == item.name()) {
        Some(idx) => items[idx] = item,
        None => items.push(item),
    }
}

/// Remove every element named `name`
pub fn ensure_no_with_name<T: Named>(items: &mut Vec<T>, name: &str) {
    items.retain(|i| i.name() != name);
}

/// Mutable access to the first element named `name`
pub fn find_with_name_mut<'a, T: Named>(items: &'a mut [T], name: &str) -> Option<&'a mut T> {
    items.iter_mut().find(|i| i.name() == name)
}

/// Shared access to the first element named `name`
pub fn find_with_name<'a, T: Named>(items: &'a [T], name: &str) -> Option<&'a T> {
    items.iter().find(|i| i.name() == name)
}

/// Upsert a container by name
pub fn ensure_container_with_name(items: &mut Vec<Container>, container: Container) {
    ensure_with_name(items, container)
}

/// Remove containers by name
pub fn ensure_no_container_with_name(items: &mut Vec<Container>, name: &str) {
    ensure_no_with_name(items, name)
}

/// Upsert a volume by name
pub fn ensure_volume_with_name(items: &mut Vec<Volume>, volume: Volume) {
    ensure_with_name(items, volume)
}

/// Remove volumes by name
pub fn ensure_no_volume_with_name(items: &mut Vec<Volume>, name: &str) {
    ensure_no_with_name(items, name)
}

/// Upsert a volume mount by name
pub fn ensure_volume_mount_with_name(items: &mut Vec<VolumeMount>, mount: VolumeMount) {
    ensure_with_name(items, mount)
}

/// Remove volume mounts by name
pub fn ensure_no_volume_mount_with_name(items: &mut Vec<VolumeMount>, name: &str) {
    ensure_no_with_name(items, name)
}

/// Upsert an env var by name
pub fn ensure_env_var_with_name(items: &mut Vec<EnvVar>, env: EnvVar) {
    ensure_with_name(items, env)
}

/// Remove env vars by name
pub fn ensure_no_env_var_with_name(items: &mut Vec<EnvVar>, name: &str) {
    ensure_no_with_name(items, name)
}

/// Set the first entry starting with `prefix` to `value`
///
/// `value` is expected to start with `prefix`. Only the first matching entry
/// is replaced; every other entry keeps its value and position. Without a
/// match the value is appended.
pub fn ensure_string_with_prefix(items: &mut Vec<String>, prefix: &str, value: &str) {
    match items.iter().position(|item| item.starts_with(prefix)) {
        Some(i) => value.clone_into(&mut items[i]),
        None => items.push(value.to_string()),
    }
}

/// Remove every entry starting with `prefix`
pub fn ensure_no_string_with_prefix(items: &mut Vec<String>, prefix: &str) {
    items.retain(|item| !item.starts_with(prefix));
}

/// Set an annotation or label key, creating the map when absent
pub fn ensure_annotation_or_label(
    map: &mut Option<BTreeMap<String, String>>,
    key: &str,
    value: &str,
) {
    map.get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
}

/// Remove an empty optional list so absent and empty stay the same thing
pub(crate) fn prune_empty<T>(items: &mut Option<Vec<T>>) {
    if items.as_ref().is_some_and(Vec::is_empty) {
        *items = None;
    }
}
