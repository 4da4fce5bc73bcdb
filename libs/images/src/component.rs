//! Component names and the per-release component set.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::version::TargetVersion;

pub const KUBE_APISERVER: &str = "kube-apiserver";
pub const KUBE_CONTROLLER_MANAGER: &str = "kube-controller-manager";
pub const KUBE_SCHEDULER: &str = "kube-scheduler";
pub const KUBE_PROXY: &str = "kube-proxy";
pub const ETCD: &str = "etcd";
pub const PAUSE: &str = "pause";
pub const COREDNS: &str = "coredns";
pub const HYPERKUBE: &str = "hyperkube";
pub const CLOUD_CONTROLLER_MANAGER: &str = "cloud-controller-manager";

/// Returns true if the release still ships the `hyperkube` image (removed in v1.17).
pub fn has_hyperkube(version: &TargetVersion) -> bool {
    version.major() == 1 && version.minor() < 17
}

/// Returns true if the release still ships `cloud-controller-manager` (removed in v1.16).
pub fn has_cloud_controller_manager(version: &TargetVersion) -> bool {
    version.major() == 1 && version.minor() < 16
}

/// Components whose image tag is the Kubernetes version itself.
pub fn kube_versioned_components(version: &TargetVersion) -> Vec<&'static str> {
    let mut components = vec![
        KUBE_APISERVER,
        KUBE_CONTROLLER_MANAGER,
        KUBE_SCHEDULER,
        KUBE_PROXY,
    ];
    if has_hyperkube(version) {
        components.push(HYPERKUBE);
    }
    if has_cloud_controller_manager(version) {
        components.push(CLOUD_CONTROLLER_MANAGER);
    }
    components
}

/// Every component image a release needs.
pub fn component_set(version: &TargetVersion) -> BTreeSet<&'static str> {
    let mut set: BTreeSet<&'static str> = kube_versioned_components(version).into_iter().collect();
    set.extend([ETCD, PAUSE, COREDNS]);
    set
}

/// Registry path prefix each component was published under, keyed by
/// component name (e.g. `coredns` -> `registry.k8s.io/coredns`).
pub type ImagePrefixMap = BTreeMap<String, String>;

/// Component name to image tag.
///
/// Keys are bare component names. After resolution every member of the
/// release's [`component_set`] is present with a non-empty tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ImageTagMap(BTreeMap<String, String>);

impl ImageTagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, component: impl Into<String>, tag: impl Into<String>) {
        self.0.insert(component.into(), tag.into());
    }

    pub fn remove(&mut self, component: &str) -> Option<String> {
        self.0.remove(component)
    }

    pub fn get(&self, component: &str) -> Option<&str> {
        self.0.get(component).map(String::as_str)
    }

    pub fn contains(&self, component: &str) -> bool {
        self.0.contains_key(component)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(component, tag)` pairs in component name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(c, t)| (c.as_str(), t.as_str()))
    }

    /// Members of the release's component set that are absent or have an
    /// empty tag.
    pub fn missing_for(&self, version: &TargetVersion) -> Vec<String> {
        component_set(version)
            .into_iter()
            .filter(|c| self.get(c).is_none_or(str::is_empty))
            .map(str::to_string)
            .collect()
    }
}

impl FromIterator<(String, String)> for ImageTagMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
