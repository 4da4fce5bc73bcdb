//! Mirroring configuration.

use crate::constants::DEFAULT_CONSTANTS_URL;
use crate::engine::DEFAULT_ENGINE;
use crate::resolve::{ResolverConfig, DEFAULT_DECLARATIVE_TOOL};
use crate::sync::SyncPolicy;

/// Registry that publishes the upstream images under flat names.
pub const DEFAULT_SOURCE_REGISTRY: &str = "registry.cn-hangzhou.aliyuncs.com/google_containers";

/// Everything a run needs besides the target version.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Registry host (with optional path) to pull images from.
    pub source_registry: String,

    /// Registry host (with optional path) to push images to.
    pub mirror_registry: String,

    /// Docker-compatible engine binary.
    pub engine: String,

    /// Declarative image-list tool binary.
    pub declarative_tool: String,

    /// Constants URL template.
    pub constants_url: String,

    pub sync: SyncPolicy,
}

impl MirrorConfig {
    /// Config with defaults for everything but the mirror registry.
    pub fn new(mirror_registry: impl Into<String>) -> Self {
        Self {
            source_registry: DEFAULT_SOURCE_REGISTRY.to_string(),
            mirror_registry: mirror_registry.into(),
            engine: DEFAULT_ENGINE.to_string(),
            declarative_tool: DEFAULT_DECLARATIVE_TOOL.to_string(),
            constants_url: DEFAULT_CONSTANTS_URL.to_string(),
            sync: SyncPolicy::default(),
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            declarative_tool: self.declarative_tool.clone(),
            constants_url: self.constants_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MirrorConfig::new("docker.io/someone");
        assert_eq!(config.source_registry, DEFAULT_SOURCE_REGISTRY);
        assert_eq!(config.engine, "docker");
        assert!(!config.sync.stop_on_first_failure);
        assert_eq!(config.resolver_config().declarative_tool, "kubeadm");
    }
}
