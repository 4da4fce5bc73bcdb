//! Version-to-image-tag resolution.
//!
//! Two strategies produce the tag of every component a release needs:
//!
//! - **Declarative tool**: ask `kubeadm config images list` for the exact
//!   image list. Authoritative, but only available where kubeadm is installed.
//! - **Remote constants**: download kubeadm's `constants.go` for the release
//!   and read the CoreDNS, etcd and pause versions from it; every other
//!   component is tagged with the Kubernetes version.
//!
//! [`Resolver::resolve`] is the single place that picks between them.

use std::sync::{Arc, LazyLock};

use semver::{BuildMetadata, Prerelease, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::component::{
    kube_versioned_components, ImagePrefixMap, ImageTagMap, COREDNS, ETCD, PAUSE,
};
use crate::constants::{constants_url, parse_constants, ComponentConstants, DEFAULT_CONSTANTS_URL};
use crate::exec::{CommandError, CommandRunner};
use crate::fetch::{FetchError, TextFetcher};
use crate::version::TargetVersion;

/// Default declarative image-list tool.
pub const DEFAULT_DECLARATIVE_TOOL: &str = "kubeadm";

/// Pause tag used when a release's constants do not declare one (older
/// branches lack the constant).
pub const DEFAULT_PAUSE_TAG: &str = "3.1";

/// CoreDNS image path from v1.21.0-alpha.1 onwards.
pub const COREDNS_NESTED_PATH: &str = "coredns/coredns";

/// First release publishing CoreDNS as `coredns/coredns`.
static COREDNS_NESTED_SINCE: LazyLock<Version> = LazyLock::new(|| Version {
    pre: Prerelease::new("alpha.1").expect("pre-release literal is valid"),
    build: BuildMetadata::EMPTY,
    ..Version::new(1, 21, 0)
});

/// CoreDNS image path for a release.
pub fn coredns_path(version: &TargetVersion) -> &'static str {
    if version.at_least(&COREDNS_NESTED_SINCE) {
        COREDNS_NESTED_PATH
    } else {
        COREDNS
    }
}

/// How a resolution was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    DeclarativeTool,
    RemoteConstants,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeclarativeTool => write!(f, "declarative tool"),
            Self::RemoteConstants => write!(f, "remote constants"),
        }
    }
}

/// Resolved tags for a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub tags: ImageTagMap,
    /// Empty unless resolved via the declarative tool.
    pub prefixes: ImagePrefixMap,
    pub strategy: Strategy,
}

/// Declarative tool failures. These trigger the remote constants fallback.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("{tool} is not installed")]
    ToolMissing { tool: String },

    #[error("{tool} failed: {source}")]
    Command {
        tool: String,
        #[source]
        source: CommandError,
    },

    #[error("{tool} output is not a valid image list: {source}")]
    Decode {
        tool: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{tool} listed a malformed image reference: {image:?}")]
    MalformedImage { tool: String, image: String },

    #[error("{tool} output is missing components: {}", missing.join(", "))]
    MissingComponents { tool: String, missing: Vec<String> },
}

/// Resolution failures. Fatal for the run.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to fetch component versions: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("at least one image version could not be set ({}) from {url}", missing.join(", "))]
    MissingVersions { url: String, missing: Vec<String> },
}

/// Resolver settings.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Declarative image-list tool binary.
    pub declarative_tool: String,

    /// Constants URL template (`{version}` placeholder).
    pub constants_url: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            declarative_tool: DEFAULT_DECLARATIVE_TOOL.to_string(),
            constants_url: DEFAULT_CONSTANTS_URL.to_string(),
        }
    }
}

/// `kubeadm config images list -o=json` output.
#[derive(Debug, Deserialize)]
struct ImageList {
    images: Vec<String>,
}

/// Split `<prefix-path>/<component>:<tag>` into its three parts.
///
/// The prefix is everything before the last `/` (empty when there is none).
pub fn split_image(image: &str) -> Option<(&str, &str, &str)> {
    let (prefix, name) = image.rsplit_once('/').unwrap_or(("", image));
    let (component, tag) = name.split_once(':')?;
    if component.is_empty() || tag.is_empty() {
        return None;
    }
    Some((prefix, component, tag))
}

/// Build the tag map from parsed constants.
///
/// CoreDNS is keyed by its release-specific path while validating and
/// renamed to the bare component name afterwards.
pub fn tags_from_constants(
    version: &TargetVersion,
    constants: ComponentConstants,
    url: &str,
) -> Result<ImageTagMap, ResolveError> {
    let kube_tag = version.to_string();
    let mut tags = ImageTagMap::new();
    for component in kube_versioned_components(version) {
        tags.insert(component, kube_tag.as_str());
    }

    let coredns_key = coredns_path(version);
    if let Some(tag) = constants.coredns {
        tags.insert(coredns_key, tag);
    }
    if let Some(tag) = constants.etcd {
        tags.insert(ETCD, tag);
    }
    tags.insert(
        PAUSE,
        constants
            .pause
            .unwrap_or_else(|| DEFAULT_PAUSE_TAG.to_string()),
    );

    debug!(version = %version, tags = ?tags, "Parsed component versions");

    let missing: Vec<String> = [(coredns_key, COREDNS), (ETCD, ETCD)]
        .into_iter()
        .filter(|(key, _)| tags.get(key).is_none_or(str::is_empty))
        .map(|(_, component)| component.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ResolveError::MissingVersions {
            url: url.to_string(),
            missing,
        });
    }

    if let Some(tag) = tags.remove(COREDNS_NESTED_PATH) {
        tags.insert(COREDNS, tag);
    }
    Ok(tags)
}

/// Resolves component image tags for a release.
#[derive(Clone)]
pub struct Resolver {
    runner: Arc<dyn CommandRunner>,
    fetcher: Arc<dyn TextFetcher>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        fetcher: Arc<dyn TextFetcher>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            runner,
            fetcher,
            config,
        }
    }

    /// Resolve every component tag for `version`.
    ///
    /// The declarative tool is preferred when installed. Any failure there
    /// falls back to the remote constants; a remote failure is final.
    pub async fn resolve(&self, version: &TargetVersion) -> Result<Resolution, ResolveError> {
        match self.via_declarative_tool(version).await {
            Ok(resolution) => {
                info!(
                    version = %version,
                    tool = %self.config.declarative_tool,
                    components = resolution.tags.len(),
                    "Resolved component images via declarative tool"
                );
                return Ok(resolution);
            }
            Err(StrategyError::ToolMissing { tool }) => {
                info!(tool = %tool, "Declarative tool not installed, using remote constants");
            }
            Err(e) => {
                warn!(error = %e, "Declarative tool failed, falling back to remote constants");
            }
        }

        let resolution = self.via_remote_constants(version).await?;
        info!(
            version = %version,
            components = resolution.tags.len(),
            "Resolved component images via remote constants"
        );
        Ok(resolution)
    }

    /// List images with the declarative tool.
    pub async fn via_declarative_tool(
        &self,
        version: &TargetVersion,
    ) -> Result<Resolution, StrategyError> {
        let tool = self.config.declarative_tool.as_str();
        if self.runner.look_path(tool).is_none() {
            return Err(StrategyError::ToolMissing {
                tool: tool.to_string(),
            });
        }

        let version_arg = format!("--kubernetes-version={version}");
        let output = self
            .runner
            .run(tool, &["config", "images", "list", &version_arg, "-o=json"])
            .await
            .map_err(|source| StrategyError::Command {
                tool: tool.to_string(),
                source,
            })?;

        let list: ImageList =
            serde_json::from_str(&output.stdout).map_err(|source| StrategyError::Decode {
                tool: tool.to_string(),
                source,
            })?;

        let mut tags = ImageTagMap::new();
        let mut prefixes = ImagePrefixMap::new();
        for image in &list.images {
            let (prefix, component, tag) =
                split_image(image).ok_or_else(|| StrategyError::MalformedImage {
                    tool: tool.to_string(),
                    image: image.clone(),
                })?;
            prefixes.insert(component.to_string(), prefix.to_string());
            tags.insert(component, tag);
        }

        // kubeadm stopped listing hyperkube and cloud-controller-manager long
        // before they were retired; both always carry the Kubernetes version.
        let kube_tag = version.to_string();
        for component in kube_versioned_components(version) {
            if !tags.contains(component) {
                tags.insert(component, kube_tag.as_str());
            }
        }

        let missing = tags.missing_for(version);
        if !missing.is_empty() {
            return Err(StrategyError::MissingComponents {
                tool: tool.to_string(),
                missing,
            });
        }

        Ok(Resolution {
            tags,
            prefixes,
            strategy: Strategy::DeclarativeTool,
        })
    }

    /// Read tags from the release's kubeadm constants.
    pub async fn via_remote_constants(
        &self,
        version: &TargetVersion,
    ) -> Result<Resolution, ResolveError> {
        let url = constants_url(&self.config.constants_url, version);
        info!(url = %url, "Fetching component versions");

        let text = self
            .fetcher
            .fetch(&url)
            .await
            .map_err(|source| ResolveError::Fetch {
                url: url.clone(),
                source,
            })?;

        let tags = tags_from_constants(version, parse_constants(&text), &url)?;
        Ok(Resolution {
            tags,
            prefixes: ImagePrefixMap::new(),
            strategy: Strategy::RemoteConstants,
        })
    }
}
