//! Configuration loading and merging.
//!
//! Values come from three layers, highest precedence first:
//! - command-line flags and `KMIRROR_*` environment variables
//! - `config.json` in the platform config directory (or `--config <path>`)
//! - built-in defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use kmirror_images::{FetchConfig, MirrorConfig, SyncPolicy};
use serde::{Deserialize, Serialize};

use crate::error::CliError;

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("io", "kmirror", "kmirror")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// Location of the default config file.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// On-disk configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_registry: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_registry: Option<String>,

    /// Container engine binary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,

    /// kubeadm binary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeadm: Option<String>,

    /// `constants.go` URL template containing `{version}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constants_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_retries: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_on_first_failure: Option<bool>,
}

impl FileConfig {
    /// Load the default config file, or return defaults if it does not exist.
    pub fn load() -> Result<Self> {
        let path = default_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load an explicitly named config file. A missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub source_registry: Option<String>,
    pub mirror_registry: Option<String>,
    pub engine: Option<String>,
    pub kubeadm: Option<String>,
    pub constants_url: Option<String>,
    pub fetch_retries: Option<u32>,
    pub stop_on_first_failure: bool,
}

/// Fully resolved settings for a run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mirror: MirrorConfig,
    pub fetch: FetchConfig,
}

impl Settings {
    /// Merge overrides over the file config over defaults.
    pub fn resolve(overrides: Overrides, file: FileConfig) -> Result<Self, CliError> {
        let mirror_registry = overrides
            .mirror_registry
            .or(file.mirror_registry)
            .map(|host| normalize_host(&host))
            .filter(|host| !host.is_empty())
            .ok_or(CliError::MissingMirrorRegistry)?;

        let mut mirror = MirrorConfig::new(mirror_registry);

        if let Some(source) = overrides.source_registry.or(file.source_registry) {
            let source = normalize_host(&source);
            if source.is_empty() {
                return Err(CliError::InvalidSetting {
                    name: "source_registry",
                    reason: "must not be empty".to_string(),
                });
            }
            mirror.source_registry = source;
        }
        if let Some(engine) = overrides.engine.or(file.engine) {
            mirror.engine = engine;
        }
        if let Some(kubeadm) = overrides.kubeadm.or(file.kubeadm) {
            mirror.declarative_tool = kubeadm;
        }
        if let Some(url) = overrides.constants_url.or(file.constants_url) {
            if !url.contains("{version}") {
                return Err(CliError::InvalidSetting {
                    name: "constants_url",
                    reason: format!("{url:?} has no {{version}} placeholder"),
                });
            }
            mirror.constants_url = url;
        }
        mirror.sync = SyncPolicy {
            stop_on_first_failure: overrides.stop_on_first_failure
                || file.stop_on_first_failure.unwrap_or(false),
        };

        let mut fetch = FetchConfig::default();
        if let Some(retries) = overrides.fetch_retries.or(file.fetch_retries) {
            fetch.retries = retries;
        }
        if let Some(secs) = file.fetch_timeout_secs {
            fetch.timeout = Duration::from_secs(secs);
        }

        Ok(Self { mirror, fetch })
    }
}

/// Registry hosts are joined with `/`, so drop surrounding whitespace and
/// trailing slashes.
fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('/').to_string()
}
