//! End-to-end mirroring pipeline.
//!
//! Normalize -> check engine -> resolve -> locate -> probe -> sync. Each
//! stage consumes the previous stage's value and returns a new one. Stages
//! are public so callers can report progress between them; [`Pipeline::run`]
//! chains them all.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::component::{ImagePrefixMap, ImageTagMap};
use crate::config::MirrorConfig;
use crate::engine::{ContainerEngine, EngineError};
use crate::exec::CommandRunner;
use crate::fetch::TextFetcher;
use crate::locate::{locate, LocatedImages};
use crate::probe::{ExistenceMap, Prober};
use crate::resolve::{Resolution, ResolveError, Resolver, Strategy};
use crate::sync::{SyncReport, Synchronizer};
use crate::version::{TargetVersion, VersionError};

/// Fatal pipeline errors. Per-component sync failures are not errors; they
/// are reported in [`SyncReport`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Environment(#[from] EngineError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Result of a complete run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub version: TargetVersion,
    pub strategy: Strategy,
    pub tags: ImageTagMap,
    #[serde(skip_serializing_if = "ImagePrefixMap::is_empty")]
    pub prefixes: ImagePrefixMap,
    pub sync: SyncReport,
}

/// Wires the stages to their collaborators.
pub struct Pipeline {
    config: MirrorConfig,
    engine: ContainerEngine,
    resolver: Resolver,
}

impl Pipeline {
    pub fn new(
        config: MirrorConfig,
        runner: Arc<dyn CommandRunner>,
        fetcher: Arc<dyn TextFetcher>,
    ) -> Self {
        let engine = ContainerEngine::new(Arc::clone(&runner), config.engine.clone());
        let resolver = Resolver::new(runner, fetcher, config.resolver_config());
        Self {
            config,
            engine,
            resolver,
        }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Fail fast when the container engine cannot be used.
    pub async fn check_environment(&self) -> Result<(), PipelineError> {
        Ok(self.engine.check().await?)
    }

    pub async fn resolve(&self, version: &TargetVersion) -> Result<Resolution, PipelineError> {
        Ok(self.resolver.resolve(version).await?)
    }

    pub fn locate(&self, resolution: &Resolution) -> LocatedImages {
        locate(
            &resolution.tags,
            &self.config.mirror_registry,
            &self.config.source_registry,
        )
    }

    pub async fn probe(&self, located: &LocatedImages) -> ExistenceMap {
        Prober::new(self.engine.clone()).probe(&located.mirror).await
    }

    pub async fn sync(&self, existence: &ExistenceMap, located: &LocatedImages) -> SyncReport {
        Synchronizer::new(self.engine.clone(), self.config.sync)
            .sync(existence, located)
            .await
    }

    /// Run every stage for `input`.
    ///
    /// The version is validated before any process or network activity.
    pub async fn run(&self, input: &str) -> Result<RunReport, PipelineError> {
        let version = TargetVersion::normalize(input)?;
        info!(version = %version, "Starting image mirror run");

        self.check_environment().await?;
        let resolution = self.resolve(&version).await?;
        let located = self.locate(&resolution);
        let existence = self.probe(&located).await;
        let sync = self.sync(&existence, &located).await;

        info!(
            version = %version,
            mirrored = sync.mirrored_count(),
            present = sync.present_count(),
            failed = sync.failed_count(),
            "Image mirror run finished"
        );

        Ok(RunReport {
            version,
            strategy: resolution.strategy,
            tags: resolution.tags,
            prefixes: resolution.prefixes,
            sync,
        })
    }
}
