//! Container engine operations (pull, tag, push).
//!
//! Drives any docker-compatible CLI (`docker`, `podman`, `nerdctl`) through
//! its `image` sub-commands.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::exec::{CommandError, CommandOutput, CommandRunner};
use crate::locate::ImageReference;

/// Default engine binary.
pub const DEFAULT_ENGINE: &str = "docker";

/// Engine availability errors. These abort the run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("container engine {engine:?} is not usable: {source}")]
    Unavailable {
        engine: String,
        #[source]
        source: CommandError,
    },
}

/// Handle to the host container engine.
#[derive(Clone)]
pub struct ContainerEngine {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl std::fmt::Debug for ContainerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerEngine")
            .field("binary", &self.binary)
            .finish_non_exhaustive()
    }
}

impl ContainerEngine {
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    /// Verify the engine CLI is installed and can reach its daemon.
    pub async fn check(&self) -> Result<(), EngineError> {
        self.runner
            .run(&self.binary, &["version"])
            .await
            .map(|_| debug!(engine = %self.binary, "Container engine available"))
            .map_err(|source| EngineError::Unavailable {
                engine: self.binary.clone(),
                source,
            })
    }

    pub async fn pull(&self, image: &ImageReference) -> Result<CommandOutput, CommandError> {
        let reference = image.to_string();
        self.runner
            .run(&self.binary, &["image", "pull", &reference])
            .await
    }

    pub async fn tag(
        &self,
        source: &ImageReference,
        target: &ImageReference,
    ) -> Result<CommandOutput, CommandError> {
        let (source, target) = (source.to_string(), target.to_string());
        self.runner
            .run(&self.binary, &["image", "tag", &source, &target])
            .await
    }

    pub async fn push(&self, image: &ImageReference) -> Result<CommandOutput, CommandError> {
        let reference = image.to_string();
        self.runner
            .run(&self.binary, &["image", "push", &reference])
            .await
    }
}
