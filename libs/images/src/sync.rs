//! Mirror synchronization: pull from source, retag, push to mirror.
//!
//! Components are handled one at a time and independently. A failure in one
//! component never stops the others; failures are collected into the
//! [`SyncReport`] instead of being returned as errors.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::ContainerEngine;
use crate::locate::{ImageReference, LocatedImages};
use crate::probe::{ExistenceMap, Presence};

/// Per-component failure handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncPolicy {
    /// Skip the remaining steps of a component after its first failed step.
    ///
    /// Off by default: tag and push are still attempted after a failed pull,
    /// which succeeds when the source image is already in the local store.
    pub stop_on_first_failure: bool,
}

/// One step within a component sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    /// Looking up the component's source and mirror references.
    Locate,
    Pull,
    Tag,
    Push,
}

impl SyncStep {
    /// Engine steps in execution order.
    pub const ALL: [SyncStep; 3] = [SyncStep::Pull, SyncStep::Tag, SyncStep::Push];
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locate => write!(f, "locate"),
            Self::Pull => write!(f, "pull"),
            Self::Tag => write!(f, "tag"),
            Self::Push => write!(f, "push"),
        }
    }
}

/// A failed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub step: SyncStep,
    pub message: String,
}

/// What happened to a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ComponentOutcome {
    /// Already in the mirror; nothing was done.
    AlreadyPresent,
    /// Pulled, retagged and pushed.
    Mirrored,
    /// At least one step failed.
    Failed {
        failures: Vec<StepFailure>,
        skipped: Vec<SyncStep>,
    },
}

impl ComponentOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Sync result for one component.
///
/// `source` and `mirror` are `None` only when the component had no image
/// references, in which case the outcome is a failed [`SyncStep::Locate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentSync {
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ImageReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror: Option<ImageReference>,
    pub presence: Presence,
    #[serde(flatten)]
    pub outcome: ComponentOutcome,
}

/// End-of-run sync summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub components: Vec<ComponentSync>,
}

impl SyncReport {
    pub fn failed(&self) -> impl Iterator<Item = &ComponentSync> {
        self.components.iter().filter(|c| c.outcome.is_failed())
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    pub fn mirrored_count(&self) -> usize {
        self.count(|o| matches!(o, ComponentOutcome::Mirrored))
    }

    pub fn present_count(&self) -> usize {
        self.count(|o| matches!(o, ComponentOutcome::AlreadyPresent))
    }

    pub fn failed_count(&self) -> usize {
        self.count(ComponentOutcome::is_failed)
    }

    fn count(&self, pred: impl Fn(&ComponentOutcome) -> bool) -> usize {
        self.components.iter().filter(|c| pred(&c.outcome)).count()
    }
}

/// Copies missing images into the mirror.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    engine: ContainerEngine,
    policy: SyncPolicy,
}

impl Synchronizer {
    pub fn new(engine: ContainerEngine, policy: SyncPolicy) -> Self {
        Self { engine, policy }
    }

    /// Mirror every component that is not present.
    pub async fn sync(&self, existence: &ExistenceMap, located: &LocatedImages) -> SyncReport {
        let mut report = SyncReport::default();

        for (component, presence) in existence {
            let Some((source, mirror)) = located.pair(component) else {
                warn!(component = %component, "No image references for component");
                report.components.push(ComponentSync {
                    component: component.clone(),
                    source: None,
                    mirror: None,
                    presence: presence.clone(),
                    outcome: ComponentOutcome::Failed {
                        failures: vec![StepFailure {
                            step: SyncStep::Locate,
                            message: format!("no image references for {component}"),
                        }],
                        skipped: SyncStep::ALL.to_vec(),
                    },
                });
                continue;
            };

            let outcome = if presence.is_present() {
                ComponentOutcome::AlreadyPresent
            } else {
                self.mirror_component(component, source, mirror).await
            };

            report.components.push(ComponentSync {
                component: component.clone(),
                source: Some(source.clone()),
                mirror: Some(mirror.clone()),
                presence: presence.clone(),
                outcome,
            });
        }

        report
    }

    async fn mirror_component(
        &self,
        component: &str,
        source: &ImageReference,
        mirror: &ImageReference,
    ) -> ComponentOutcome {
        info!(component = %component, source = %source, mirror = %mirror, "Mirroring image");

        let mut failures = Vec::new();
        let mut skipped = Vec::new();

        for step in SyncStep::ALL {
            if self.policy.stop_on_first_failure && !failures.is_empty() {
                skipped.push(step);
                continue;
            }

            let result = match step {
                SyncStep::Pull => self.engine.pull(source).await,
                SyncStep::Tag => self.engine.tag(source, mirror).await,
                SyncStep::Push => self.engine.push(mirror).await,
                SyncStep::Locate => continue,
            };

            if let Err(e) = result {
                warn!(component = %component, step = %step, error = %e, "Sync step failed");
                failures.push(StepFailure {
                    step,
                    message: e.to_string(),
                });
            }
        }

        if failures.is_empty() {
            info!(component = %component, mirror = %mirror, "Image mirrored");
            ComponentOutcome::Mirrored
        } else {
            ComponentOutcome::Failed { failures, skipped }
        }
    }
}
