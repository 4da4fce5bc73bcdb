//! Mirror existence probing.
//!
//! Registries expose no portable "does this tag exist" query through the
//! engine CLI, so presence is tested by pulling the mirror reference. A failed
//! pull is ambiguous: the image may be absent, or the registry may be
//! unreachable or refusing credentials. The engine's error text is inspected
//! to tell the two apart; anything unrecognized is reported as
//! [`Presence::ProbeFailed`]. Both non-present states are mirrored.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::ContainerEngine;
use crate::exec::CommandError;
use crate::locate::ImageReference;

/// Engine error fragments that mean the reference does not exist.
const ABSENT_MARKERS: &[&str] = &[
    "not found",
    "manifest unknown",
    "does not exist",
    "name unknown",
];

/// Whether a mirror image exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Presence {
    Present,
    Absent,
    /// The probe itself failed; presence is unknown.
    ProbeFailed(String),
}

impl Presence {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::ProbeFailed(_) => "probe failed",
        }
    }
}

/// Component name to mirror presence.
pub type ExistenceMap = BTreeMap<String, Presence>;

/// Classify a failed probe pull.
pub fn classify_failure(err: &CommandError) -> Presence {
    let Some(output) = err.output() else {
        return Presence::ProbeFailed(err.to_string());
    };

    let lowered = output.to_lowercase();
    if ABSENT_MARKERS.iter().any(|m| lowered.contains(m)) {
        Presence::Absent
    } else {
        Presence::ProbeFailed(output.to_string())
    }
}

/// Checks which mirror references already exist.
#[derive(Debug, Clone)]
pub struct Prober {
    engine: ContainerEngine,
}

impl Prober {
    pub fn new(engine: ContainerEngine) -> Self {
        Self { engine }
    }

    /// Probe every mirror reference, one at a time.
    pub async fn probe(&self, mirror: &BTreeMap<String, ImageReference>) -> ExistenceMap {
        let mut existence = ExistenceMap::new();

        for (component, reference) in mirror {
            let presence = match self.engine.pull(reference).await {
                Ok(_) => Presence::Present,
                Err(e) => classify_failure(&e),
            };

            match &presence {
                Presence::Present => {
                    info!(component = %component, reference = %reference, "Image present in mirror")
                }
                Presence::Absent => {
                    debug!(component = %component, reference = %reference, "Image absent from mirror")
                }
                Presence::ProbeFailed(reason) => warn!(
                    component = %component,
                    reference = %reference,
                    reason = %reason,
                    "Could not determine mirror presence, treating as missing"
                ),
            }

            existence.insert(component.clone(), presence);
        }

        existence
    }
}
