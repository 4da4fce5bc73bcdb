//! Image reference construction for the source and mirror registries.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::component::ImageTagMap;

/// A fully-qualified image reference: `host/component:tag`.
///
/// `host` may carry a path (`registry.example.com/google_containers`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    host: String,
    component: String,
    tag: String,
}

impl ImageReference {
    pub fn new(
        host: impl Into<String>,
        component: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            component: component.into(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.host, self.component, self.tag)
    }
}

impl Serialize for ImageReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Source and mirror references for every resolved component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocatedImages {
    pub mirror: BTreeMap<String, ImageReference>,
    pub source: BTreeMap<String, ImageReference>,
}

impl LocatedImages {
    /// `(source, mirror)` references for a component.
    pub fn pair(&self, component: &str) -> Option<(&ImageReference, &ImageReference)> {
        Some((self.source.get(component)?, self.mirror.get(component)?))
    }
}

/// Build `host/component:tag` references in both registries for each tag.
///
/// Pure; hosts and tags are expected to be non-empty.
pub fn locate(tags: &ImageTagMap, mirror_host: &str, source_host: &str) -> LocatedImages {
    let mut located = LocatedImages::default();
    for (component, tag) in tags.iter() {
        located.mirror.insert(
            component.to_string(),
            ImageReference::new(mirror_host, component, tag),
        );
        located.source.insert(
            component.to_string(),
            ImageReference::new(source_host, component, tag),
        );
    }
    located
}
