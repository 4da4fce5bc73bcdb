//! Kubernetes version normalization.
//!
//! Operators type versions loosely (`1.25.1`, `v1.23.0`). Everything
//! downstream works on the canonical `vMAJOR.MINOR.PATCH` form, so the input
//! is validated once here and rejected before any process or network call.

use std::fmt;
use std::str::FromStr;

use semver::Version;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Version validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The input is not a `vMAJOR.MINOR.PATCH` triple.
    #[error("kubernetes version {input:?} has an invalid format ({reason}), expected e.g. v1.23.0")]
    Format { input: String, reason: String },
}

impl VersionError {
    fn format(input: &str, reason: impl Into<String>) -> Self {
        Self::Format {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// A validated Kubernetes release version.
///
/// Always renders as `v` followed by exactly three dot-separated numeric
/// segments, with the optional pre-release qualifier kept verbatim
/// (`v1.22.0-rc1`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetVersion(Version);

impl TargetVersion {
    /// Validate and canonicalize a free-form version string.
    ///
    /// A single leading `v` is allowed and added when missing. The remainder
    /// must split on `.` into exactly three segments; no other correction is
    /// attempted.
    pub fn normalize(input: &str) -> Result<Self, VersionError> {
        let bare = input.strip_prefix('v').unwrap_or(input);

        let segments = bare.split('.').count();
        if segments != 3 {
            return Err(VersionError::format(
                input,
                format!("expected 3 dot-separated segments, found {segments}"),
            ));
        }

        Version::parse(bare)
            .map(Self)
            .map_err(|e| VersionError::format(input, e.to_string()))
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    /// Pre-release qualifier without the leading `-`, if any.
    pub fn pre_release(&self) -> Option<&str> {
        (!self.0.pre.is_empty()).then(|| self.0.pre.as_str())
    }

    /// Returns true if this version sorts at or after `other` (semver rules,
    /// so `1.21.0-rc.0` is at least `1.21.0-alpha.1`).
    pub fn at_least(&self, other: &Version) -> bool {
        let this = (self.0.major, self.0.minor, self.0.patch, &self.0.pre);
        this >= (other.major, other.minor, other.patch, &other.pre)
    }
}

impl fmt::Display for TargetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for TargetVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

impl Serialize for TargetVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case::bare("1.25.1", "v1.25.1")]
    #[case::prefixed("v1.23.1", "v1.23.1")]
    #[case::zero_patch("1.14.0", "v1.14.0")]
    #[case::pre_release("v1.22.0-rc1", "v1.22.0-rc1")]
    fn test_normalize_accepts(#[case] input: &str, #[case] expected: &str) {
        let version = TargetVersion::normalize(input).unwrap();
        assert_eq!(version.to_string(), expected);
    }

    #[rstest]
    #[case::two_segments("1.25")]
    #[case::four_segments("1.25.1.2")]
    #[case::dotted_pre_release("v1.21.0-alpha.1")]
    #[case::empty("")]
    #[case::just_v("v")]
    #[case::double_v("vv1.2.3")]
    #[case::non_numeric("v1.x.0")]
    #[case::leading_space(" 1.25.1")]
    fn test_normalize_rejects(#[case] input: &str) {
        let err = TargetVersion::normalize(input).unwrap_err();
        assert!(matches!(err, VersionError::Format { .. }));
    }

    #[test]
    fn test_components() {
        let version = TargetVersion::normalize("1.22.3-rc1").unwrap();
        assert_eq!(version.major(), 1);
        assert_eq!(version.minor(), 22);
        assert_eq!(version.patch(), 3);
        assert_eq!(version.pre_release(), Some("rc1"));

        let release = TargetVersion::normalize("1.22.3").unwrap();
        assert_eq!(release.pre_release(), None);
    }

    #[test]
    fn test_at_least_respects_pre_release() {
        let threshold = Version::parse("1.21.0-alpha.1").unwrap();

        assert!(!TargetVersion::normalize("1.20.15").unwrap().at_least(&threshold));
        assert!(!TargetVersion::normalize("1.21.0-alpha").unwrap().at_least(&threshold));
        assert!(TargetVersion::normalize("1.21.0-rc1").unwrap().at_least(&threshold));
        assert!(TargetVersion::normalize("1.21.0").unwrap().at_least(&threshold));
        assert!(TargetVersion::normalize("1.22.0").unwrap().at_least(&threshold));
    }

    #[test]
    fn test_from_str() {
        let version: TargetVersion = "1.25.1".parse().unwrap();
        assert_eq!(version.to_string(), "v1.25.1");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(major in 0u64..50, minor in 0u64..100, patch in 0u64..100, prefixed: bool) {
            let input = if prefixed {
                format!("v{major}.{minor}.{patch}")
            } else {
                format!("{major}.{minor}.{patch}")
            };
            let once = TargetVersion::normalize(&input).unwrap().to_string();
            let twice = TargetVersion::normalize(&once).unwrap().to_string();
            prop_assert_eq!(&once, &twice);
            prop_assert!(once.starts_with('v'));
        }

        #[test]
        fn normalize_rejects_wrong_segment_count(parts in proptest::collection::vec(0u64..100, 1..6usize)) {
            prop_assume!(parts.len() != 3);
            let input = parts.iter().map(u64::to_string).collect::<Vec<_>>().join(".");
            prop_assert!(TargetVersion::normalize(&input).is_err());
        }
    }
}
