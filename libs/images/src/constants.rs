//! Extraction of component versions from kubeadm's `constants.go`.
//!
//! The file is Go source, not a structured format, so it is scanned line by
//! line for `Key = "value"` declarations of the three constants that are not
//! derivable from the Kubernetes version.

use std::sync::LazyLock;

use regex::Regex;

use crate::version::TargetVersion;

/// Location of kubeadm's constants for a release; `{version}` is replaced by
/// the normalized Kubernetes version.
pub const DEFAULT_CONSTANTS_URL: &str = "https://raw.githubusercontent.com/kubernetes/kubernetes/{version}/cmd/kubeadm/app/constants/constants.go";

const COREDNS_KEY: &str = "CoreDNSVersion";
const ETCD_KEY: &str = "DefaultEtcdVersion";
const PAUSE_KEY: &str = "PauseVersion";

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(CoreDNSVersion|DefaultEtcdVersion|PauseVersion)\s*=\s*"([^"]*)""#)
        .expect("declaration pattern is valid")
});

/// Expand a constants URL template for `version`.
pub fn constants_url(template: &str, version: &TargetVersion) -> String {
    template.replace("{version}", &version.to_string())
}

/// Versions found in a constants source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentConstants {
    pub coredns: Option<String>,
    pub etcd: Option<String>,
    pub pause: Option<String>,
}

/// Scan `text` for the CoreDNS, etcd and pause version declarations.
///
/// Comment lines are skipped, empty values count as unset, and a later
/// declaration overrides an earlier one.
pub fn parse_constants(text: &str) -> ComponentConstants {
    let mut found = ComponentConstants::default();

    for line in text.lines() {
        if line.trim_start().starts_with("//") {
            continue;
        }
        let Some(caps) = DECLARATION.captures(line) else {
            continue;
        };

        let value = caps[2].trim();
        if value.is_empty() {
            continue;
        }
        let slot = match &caps[1] {
            COREDNS_KEY => &mut found.coredns,
            ETCD_KEY => &mut found.etcd,
            PAUSE_KEY => &mut found.pause,
            _ => continue,
        };
        *slot = Some(value.to_string());
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1_23_EXCERPT: &str = r#"
const (
	// KubernetesDir is the directory Kubernetes owns for storing various configuration files
	KubernetesDir = "/etc/kubernetes"

	// DefaultEtcdVersion indicates the default etcd version that kubeadm uses
	DefaultEtcdVersion = "3.5.1-0"

	// PauseVersion indicates the default pause image version for kubeadm
	PauseVersion = "3.6"

	// CoreDNSVersion is the version of CoreDNS to be deployed if it is used
	CoreDNSVersion = "v1.8.6"

	// MinExternalEtcdVersion indicates minimum external etcd version which kubeadm supports
	MinExternalEtcdVersion = "3.2.18"
)
"#;

    #[test]
    fn test_parse_release_excerpt() {
        let found = parse_constants(V1_23_EXCERPT);
        assert_eq!(found.coredns.as_deref(), Some("v1.8.6"));
        assert_eq!(found.etcd.as_deref(), Some("3.5.1-0"));
        assert_eq!(found.pause.as_deref(), Some("3.6"));
    }

    #[test]
    fn test_parse_ignores_similar_keys() {
        let found = parse_constants(r#"MinExternalEtcdVersion = "3.2.18""#);
        assert_eq!(found, ComponentConstants::default());
    }

    #[test]
    fn test_parse_missing_pause() {
        let text = "\tDefaultEtcdVersion = \"3.3.10\"\n\tCoreDNSVersion = \"1.3.1\"\n";
        let found = parse_constants(text);
        assert_eq!(found.etcd.as_deref(), Some("3.3.10"));
        assert_eq!(found.coredns.as_deref(), Some("1.3.1"));
        assert_eq!(found.pause, None);
    }

    #[test]
    fn test_parse_gofmt_aligned_and_const_forms() {
        let text = "const PauseVersion     = \"3.2\"\nCoreDNSVersion   =   \"1.6.7\" // bump with care\n";
        let found = parse_constants(text);
        assert_eq!(found.pause.as_deref(), Some("3.2"));
        assert_eq!(found.coredns.as_deref(), Some("1.6.7"));
    }

    #[test]
    fn test_parse_skips_comments_and_empty_values() {
        let text = "// PauseVersion = \"9.9\"\nPauseVersion = \"\"\n";
        assert_eq!(parse_constants(text).pause, None);
    }

    #[test]
    fn test_later_declaration_wins() {
        let text = "DefaultEtcdVersion = \"3.4.3-0\"\nDefaultEtcdVersion = \"3.4.13-0\"\n";
        assert_eq!(parse_constants(text).etcd.as_deref(), Some("3.4.13-0"));
    }

    #[test]
    fn test_constants_url() {
        let version = TargetVersion::normalize("1.25.1").unwrap();
        assert_eq!(
            constants_url(DEFAULT_CONSTANTS_URL, &version),
            "https://raw.githubusercontent.com/kubernetes/kubernetes/v1.25.1/cmd/kubeadm/app/constants/constants.go"
        );
    }
}
