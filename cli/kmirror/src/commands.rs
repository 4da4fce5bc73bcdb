//! Command-line interface and the mirror command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kmirror_images::{
    CommandRunner, ExistenceMap, HttpFetcher, ImagePrefixMap, ImageTagMap, LocatedImages,
    MirrorConfig, Pipeline, PipelineError, ProcessRunner, RunReport, Strategy, TargetVersion,
    TextFetcher,
};
use serde::Serialize;
use tabled::Tabled;
use tracing::debug;

use crate::config::{FileConfig, Overrides, Settings};
use crate::error::CliError;
use crate::logging::LogFormat;
use crate::output::{
    print_info, print_json, print_success, print_table, print_warning, sync_rows, OutputFormat,
};

/// kmirror - mirror the component images of a Kubernetes release.
#[derive(Debug, Parser)]
#[command(name = "kmirror")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Kubernetes version, e.g. 1.25.1 or v1.25.1.
    #[arg(value_name = "VERSION")]
    kube_version: String,

    /// Config file path (defaults to config.json in the user config directory).
    #[arg(long, env = "KMIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Registry to pull images from.
    #[arg(long, env = "KMIRROR_SOURCE_REGISTRY")]
    source_registry: Option<String>,

    /// Registry to push images to.
    #[arg(long, env = "KMIRROR_MIRROR_REGISTRY")]
    mirror_registry: Option<String>,

    /// Docker-compatible container engine binary.
    #[arg(long, env = "KMIRROR_ENGINE")]
    engine: Option<String>,

    /// kubeadm binary used to list release images.
    #[arg(long, env = "KMIRROR_KUBEADM")]
    kubeadm: Option<String>,

    /// URL template for kubeadm's constants.go; `{version}` is replaced.
    #[arg(long, env = "KMIRROR_CONSTANTS_URL")]
    constants_url: Option<String>,

    /// Retries for transient constants.go download failures.
    #[arg(long, env = "KMIRROR_FETCH_RETRIES")]
    fetch_retries: Option<u32>,

    /// Skip a component's remaining steps after its first failed step.
    #[arg(long, env = "KMIRROR_STOP_ON_FIRST_FAILURE")]
    stop_on_first_failure: bool,

    /// Resolve and probe only; do not pull, tag or push.
    #[arg(long)]
    dry_run: bool,

    /// Exit non-zero if any component fails to mirror.
    #[arg(long, env = "KMIRROR_STRICT")]
    strict: bool,

    /// Summary format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Log record format (logs go to stderr).
    #[arg(long, value_enum, env = "KMIRROR_LOG_FORMAT", default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

/// A component as it would be handled without `--dry-run`.
#[derive(Debug, Serialize, Tabled)]
struct PlanEntry {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Source image")]
    source: String,
    #[tabled(rename = "Mirror image")]
    mirror: String,
    #[tabled(rename = "Probe")]
    probe: String,
    #[tabled(rename = "Action")]
    action: &'static str,
}

#[derive(Debug, Serialize)]
struct DryRunReport {
    version: TargetVersion,
    strategy: Strategy,
    tags: ImageTagMap,
    #[serde(skip_serializing_if = "ImagePrefixMap::is_empty")]
    prefixes: ImagePrefixMap,
    plan: Vec<PlanEntry>,
}

fn plan(existence: &ExistenceMap, located: &LocatedImages) -> Vec<PlanEntry> {
    existence
        .iter()
        .map(|(component, presence)| match located.pair(component) {
            Some((source, mirror)) => PlanEntry {
                component: component.clone(),
                source: source.to_string(),
                mirror: mirror.to_string(),
                probe: presence.label().to_string(),
                action: if presence.is_present() { "skip" } else { "mirror" },
            },
            None => PlanEntry {
                component: component.clone(),
                source: "-".to_string(),
                mirror: "-".to_string(),
                probe: presence.label().to_string(),
                action: "unresolved",
            },
        })
        .collect()
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            source_registry: self.source_registry.clone(),
            mirror_registry: self.mirror_registry.clone(),
            engine: self.engine.clone(),
            kubeadm: self.kubeadm.clone(),
            constants_url: self.constants_url.clone(),
            fetch_retries: self.fetch_retries,
            stop_on_first_failure: self.stop_on_first_failure,
        }
    }

    /// Progress lines are suppressed for JSON output so stdout stays parseable.
    fn progress(&self, message: &str) {
        if self.format == OutputFormat::Table {
            print_info(message);
        }
    }

    /// Run the mirror pipeline against the host's processes and network.
    pub async fn run(self) -> Result<()> {
        let (version, settings) = self.prepare()?;
        let fetcher = HttpFetcher::new(settings.fetch).context("Failed to set up HTTP client")?;
        self.execute(
            version,
            settings.mirror,
            Arc::new(ProcessRunner::new()),
            Arc::new(fetcher),
        )
        .await
    }

    /// Validate the version, then load and merge configuration.
    fn prepare(&self) -> Result<(TargetVersion, Settings)> {
        let version =
            TargetVersion::normalize(&self.kube_version).map_err(PipelineError::from)?;

        let file = match &self.config {
            Some(path) => FileConfig::load_from(path)?,
            None => FileConfig::load()?,
        };
        let settings = Settings::resolve(self.overrides(), file)?;
        debug!(
            source = %settings.mirror.source_registry,
            mirror = %settings.mirror.mirror_registry,
            engine = %settings.mirror.engine,
            kubeadm = %settings.mirror.declarative_tool,
            fetch_retries = settings.fetch.retries,
            "Settings resolved"
        );

        Ok((version, settings))
    }

    /// Drive the pipeline stage by stage, reporting progress between stages.
    async fn execute(
        &self,
        version: TargetVersion,
        mirror: MirrorConfig,
        runner: Arc<dyn CommandRunner>,
        fetcher: Arc<dyn TextFetcher>,
    ) -> Result<()> {
        let pipeline = Pipeline::new(mirror, runner, fetcher);
        let config = pipeline.config();

        self.progress(&format!(
            "Mirroring Kubernetes {} images from {} to {}",
            version, config.source_registry, config.mirror_registry
        ));

        pipeline.check_environment().await?;

        let resolution = pipeline.resolve(&version).await?;
        self.progress(&format!(
            "Resolved {} images using {}",
            resolution.tags.len(),
            resolution.strategy
        ));

        let located = pipeline.locate(&resolution);
        let existence = pipeline.probe(&located).await;
        let missing = existence.values().filter(|p| !p.is_present()).count();
        self.progress(&format!(
            "{} of {} images already in the mirror, {} to mirror",
            existence.len() - missing,
            existence.len(),
            missing
        ));

        if self.dry_run {
            let entries = plan(&existence, &located);
            match self.format {
                OutputFormat::Table => print_table(&entries),
                OutputFormat::Json => print_json(&DryRunReport {
                    version,
                    strategy: resolution.strategy,
                    tags: resolution.tags,
                    prefixes: resolution.prefixes,
                    plan: entries,
                }),
            }
            return Ok(());
        }

        let sync = pipeline.sync(&existence, &located).await;
        let report = RunReport {
            version,
            strategy: resolution.strategy,
            tags: resolution.tags,
            prefixes: resolution.prefixes,
            sync,
        };

        match self.format {
            OutputFormat::Table => print_table(&sync_rows(&report.sync)),
            OutputFormat::Json => print_json(&report),
        }

        let failed = report.sync.failed_count();
        if failed > 0 {
            if self.strict {
                return Err(CliError::ComponentsFailed { count: failed }.into());
            }
            if self.format == OutputFormat::Table {
                print_warning(&format!("{failed} component(s) failed to mirror"));
            }
        } else if self.format == OutputFormat::Table {
            print_success(&format!(
                "{} mirrored, {} already present",
                report.sync.mirrored_count(),
                report.sync.present_count()
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use clap::CommandFactory;
    use kmirror_images::constants::{constants_url, DEFAULT_CONSTANTS_URL};
    use kmirror_images::{locate, Presence};
    use kmirror_testing::{constants_go, ScriptedRunner, StaticFetcher};
    use tempfile::NamedTempFile;

    const MIRRORED_COREDNS: &str = "mirror.example/coredns:v1.9.3";

    fn empty_config() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{}").unwrap();
        file
    }

    fn cli(config: &NamedTempFile, extra: &[&str]) -> Cli {
        let config = config.path().to_str().unwrap();
        let mut args = vec![
            "kmirror",
            "1.25.1",
            "--config",
            config,
            "--mirror-registry",
            "mirror.example",
            "--format",
            "json",
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).unwrap()
    }

    fn constants_fetcher() -> Arc<StaticFetcher> {
        let version = TargetVersion::normalize("1.25.1").unwrap();
        Arc::new(StaticFetcher::new().with_body(
            &constants_url(DEFAULT_CONSTANTS_URL, &version),
            constants_go(Some("v1.9.3"), Some("3.5.4-0"), Some("3.8")),
        ))
    }

    /// Every mirror image exists except coredns.
    fn coredns_missing() -> ScriptedRunner {
        ScriptedRunner::new().fail(
            "docker",
            &["image", "pull", MIRRORED_COREDNS],
            "manifest unknown",
        )
    }

    async fn execute(cli: &Cli, runner: &Arc<ScriptedRunner>) -> Result<()> {
        let (version, settings) = cli.prepare()?;
        cli.execute(version, settings.mirror, runner.clone(), constants_fetcher())
            .await
    }

    #[tokio::test]
    async fn test_run_mirrors_missing_images() {
        let config = empty_config();
        let runner = Arc::new(coredns_missing());

        execute(&cli(&config, &[]), &runner).await.unwrap();

        let lines = runner.command_lines();
        assert_eq!(lines[0], "docker version");
        assert!(lines.contains(&format!("docker image push {MIRRORED_COREDNS}")));
        assert_eq!(
            lines.iter().filter(|l| l.starts_with("docker image push")).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_dry_run_never_modifies_registries() {
        let config = empty_config();
        let runner = Arc::new(coredns_missing());

        execute(&cli(&config, &["--dry-run"]), &runner).await.unwrap();

        let lines = runner.command_lines();
        assert!(lines.iter().all(|l| !l.starts_with("docker image tag")));
        assert!(lines.iter().all(|l| !l.starts_with("docker image push")));
        // version check plus one mirror pull per component
        assert_eq!(lines.len(), 8);
    }

    #[tokio::test]
    async fn test_component_failure_exit_depends_on_strict() {
        let config = empty_config();
        let failing_push = || {
            Arc::new(coredns_missing().fail(
                "docker",
                &["image", "push", MIRRORED_COREDNS],
                "denied: requested access to the resource is denied",
            ))
        };

        execute(&cli(&config, &[]), &failing_push()).await.unwrap();

        let err = execute(&cli(&config, &["--strict"]), &failing_push())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::ComponentsFailed { count: 1 })
        ));
    }

    #[tokio::test]
    async fn test_engine_failure_is_fatal() {
        let config = empty_config();
        let runner = Arc::new(ScriptedRunner::new().fail("docker", &["version"], "daemon down"));

        let err = execute(&cli(&config, &[]), &runner).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Environment(_))
        ));
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_version_checked_before_config_is_read() {
        let cli = Cli::try_parse_from([
            "kmirror",
            "1.25",
            "--config",
            "/nonexistent/kmirror/config.json",
        ])
        .unwrap();

        let err = cli.prepare().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Version(_))
        ));
    }

    #[test]
    fn test_version_flag_is_available() {
        let err = Cli::try_parse_from(["kmirror", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "kmirror",
            "v1.25.1",
            "--mirror-registry",
            "mirror.example",
            "--engine",
            "podman",
            "--dry-run",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.kube_version, "v1.25.1");
        assert!(cli.dry_run);
        assert_eq!(cli.format, OutputFormat::Json);

        let overrides = cli.overrides();
        assert_eq!(overrides.mirror_registry.as_deref(), Some("mirror.example"));
        assert_eq!(overrides.engine.as_deref(), Some("podman"));
    }

    #[test]
    fn test_version_is_required() {
        assert!(Cli::try_parse_from(["kmirror", "--dry-run"]).is_err());
    }

    #[test]
    fn test_plan_actions() {
        let mut tags = ImageTagMap::new();
        tags.insert("etcd", "3.5.4-0");
        tags.insert("pause", "3.8");
        let located = locate(&tags, "mirror.example", "src.example");
        let existence = ExistenceMap::from([
            ("etcd".to_string(), Presence::Present),
            ("pause".to_string(), Presence::ProbeFailed("timeout".to_string())),
        ]);

        let entries = plan(&existence, &located);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].component, "etcd");
        assert_eq!(entries[0].action, "skip");
        assert_eq!(entries[1].action, "mirror");
        assert_eq!(entries[1].source, "src.example/pause:3.8");
        assert_eq!(entries[1].probe, "probe failed");
    }

    #[test]
    fn test_plan_lists_unresolved_components() {
        let existence = ExistenceMap::from([("coredns".to_string(), Presence::Absent)]);

        let entries = plan(&existence, &LocatedImages::default());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "unresolved");
        assert_eq!(entries[0].mirror, "-");
    }
}
