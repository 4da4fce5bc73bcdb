//! End-to-end pipeline runs against scripted collaborators.

use std::sync::Arc;

use kmirror_images::constants::{constants_url, DEFAULT_CONSTANTS_URL};
use kmirror_images::{
    component_set, MirrorConfig, Pipeline, PipelineError, Strategy, TargetVersion,
};
use kmirror_testing::{constants_go, ScriptedRunner, StaticFetcher};

fn config() -> MirrorConfig {
    MirrorConfig {
        source_registry: "src.example/google_containers".to_string(),
        ..MirrorConfig::new("mirror.example/someone")
    }
}

fn v1_25_fetcher() -> StaticFetcher {
    let version = TargetVersion::normalize("v1.25.1").unwrap();
    StaticFetcher::new().with_body(
        &constants_url(DEFAULT_CONSTANTS_URL, &version),
        constants_go(Some("v1.9.3"), Some("3.5.4-0"), Some("3.8")),
    )
}

#[tokio::test]
async fn test_full_run_without_declarative_tool() {
    let runner = Arc::new(ScriptedRunner::new().fail(
        "docker",
        &["image", "pull", "mirror.example/someone/coredns:v1.9.3"],
        "manifest unknown",
    ));
    let fetcher = Arc::new(v1_25_fetcher());
    let pipeline = Pipeline::new(config(), runner.clone(), fetcher.clone());

    let report = pipeline.run("1.25.1").await.unwrap();

    assert_eq!(report.version.to_string(), "v1.25.1");
    assert_eq!(report.strategy, Strategy::RemoteConstants);
    let expected: Vec<&str> = component_set(&report.version).into_iter().collect();
    let resolved: Vec<&str> = report.tags.iter().map(|(c, _)| c).collect();
    assert_eq!(resolved, expected);
    assert!(report.tags.iter().all(|(_, tag)| !tag.is_empty()));

    assert_eq!(report.sync.present_count(), 6);
    assert_eq!(report.sync.mirrored_count(), 1);
    assert_eq!(fetcher.requests().len(), 1);

    let lines = runner.command_lines();
    assert_eq!(lines[0], "docker version");
    assert_eq!(
        &lines[lines.len() - 3..],
        &[
            "docker image pull src.example/google_containers/coredns:v1.9.3",
            "docker image tag src.example/google_containers/coredns:v1.9.3 mirror.example/someone/coredns:v1.9.3",
            "docker image push mirror.example/someone/coredns:v1.9.3",
        ]
    );
}

#[tokio::test]
async fn test_invalid_version_aborts_before_any_io() {
    let runner = Arc::new(ScriptedRunner::new());
    let fetcher = Arc::new(StaticFetcher::new());
    let pipeline = Pipeline::new(config(), runner.clone(), fetcher.clone());

    let err = pipeline.run("1.25").await.unwrap_err();

    assert!(matches!(err, PipelineError::Version(_)));
    assert!(runner.calls().is_empty());
    assert!(fetcher.requests().is_empty());
}

#[tokio::test]
async fn test_unusable_engine_is_fatal() {
    let runner = Arc::new(ScriptedRunner::new().fail(
        "docker",
        &["version"],
        "Cannot connect to the Docker daemon at unix:///var/run/docker.sock",
    ));
    let fetcher = Arc::new(v1_25_fetcher());
    let pipeline = Pipeline::new(config(), runner.clone(), fetcher.clone());

    let err = pipeline.run("v1.25.1").await.unwrap_err();

    assert!(matches!(err, PipelineError::Environment(_)));
    assert!(err.to_string().contains("docker"));
    assert_eq!(runner.calls().len(), 1);
    assert!(fetcher.requests().is_empty());
}

#[tokio::test]
async fn test_resolution_failure_is_fatal() {
    let runner = Arc::new(ScriptedRunner::new());
    let fetcher = Arc::new(StaticFetcher::new());
    let pipeline = Pipeline::new(config(), runner.clone(), fetcher);

    let err = pipeline.run("1.25.1").await.unwrap_err();

    assert!(matches!(err, PipelineError::Resolve(_)));
    assert_eq!(runner.command_lines(), vec!["docker version"]);
}

#[tokio::test]
async fn test_alternate_engine_binary() {
    let runner = Arc::new(ScriptedRunner::new());
    let config = MirrorConfig {
        engine: "podman".to_string(),
        ..config()
    };
    let pipeline = Pipeline::new(config, runner.clone(), Arc::new(v1_25_fetcher()));

    let report = pipeline.run("1.25.1").await.unwrap();

    assert_eq!(report.sync.present_count(), 7);
    assert!(runner.calls().iter().all(|call| call.program == "podman"));
}

#[tokio::test]
async fn test_report_serializes_for_json_output() {
    let runner = Arc::new(ScriptedRunner::new());
    let pipeline = Pipeline::new(config(), runner, Arc::new(v1_25_fetcher()));

    let report = pipeline.run("1.25.1").await.unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["version"], "v1.25.1");
    assert_eq!(json["strategy"], "remote_constants");
    assert_eq!(json["tags"]["etcd"], "3.5.4-0");
    assert!(json.get("prefixes").is_none());
    assert_eq!(json["sync"]["components"][0]["outcome"], "already_present");
}
