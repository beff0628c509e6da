//! Serialization roundtrip tests for forge-core types.

use chrono::Utc;
use forge_core::artifact::{ArtifactHandle, ArtifactRef};
use forge_core::context::{EventKind, PipelineContext};
use forge_core::ids::{ReleaseId, RunId};
use forge_core::pipeline::PipelineDefinition;
use forge_core::release::PublishResult;
use forge_core::run::{JobResult, JobStatus, SkipReason, StepOutcome};

#[test]
fn test_pipeline_definition_yaml_roundtrip() {
    let yaml = r#"
version: "1"
name: backlight
jobs:
  - name: build
    steps:
      - name: compile
        run: cargo build --release
    outputs:
      - name: binary
        path: target/release/backlight
  - name: publish
    needs: [build]
    condition: ref == "refs/heads/main"
    publish: true
    inputs:
      - job: build
        name: binary
release:
  tag: latest
  title: Latest build
  prerelease: true
  assets:
    - job: build
      artifact: binary
      remote_name: backlight-linux-amd64
"#;

    let def: PipelineDefinition = serde_yaml::from_str(yaml).expect("parse");
    def.validate().expect("validate");

    assert_eq!(def.jobs.len(), 2);
    let publish = def.publish_job().expect("publish job");
    assert_eq!(publish.name, "publish");
    assert_eq!(publish.inputs[0].local_path(), "binary");

    let release = def.release.as_ref().expect("release");
    assert_eq!(release.assets[0].remote_name(), "backlight-linux-amd64");

    let json = serde_json::to_string(&def).expect("serialize");
    let parsed: PipelineDefinition = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(parsed.name, def.name);
    assert_eq!(
        parsed.jobs[1].condition.as_ref().map(|c| c.as_str()),
        Some(r#"ref == "refs/heads/main""#)
    );
}

#[test]
fn test_condition_failure_is_a_load_failure() {
    let yaml = r#"
version: "1"
name: bad
jobs:
  - name: build
    condition: branch == "main"
"#;
    let res: Result<PipelineDefinition, _> = serde_yaml::from_str(yaml);
    assert!(res.is_err());
}

#[test]
fn test_job_result_roundtrip() {
    let result = JobResult {
        job: "build".to_string(),
        status: JobStatus::Succeeded,
        skip_reason: None,
        failure: None,
        steps: vec![StepOutcome {
            name: "compile".to_string(),
            exit_code: 0,
            stdout: "ok\n".to_string(),
            stderr: String::new(),
            duration_ms: 1200,
        }],
        artifacts: vec![ArtifactRef {
            job: "build".to_string(),
            name: "binary".to_string(),
            handle: ArtifactHandle::new("build/binary"),
            size_bytes: 4096,
            checksum: "deadbeef".to_string(),
        }],
        started_at: Some(Utc::now()),
        completed_at: Some(Utc::now()),
        duration_ms: 1234,
    };

    let json = serde_json::to_string(&result).expect("serialize");
    let parsed: JobResult = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(parsed.status, JobStatus::Succeeded);
    assert_eq!(parsed.artifacts[0].handle, result.artifacts[0].handle);
    assert!(parsed.steps[0].success());
}

#[test]
fn test_skip_reason_tagged_encoding() {
    let reason = SkipReason::DependencyFailed {
        dependency: "build".to_string(),
    };
    let json = serde_json::to_string(&reason).expect("serialize");
    assert!(json.contains("dependency_failed"), "got: {json}");
    let parsed: SkipReason = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(parsed, reason);
}

#[test]
fn test_context_event_encoding() {
    let ctx = PipelineContext::new("refs/heads/main", EventKind::PullRequest);
    let json = serde_json::to_string(&ctx).expect("serialize");
    assert!(json.contains("pull_request"));
    let parsed: PipelineContext = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(parsed, ctx);
}

#[test]
fn test_publish_result_roundtrip() {
    let result = PublishResult {
        release_id: ReleaseId::new("187"),
        tag: "latest".to_string(),
        replaced_existing: true,
        assets_uploaded: 1,
    };
    let json = serde_json::to_string(&result).expect("serialize");
    let parsed: PublishResult = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(parsed, result);
}

#[test]
fn test_run_id_is_prefixed() {
    let id = RunId::new();
    assert!(id.to_string().starts_with("run_"));
}
