//! End-to-end runs through the scheduler, shell runner, artifact store and
//! publish protocol, with an in-process release host.

use async_trait::async_trait;
use forge_core::context::{EventKind, PipelineContext};
use forge_core::ids::ReleaseId;
use forge_core::pipeline::PipelineDefinition;
use forge_core::ports::{ArtifactStore, ReleaseHost};
use forge_core::release::ReleaseRecord;
use forge_core::run::{JobStatus, PublishOutcome, RunStatus, SkipReason};
use forge_core::{Error, Result};
use forge_engine::PipelineExecutor;
use forge_store::MemoryStore;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Release host backed by a mutex-guarded map, one entry per tag.
#[derive(Default)]
struct FakeHost {
    releases: Mutex<Vec<ReleaseRecord>>,
    uploads: Mutex<Vec<(String, String, usize)>>,
    deletes: Mutex<Vec<String>>,
    next_id: AtomicU64,
    fail_create: bool,
}

impl FakeHost {
    fn new() -> Self {
        Self::default()
    }

    fn with_existing(tag: &str, title: &str) -> Self {
        let host = Self::default();
        let id = ReleaseId::new("0");
        host.releases.lock().unwrap().push(ReleaseRecord {
            id,
            tag: tag.to_string(),
            title: title.to_string(),
            prerelease: false,
        });
        host.next_id.store(1, Ordering::SeqCst);
        host
    }
}

#[async_trait]
impl ReleaseHost for FakeHost {
    async fn find_release(&self, tag: &str) -> Result<Option<ReleaseRecord>> {
        let releases = self.releases.lock().unwrap();
        Ok(releases.iter().find(|r| r.tag == tag).cloned())
    }

    async fn delete_release(&self, id: &ReleaseId) -> Result<()> {
        self.deletes.lock().unwrap().push(id.as_str().to_string());
        let mut releases = self.releases.lock().unwrap();
        releases.retain(|r| r.id != *id);
        Ok(())
    }

    async fn create_release(&self, tag: &str, title: &str, prerelease: bool) -> Result<ReleaseId> {
        if self.fail_create {
            return Err(Error::Publish {
                message: "validation failed".to_string(),
                retryable: false,
            });
        }
        let id = ReleaseId::new(self.next_id.fetch_add(1, Ordering::SeqCst).to_string());
        self.releases.lock().unwrap().push(ReleaseRecord {
            id: id.clone(),
            tag: tag.to_string(),
            title: title.to_string(),
            prerelease,
        });
        Ok(id)
    }

    async fn upload_asset(&self, id: &ReleaseId, filename: &str, bytes: Vec<u8>) -> Result<()> {
        self.uploads
            .lock()
            .unwrap()
            .push((id.as_str().to_string(), filename.to_string(), bytes.len()));
        Ok(())
    }
}

fn load(yaml: &str) -> PipelineDefinition {
    serde_yaml::from_str(yaml).unwrap()
}

fn push_to(git_ref: &str) -> PipelineContext {
    PipelineContext::new(git_ref, EventKind::Push)
}

const RELEASE_PIPELINE: &str = r#"
version: "1"
name: backlight-delivery
jobs:
  - name: build
    steps:
      - name: compile
        run: printf 'binary-bytes' > out.bin
    outputs:
      - name: binary
        path: out.bin
  - name: verify
    needs: [build]
    inputs:
      - job: build
        name: binary
        path: incoming/binary
    steps:
      - name: check
        run: test -s incoming/binary
  - name: release
    needs: [verify]
    condition: ref == "refs/heads/main" && event == "push"
    publish: true
    steps:
      - name: announce
        run: echo publishing
release:
  tag: latest
  title: Latest build
  assets:
    - job: build
      artifact: binary
      remote_name: backlight
"#;

#[tokio::test]
async fn test_feature_branch_skips_publish() {
    let workspace = tempfile::tempdir().unwrap();
    let host = Arc::new(FakeHost::new());
    let executor = PipelineExecutor::new(
        load(RELEASE_PIPELINE),
        Arc::new(MemoryStore::new()),
        workspace.path().to_path_buf(),
        Some(host.clone()),
    )
    .unwrap();

    let summary = executor.run(&push_to("refs/heads/feature/dim")).await;

    assert_eq!(summary.status, RunStatus::Succeeded);
    assert_eq!(summary.jobs["build"].status, JobStatus::Succeeded);
    assert_eq!(summary.jobs["verify"].status, JobStatus::Succeeded);
    assert_eq!(summary.jobs["release"].status, JobStatus::Skipped);
    assert_eq!(
        summary.jobs["release"].skip_reason,
        Some(SkipReason::ConditionNotMet)
    );
    assert!(matches!(
        summary.publish,
        Some(PublishOutcome::Skipped { .. })
    ));
    assert!(host.releases.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_main_push_publishes_release() {
    let workspace = tempfile::tempdir().unwrap();
    let host = Arc::new(FakeHost::new());
    let executor = PipelineExecutor::new(
        load(RELEASE_PIPELINE),
        Arc::new(MemoryStore::new()),
        workspace.path().to_path_buf(),
        Some(host.clone()),
    )
    .unwrap();

    let summary = executor.run(&push_to("refs/heads/main")).await;

    assert_eq!(summary.status, RunStatus::Succeeded);
    let Some(PublishOutcome::Published(published)) = &summary.publish else {
        panic!("expected published outcome, got {:?}", summary.publish);
    };
    assert_eq!(published.tag, "latest");
    assert!(!published.replaced_existing);
    assert_eq!(published.assets_uploaded, 1);

    let uploads = host.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].1, "backlight");
    assert_eq!(uploads[0].2, "binary-bytes".len());
    assert!(host.deletes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_republish_replaces_floating_tag() {
    let workspace = tempfile::tempdir().unwrap();
    let host = Arc::new(FakeHost::with_existing("latest", "Older build"));
    let executor = PipelineExecutor::new(
        load(RELEASE_PIPELINE),
        Arc::new(MemoryStore::new()),
        workspace.path().to_path_buf(),
        Some(host.clone()),
    )
    .unwrap();

    let summary = executor.run(&push_to("refs/heads/main")).await;

    assert_eq!(summary.status, RunStatus::Succeeded);
    let Some(PublishOutcome::Published(published)) = &summary.publish else {
        panic!("expected published outcome, got {:?}", summary.publish);
    };
    assert!(published.replaced_existing);

    // The prior release is gone; exactly one lives under the tag.
    assert_eq!(host.deletes.lock().unwrap().as_slice(), &["0".to_string()]);
    let releases = host.releases.lock().unwrap();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].title, "Latest build");
}

#[tokio::test]
async fn test_sequential_publishes_converge_to_one_release() {
    let host = Arc::new(FakeHost::new());

    for _ in 0..2 {
        let workspace = tempfile::tempdir().unwrap();
        let executor = PipelineExecutor::new(
            load(RELEASE_PIPELINE),
            Arc::new(MemoryStore::new()),
            workspace.path().to_path_buf(),
            Some(host.clone()),
        )
        .unwrap();
        let summary = executor.run(&push_to("refs/heads/main")).await;
        assert_eq!(summary.status, RunStatus::Succeeded);
    }

    let releases = host.releases.lock().unwrap();
    assert_eq!(releases.len(), 1, "floating tag must hold a single release");
    assert_eq!(releases[0].tag, "latest");
    assert_eq!(host.deletes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_step_fails_run_and_skips_downstream() {
    let pipeline = r#"
version: "1"
name: backlight-delivery
jobs:
  - name: build
    steps:
      - name: compile
        run: exit 3
      - name: never-runs
        run: echo unreachable
  - name: verify
    needs: [build]
    steps:
      - name: check
        run: echo ok
"#;
    let workspace = tempfile::tempdir().unwrap();
    let executor = PipelineExecutor::new(
        load(pipeline),
        Arc::new(MemoryStore::new()),
        workspace.path().to_path_buf(),
        None,
    )
    .unwrap();

    let summary = executor.run(&push_to("refs/heads/main")).await;

    assert_eq!(summary.status, RunStatus::Failed);
    let build = &summary.jobs["build"];
    assert_eq!(build.status, JobStatus::Failed);
    assert_eq!(build.steps.len(), 1);
    assert_eq!(build.steps[0].exit_code, 3);
    assert_eq!(
        summary.jobs["verify"].skip_reason,
        Some(SkipReason::DependencyFailed {
            dependency: "build".to_string()
        })
    );
    assert!(summary.publish.is_none());
}

#[tokio::test]
async fn test_skip_propagates_transitively() {
    let pipeline = r#"
version: "1"
name: gated-chain
jobs:
  - name: gate
    condition: ref == "refs/heads/main"
    steps:
      - name: noop
        run: "true"
  - name: middle
    needs: [gate]
    steps:
      - name: noop
        run: "true"
  - name: last
    needs: [middle]
    steps:
      - name: noop
        run: "true"
"#;
    let workspace = tempfile::tempdir().unwrap();
    let executor = PipelineExecutor::new(
        load(pipeline),
        Arc::new(MemoryStore::new()),
        workspace.path().to_path_buf(),
        None,
    )
    .unwrap();

    let summary = executor.run(&push_to("refs/heads/feature/x")).await;

    // A skip is not a failure; the run still succeeds.
    assert_eq!(summary.status, RunStatus::Succeeded);
    assert_eq!(
        summary.jobs["gate"].skip_reason,
        Some(SkipReason::ConditionNotMet)
    );
    assert_eq!(
        summary.jobs["middle"].skip_reason,
        Some(SkipReason::DependencySkipped {
            dependency: "gate".to_string()
        })
    );
    assert_eq!(
        summary.jobs["last"].skip_reason,
        Some(SkipReason::DependencySkipped {
            dependency: "middle".to_string()
        })
    );
}

#[tokio::test]
async fn test_consumer_sees_complete_artifact() {
    // The producer takes its time writing; the consumer must still observe
    // the full blob because handoff goes through the store, never the
    // producer's live workspace.
    let pipeline = r#"
version: "1"
name: handoff
jobs:
  - name: producer
    steps:
      - name: slow-write
        run: |
          printf 'part-one-' > blob
          sleep 0.2
          printf 'part-two' >> blob
    outputs:
      - name: blob
        path: blob
  - name: consumer
    needs: [producer]
    inputs:
      - job: producer
        name: blob
    steps:
      - name: read
        run: test "$(cat blob)" = "part-one-part-two"
"#;
    let workspace = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let executor = PipelineExecutor::new(
        load(pipeline),
        store.clone(),
        workspace.path().to_path_buf(),
        None,
    )
    .unwrap();

    let summary = executor.run(&push_to("refs/heads/main")).await;

    assert_eq!(summary.status, RunStatus::Succeeded);
    assert_eq!(summary.jobs["consumer"].status, JobStatus::Succeeded);
    let stored = store.resolve("producer", "blob").await.unwrap();
    assert_eq!(stored.size_bytes, "part-one-part-two".len() as u64);
}

#[tokio::test]
async fn test_independent_jobs_run_concurrently() {
    // Two 300ms sleeps with no edge between them; serial execution would
    // take 600ms.
    let pipeline = r#"
version: "1"
name: parallel
jobs:
  - name: left
    steps:
      - name: wait
        run: sleep 0.3
  - name: right
    steps:
      - name: wait
        run: sleep 0.3
"#;
    let workspace = tempfile::tempdir().unwrap();
    let executor = PipelineExecutor::new(
        load(pipeline),
        Arc::new(MemoryStore::new()),
        workspace.path().to_path_buf(),
        None,
    )
    .unwrap();

    let start = std::time::Instant::now();
    let summary = executor.run(&push_to("refs/heads/main")).await;
    let elapsed = start.elapsed();

    assert_eq!(summary.status, RunStatus::Succeeded);
    assert!(
        elapsed.as_millis() < 550,
        "jobs appear to have run serially: {elapsed:?}"
    );
}

#[tokio::test]
async fn test_cancellation_fails_running_and_skips_pending() {
    let pipeline = r#"
version: "1"
name: cancellable
jobs:
  - name: long
    steps:
      - name: wait
        run: sleep 30
  - name: after
    needs: [long]
    steps:
      - name: noop
        run: "true"
"#;
    let workspace = tempfile::tempdir().unwrap();
    let executor = PipelineExecutor::new(
        load(pipeline),
        Arc::new(MemoryStore::new()),
        workspace.path().to_path_buf(),
        None,
    )
    .unwrap();

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let _ = tx.send(true);
    });

    let start = std::time::Instant::now();
    let summary = executor
        .run_with_cancel(&push_to("refs/heads/main"), rx)
        .await;

    assert!(start.elapsed().as_secs() < 10, "cancellation did not stop the run");
    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(summary.jobs["long"].status, JobStatus::Failed);
    assert_eq!(
        summary.jobs["after"].skip_reason,
        Some(SkipReason::DependencyFailed {
            dependency: "long".to_string()
        })
    );
}

#[tokio::test]
async fn test_publish_failure_fails_run() {
    let workspace = tempfile::tempdir().unwrap();
    let host = Arc::new(FakeHost {
        fail_create: true,
        ..FakeHost::default()
    });
    let executor = PipelineExecutor::new(
        load(RELEASE_PIPELINE),
        Arc::new(MemoryStore::new()),
        workspace.path().to_path_buf(),
        Some(host),
    )
    .unwrap();

    let summary = executor.run(&push_to("refs/heads/main")).await;

    assert_eq!(summary.status, RunStatus::Failed);
    // All jobs passed; only the publish phase failed.
    assert!(summary.jobs.values().all(|j| j.status == JobStatus::Succeeded));
    assert!(matches!(
        summary.publish,
        Some(PublishOutcome::Failed { .. })
    ));
}

#[tokio::test]
async fn test_cycle_rejected_before_run() {
    let pipeline = r#"
version: "1"
name: cyclic
jobs:
  - name: a
    needs: [b]
    steps:
      - name: noop
        run: "true"
  - name: b
    needs: [a]
    steps:
      - name: noop
        run: "true"
"#;
    let workspace = tempfile::tempdir().unwrap();
    let result = PipelineExecutor::new(
        load(pipeline),
        Arc::new(MemoryStore::new()),
        workspace.path().to_path_buf(),
        None,
    );
    assert!(matches!(result, Err(Error::CyclicDependency { .. })));
}
