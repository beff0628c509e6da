//! Run execution over the pipeline DAG.
//!
//! Jobs without a transitive dependency relation run concurrently; `needs`
//! edges impose the only ordering. A job becomes eligible once every
//! dependency is terminal; a non-succeeded dependency skips it (transitively)
//! and a false condition skips it without running its steps.

use crate::dag::PipelineDag;
use chrono::Utc;
use forge_core::context::PipelineContext;
use forge_core::ids::RunId;
use forge_core::pipeline::PipelineDefinition;
use forge_core::ports::{ArtifactStore, ReleaseHost};
use forge_core::run::{JobResult, JobStatus, PublishOutcome, RunStatus, RunSummary, SkipReason};
use forge_core::{Error, Result};
use forge_publish::{AssetPayload, Publisher};
use forge_runner::JobExecutor;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Executes runs of one loaded pipeline definition.
pub struct PipelineExecutor {
    definition: PipelineDefinition,
    dag: PipelineDag,
    store: Arc<dyn ArtifactStore>,
    host: Option<Arc<dyn ReleaseHost>>,
    workspace_root: PathBuf,
}

impl PipelineExecutor {
    /// Validates the definition (including cycle detection); on error the
    /// pipeline never starts.
    pub fn new(
        definition: PipelineDefinition,
        store: Arc<dyn ArtifactStore>,
        workspace_root: PathBuf,
        host: Option<Arc<dyn ReleaseHost>>,
    ) -> Result<Self> {
        let dag = PipelineDag::build(&definition)?;
        Ok(Self {
            definition,
            dag,
            store,
            host,
            workspace_root,
        })
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Run to completion without external cancellation.
    pub async fn run(&self, ctx: &PipelineContext) -> RunSummary {
        let (_keep_alive, cancel) = watch::channel(false);
        self.run_with_cancel(ctx, cancel).await
    }

    /// Run to completion. Sending `true` on the watch channel cancels the
    /// run: in-flight jobs are killed and recorded as failed, undecided jobs
    /// are skipped.
    pub async fn run_with_cancel(
        &self,
        ctx: &PipelineContext,
        mut cancel: watch::Receiver<bool>,
    ) -> RunSummary {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let start = std::time::Instant::now();

        info!(
            %run_id,
            pipeline = %self.definition.name,
            git_ref = %ctx.git_ref,
            event = %ctx.event,
            jobs = self.definition.jobs.len(),
            "Run started"
        );

        let executor = Arc::new(JobExecutor::new(
            self.store.clone(),
            self.workspace_root.clone(),
        ));

        let mut results: BTreeMap<String, JobResult> = BTreeMap::new();
        let mut running: HashSet<String> = HashSet::new();
        let mut join_set: JoinSet<JobResult> = JoinSet::new();
        let mut cancelled = false;
        let mut cancel_open = true;

        loop {
            self.settle_and_spawn(
                ctx,
                &executor,
                &mut results,
                &mut running,
                &mut join_set,
                cancelled,
            );

            if join_set.is_empty() {
                break;
            }

            tokio::select! {
                changed = cancel.changed(), if cancel_open && !cancelled => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            warn!(%run_id, "Run cancelled; terminating in-flight jobs");
                            cancelled = true;
                            join_set.abort_all();
                            while let Some(joined) = join_set.join_next().await {
                                if let Ok(result) = joined {
                                    // Finished before the abort landed.
                                    running.remove(&result.job);
                                    results.insert(result.job.clone(), result);
                                }
                            }
                            for job in running.drain() {
                                results.insert(
                                    job.clone(),
                                    JobResult::failed(job, "cancelled while running"),
                                );
                            }
                        }
                        Ok(()) => {}
                        Err(_) => cancel_open = false,
                    }
                }
                Some(joined) = join_set.join_next() => {
                    match joined {
                        Ok(result) => {
                            running.remove(&result.job);
                            info!(job = %result.job, status = ?result.status, "Job finished");
                            results.insert(result.job.clone(), result);
                        }
                        Err(e) => {
                            // A job task panicked; we cannot tell which one,
                            // so fail everything still marked running.
                            error!(error = %e, "Job task aborted unexpectedly");
                            join_set.abort_all();
                            while let Some(joined) = join_set.join_next().await {
                                if let Ok(result) = joined {
                                    running.remove(&result.job);
                                    results.insert(result.job.clone(), result);
                                }
                            }
                            for job in running.drain() {
                                results.insert(
                                    job.clone(),
                                    JobResult::failed(job, format!("job task aborted: {e}")),
                                );
                            }
                        }
                    }
                }
            }
        }

        let publish = self.publish_phase(&results).await;

        let jobs_failed = results.values().any(|r| r.status == JobStatus::Failed);
        let publish_failed = matches!(publish, Some(PublishOutcome::Failed { .. }));
        let status = if jobs_failed || publish_failed {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(%run_id, ?status, duration_ms, "Run finished");

        RunSummary {
            run_id,
            status,
            jobs: results,
            publish,
            started_at,
            completed_at: Utc::now(),
            duration_ms,
        }
    }

    /// Decide every job whose dependencies are all terminal: record skips
    /// (propagating failures transitively) and spawn the rest. Loops until a
    /// fixed point so chains of skips settle in one pass.
    fn settle_and_spawn(
        &self,
        ctx: &PipelineContext,
        executor: &Arc<JobExecutor>,
        results: &mut BTreeMap<String, JobResult>,
        running: &mut HashSet<String>,
        join_set: &mut JoinSet<JobResult>,
        cancelled: bool,
    ) {
        loop {
            let mut progressed = false;

            for node in self.dag.jobs() {
                if results.contains_key(&node.name) || running.contains(&node.name) {
                    continue;
                }

                let deps = self.dag.predecessors(&node.name);
                if !deps.iter().all(|d| results.contains_key(&d.name)) {
                    continue;
                }

                // Dependencies are terminal: propagate failure before even
                // looking at the job's own condition.
                if let Some(bad) = deps
                    .iter()
                    .find(|d| !results[&d.name].status.is_success())
                {
                    let reason = match results[&bad.name].status {
                        JobStatus::Failed => SkipReason::DependencyFailed {
                            dependency: bad.name.clone(),
                        },
                        _ => SkipReason::DependencySkipped {
                            dependency: bad.name.clone(),
                        },
                    };
                    info!(job = %node.name, %reason, "Job skipped");
                    results.insert(node.name.clone(), JobResult::skipped(&node.name, reason));
                    progressed = true;
                    continue;
                }

                if cancelled {
                    results.insert(
                        node.name.clone(),
                        JobResult::skipped(&node.name, SkipReason::Cancelled),
                    );
                    progressed = true;
                    continue;
                }

                if let Some(condition) = &node.spec.condition {
                    if !condition.evaluate(ctx) {
                        info!(job = %node.name, condition = %condition, "Job skipped (condition not met)");
                        results.insert(
                            node.name.clone(),
                            JobResult::skipped(&node.name, SkipReason::ConditionNotMet),
                        );
                        progressed = true;
                        continue;
                    }
                }

                running.insert(node.name.clone());
                let spec = node.spec.clone();
                let ctx = ctx.clone();
                let executor = executor.clone();
                join_set.spawn(async move { executor.execute(&spec, &ctx, None).await });
                progressed = true;
            }

            if !progressed {
                break;
            }
        }
    }

    /// Publish the release once the publish job succeeded. The publish job's
    /// own `needs`/`condition` already gated it like any other job.
    async fn publish_phase(
        &self,
        results: &BTreeMap<String, JobResult>,
    ) -> Option<PublishOutcome> {
        let release = self.definition.release.as_ref()?;
        let publish_job = self.definition.publish_job()?;
        let result = results.get(&publish_job.name)?;

        match result.status {
            JobStatus::Skipped => {
                let reason = result
                    .skip_reason
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "publish job skipped".to_string());
                info!(tag = %release.tag, %reason, "Publish skipped");
                Some(PublishOutcome::Skipped { reason })
            }
            JobStatus::Failed => Some(PublishOutcome::Skipped {
                reason: format!("publish job '{}' failed", publish_job.name),
            }),
            JobStatus::Succeeded => {
                let Some(host) = &self.host else {
                    return Some(PublishOutcome::Failed {
                        message: "no release host configured".to_string(),
                        retryable: false,
                    });
                };

                let mut payloads = Vec::with_capacity(release.assets.len());
                for asset in &release.assets {
                    match self.load_asset(&asset.job, &asset.artifact).await {
                        Ok(bytes) => payloads.push(AssetPayload {
                            remote_name: asset.remote_name().to_string(),
                            bytes,
                        }),
                        Err(e) => {
                            return Some(PublishOutcome::Failed {
                                message: e.to_string(),
                                retryable: false,
                            });
                        }
                    }
                }

                match Publisher::new(host.clone()).publish(release, payloads).await {
                    Ok(published) => Some(PublishOutcome::Published(published)),
                    Err(Error::Publish { message, retryable }) => {
                        error!(tag = %release.tag, %message, retryable, "Publish failed");
                        Some(PublishOutcome::Failed { message, retryable })
                    }
                    Err(e) => Some(PublishOutcome::Failed {
                        message: e.to_string(),
                        retryable: false,
                    }),
                }
            }
        }
    }

    async fn load_asset(&self, job: &str, artifact: &str) -> Result<Vec<u8>> {
        let artifact_ref = self.store.resolve(job, artifact).await?;
        self.store.get(&artifact_ref.handle).await
    }
}
