//! Job execution: one isolated workspace per job, inputs materialized before
//! the first step, outputs published to the artifact store after the last.

use crate::shell::{OutputLine, run_command};
use chrono::Utc;
use forge_core::artifact::ArtifactRef;
use forge_core::context::PipelineContext;
use forge_core::pipeline::JobSpec;
use forge_core::ports::ArtifactStore;
use forge_core::run::{JobResult, JobStatus, StepOutcome};
use forge_core::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Executes a single job.
///
/// Guarantees: steps run strictly in declared order; the first non-zero exit
/// aborts the job and later steps never run; on success every declared
/// output must exist in the workspace or the job fails regardless of exit
/// codes. Artifacts reach the store only when production succeeded, so a
/// consumer never observes a partial artifact.
pub struct JobExecutor {
    store: Arc<dyn ArtifactStore>,
    workspace_root: PathBuf,
}

impl JobExecutor {
    pub fn new(store: Arc<dyn ArtifactStore>, workspace_root: PathBuf) -> Self {
        Self {
            store,
            workspace_root,
        }
    }

    /// Run the job to completion. Infrastructure problems become a `Failed`
    /// result rather than an error; the caller always gets a terminal
    /// `JobResult`.
    pub async fn execute(
        &self,
        spec: &JobSpec,
        ctx: &PipelineContext,
        output_tx: Option<mpsc::Sender<OutputLine>>,
    ) -> JobResult {
        let started_at = Utc::now();
        let start = std::time::Instant::now();
        let mut steps: Vec<StepOutcome> = Vec::new();

        let failed = |failure: String, steps: Vec<StepOutcome>, duration_ms: u64| JobResult {
            job: spec.name.clone(),
            status: JobStatus::Failed,
            skip_reason: None,
            failure: Some(failure),
            steps,
            artifacts: Vec::new(),
            started_at: Some(started_at),
            completed_at: Some(Utc::now()),
            duration_ms,
        };

        let workspace = self.workspace_root.join(spec.name.replace(['/', '\\'], "_"));
        if let Err(e) = self.prepare_workspace(spec, &workspace).await {
            warn!(job = %spec.name, error = %e, "Workspace preparation failed");
            return failed(e.to_string(), steps, start.elapsed().as_millis() as u64);
        }

        let mut env: HashMap<String, String> = HashMap::new();
        env.insert("FORGE_REF".to_string(), ctx.git_ref.clone());
        env.insert("FORGE_EVENT".to_string(), ctx.event.to_string());

        info!(job = %spec.name, steps = spec.steps.len(), "Job started");

        for step in &spec.steps {
            let work_dir = match &step.working_directory {
                Some(dir) => workspace.join(dir),
                None => workspace.clone(),
            };

            let mut step_env = env.clone();
            step_env.extend(step.env.clone());

            let output = match run_command(&step.run, &work_dir, &step_env, output_tx.clone()).await
            {
                Ok(output) => output,
                Err(e) => {
                    return failed(e.to_string(), steps, start.elapsed().as_millis() as u64);
                }
            };

            let exit_code = output.exit_code;
            steps.push(StepOutcome {
                name: step.name.clone(),
                exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
                duration_ms: output.duration_ms,
            });

            if exit_code != 0 {
                let e = Error::StepFailed {
                    job: spec.name.clone(),
                    step: step.name.clone(),
                    exit_code,
                };
                warn!(job = %spec.name, step = %step.name, exit_code, "Step failed");
                return failed(e.to_string(), steps, start.elapsed().as_millis() as u64);
            }
        }

        let artifacts = match self.collect_outputs(spec, &workspace).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                warn!(job = %spec.name, error = %e, "Output collection failed");
                return failed(e.to_string(), steps, start.elapsed().as_millis() as u64);
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(job = %spec.name, duration_ms, artifacts = artifacts.len(), "Job succeeded");

        JobResult {
            job: spec.name.clone(),
            status: JobStatus::Succeeded,
            skip_reason: None,
            failure: None,
            steps,
            artifacts,
            started_at: Some(started_at),
            completed_at: Some(Utc::now()),
            duration_ms,
        }
    }

    /// Create the isolated workspace and materialize declared inputs
    /// (fetch-before-use).
    async fn prepare_workspace(&self, spec: &JobSpec, workspace: &Path) -> Result<()> {
        tokio::fs::create_dir_all(workspace).await?;

        for input in &spec.inputs {
            let artifact = self.store.resolve(&input.job, &input.name).await?;
            let bytes = self.store.get(&artifact.handle).await?;

            let dest = workspace.join(input.local_path());
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&dest, &bytes).await?;
            info!(
                job = %spec.name,
                from = %input.job,
                name = %input.name,
                path = %dest.display(),
                "Input materialized"
            );
        }

        Ok(())
    }

    /// Verify declared outputs exist and publish them to the store.
    async fn collect_outputs(&self, spec: &JobSpec, workspace: &Path) -> Result<Vec<ArtifactRef>> {
        let mut artifacts = Vec::with_capacity(spec.outputs.len());

        for output in &spec.outputs {
            let path = workspace.join(&output.path);
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(Error::MissingOutput {
                        job: spec.name.clone(),
                        name: output.name.clone(),
                        path: output.path.clone(),
                    });
                }
                Err(e) => return Err(e.into()),
            };

            let artifact = self.store.put(&spec.name, &output.name, &bytes).await?;
            artifacts.push(artifact);
        }

        Ok(artifacts)
    }
}
