//! Run and job result types.

use crate::artifact::ArtifactRef;
use crate::ids::RunId;
use crate::release::PublishResult;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Terminal status of a job. A `JobResult` is only created once the job is
/// finished or skipped, so every status here is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded)
    }
}

/// Why a job was skipped without running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    ConditionNotMet,
    DependencyFailed { dependency: String },
    DependencySkipped { dependency: String },
    /// The run was cancelled before the job became eligible.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ConditionNotMet => write!(f, "condition not met"),
            SkipReason::DependencyFailed { dependency } => {
                write!(f, "dependency '{dependency}' failed")
            }
            SkipReason::DependencySkipped { dependency } => {
                write!(f, "dependency '{dependency}' was skipped")
            }
            SkipReason::Cancelled => write!(f, "run cancelled"),
        }
    }
}

/// Outcome of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepOutcome {
    pub name: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl StepOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Immutable record of how a job finished.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobResult {
    pub job: String,
    pub status: JobStatus,
    /// Present iff status is `Skipped`.
    pub skip_reason: Option<SkipReason>,
    /// Human-readable failure reason; present iff status is `Failed`.
    pub failure: Option<String>,
    /// Executed steps in order; steps after the first failure never ran and
    /// have no entry.
    pub steps: Vec<StepOutcome>,
    /// Artifacts produced by this job (empty unless `Succeeded`).
    pub artifacts: Vec<ArtifactRef>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

impl JobResult {
    pub fn skipped(job: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            job: job.into(),
            status: JobStatus::Skipped,
            skip_reason: Some(reason),
            failure: None,
            steps: Vec::new(),
            artifacts: Vec::new(),
            started_at: None,
            completed_at: Some(Utc::now()),
            duration_ms: 0,
        }
    }

    pub fn failed(job: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            status: JobStatus::Failed,
            skip_reason: None,
            failure: Some(reason.into()),
            steps: Vec::new(),
            artifacts: Vec::new(),
            started_at: None,
            completed_at: Some(Utc::now()),
            duration_ms: 0,
        }
    }
}

/// Terminal status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// What happened to the release publish for this run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublishOutcome {
    Published(PublishResult),
    Skipped { reason: String },
    Failed { message: String, retryable: bool },
}

/// Result of a whole pipeline run.
///
/// `status` is `Succeeded` only if no job failed and the publish (if any)
/// went through; artifacts of succeeded jobs remain available either way.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunSummary {
    pub run_id: RunId,
    pub status: RunStatus,
    pub jobs: BTreeMap<String, JobResult>,
    pub publish: Option<PublishOutcome>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}
