//! Pipeline definition types.
//!
//! These types represent the user-authored pipeline YAML configuration.

use crate::condition::Condition;
use crate::error::{Error, Result};
use crate::release::ReleaseTarget;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineDefinition {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub jobs: Vec<JobSpec>,
    /// Release to publish when the publish job succeeds.
    #[serde(default)]
    pub release: Option<ReleaseTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobSpec {
    pub name: String,
    /// Jobs that must reach a terminal state before this one starts.
    #[serde(default)]
    pub needs: Vec<String>,
    /// Predicate over the invocation context; absent means always run.
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    /// Artifacts this job promises to produce.
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
    /// Artifacts from upstream jobs materialized before steps run.
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    /// Marks the job whose success triggers the release publish.
    #[serde(default)]
    pub publish: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepSpec {
    pub name: String,
    /// Shell command, executed via `sh -c`.
    pub run: String,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// An artifact the job promises at `path` (relative to its workspace).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OutputSpec {
    pub name: String,
    pub path: String,
}

/// An artifact consumed from an upstream job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InputSpec {
    /// Producing job; must appear in this job's `needs`.
    pub job: String,
    pub name: String,
    /// Where to materialize the blob in the consumer workspace;
    /// defaults to the artifact name.
    #[serde(default)]
    pub path: Option<String>,
}

impl InputSpec {
    pub fn local_path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }
}

impl PipelineDefinition {
    /// Load-time validation beyond what serde enforces.
    ///
    /// Cycle detection lives in the DAG builder; everything else that can
    /// reject a definition is here.
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            return Err(Error::EmptyPipeline);
        }

        let mut names = HashSet::new();
        for job in &self.jobs {
            if !names.insert(job.name.as_str()) {
                return Err(Error::DuplicateJob(job.name.clone()));
            }
        }

        for job in &self.jobs {
            for dep in &job.needs {
                if !names.contains(dep.as_str()) {
                    return Err(Error::UnknownDependency {
                        job: job.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            let mut output_names = HashSet::new();
            for output in &job.outputs {
                if !output_names.insert(output.name.as_str()) {
                    return Err(Error::DuplicateArtifact {
                        job: job.name.clone(),
                        name: output.name.clone(),
                    });
                }
            }
            for input in &job.inputs {
                if !job.needs.iter().any(|n| n == &input.job) {
                    return Err(Error::InputNotInNeeds {
                        job: job.name.clone(),
                        from: input.job.clone(),
                    });
                }
            }
        }

        let mut publish_job: Option<&str> = None;
        for job in self.jobs.iter().filter(|j| j.publish) {
            match publish_job {
                None => publish_job = Some(&job.name),
                Some(first) => {
                    return Err(Error::MultiplePublishJobs {
                        first: first.to_string(),
                        second: job.name.clone(),
                    });
                }
            }
        }

        match (&self.release, publish_job) {
            (Some(release), Some(_)) => {
                for asset in &release.assets {
                    let declared = self.jobs.iter().any(|j| {
                        j.name == asset.job && j.outputs.iter().any(|o| o.name == asset.artifact)
                    });
                    if !declared {
                        return Err(Error::UnknownReleaseAsset {
                            job: asset.job.clone(),
                            artifact: asset.artifact.clone(),
                        });
                    }
                }
            }
            (Some(_), None) => return Err(Error::MissingPublishJob),
            (None, Some(job)) => return Err(Error::MissingReleaseTarget(job.to_string())),
            (None, None) => {}
        }

        Ok(())
    }

    pub fn job(&self, name: &str) -> Option<&JobSpec> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn publish_job(&self) -> Option<&JobSpec> {
        self.jobs.iter().find(|j| j.publish)
    }
}
