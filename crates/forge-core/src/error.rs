//! Error types for Forge CD.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Definition errors: fatal at load time, the pipeline never starts
    #[error("Cyclic dependency between jobs: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Job '{job}' depends on unknown job '{dependency}'")]
    UnknownDependency { job: String, dependency: String },

    #[error("Duplicate job name: {0}")]
    DuplicateJob(String),

    #[error("Pipeline has no jobs")]
    EmptyPipeline,

    #[error("Invalid condition '{expr}': {message}")]
    InvalidCondition { expr: String, message: String },

    #[error("Job '{job}' consumes an artifact from '{from}', which is not in its needs")]
    InputNotInNeeds { job: String, from: String },

    #[error("More than one publish job: '{first}' and '{second}'")]
    MultiplePublishJobs { first: String, second: String },

    #[error("Release asset references '{job}/{artifact}', which no job declares as an output")]
    UnknownReleaseAsset { job: String, artifact: String },

    #[error("Pipeline defines a release but no job is marked publish")]
    MissingPublishJob,

    #[error("Job '{0}' is marked publish but the pipeline defines no release")]
    MissingReleaseTarget(String),

    // Execution errors: local to a job, recorded in its result
    #[error("Step '{step}' in job '{job}' failed with exit code {exit_code}")]
    StepFailed {
        job: String,
        step: String,
        exit_code: i32,
    },

    #[error("Job '{job}' declared output '{name}' but '{path}' does not exist")]
    MissingOutput {
        job: String,
        name: String,
        path: String,
    },

    // Artifact store errors
    #[error("Artifact already exists: {job}/{name}")]
    DuplicateArtifact { job: String, name: String },

    #[error("Artifact not found: {job}/{name}")]
    ArtifactNotFound { job: String, name: String },

    #[error("Invalid artifact handle: {0}")]
    InvalidHandle(String),

    // Publish errors: surfaced to the invoker; retry must be safe
    #[error("Publish failed (retryable: {retryable}): {message}")]
    Publish { message: String, retryable: bool },

    // Infrastructure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors that reject the pipeline definition before any job runs.
    pub fn is_definition(&self) -> bool {
        matches!(
            self,
            Error::CyclicDependency { .. }
                | Error::UnknownDependency { .. }
                | Error::DuplicateJob(_)
                | Error::EmptyPipeline
                | Error::InvalidCondition { .. }
                | Error::InputNotInNeeds { .. }
                | Error::MultiplePublishJobs { .. }
                | Error::UnknownReleaseAsset { .. }
                | Error::MissingPublishJob
                | Error::MissingReleaseTarget(_)
        )
    }

    /// True when retrying the failed operation with the same inputs is safe
    /// and may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Publish { retryable: true, .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
