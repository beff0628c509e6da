//! Per-invocation context.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The external event that started a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
    Schedule,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
            EventKind::Schedule => "schedule",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(EventKind::Push),
            "pull_request" => Ok(EventKind::PullRequest),
            "schedule" => Ok(EventKind::Schedule),
            other => Err(format!(
                "unknown event '{other}' (expected push, pull_request, or schedule)"
            )),
        }
    }
}

/// Immutable facts about a single pipeline invocation.
///
/// Created once when the run starts; every condition and job sees the same
/// value. There is no ambient/global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineContext {
    /// Fully-qualified git ref, e.g. `refs/heads/main`.
    pub git_ref: String,
    pub event: EventKind,
}

impl PipelineContext {
    pub fn new(git_ref: impl Into<String>, event: EventKind) -> Self {
        Self {
            git_ref: git_ref.into(),
            event,
        }
    }
}
