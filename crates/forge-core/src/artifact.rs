//! Artifact references.
//!
//! An artifact is an immutable named byte blob produced by exactly one job.
//! The store enforces write-once at put time; consumers only ever see blobs
//! from jobs that already succeeded.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque content handle issued by an artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ArtifactHandle(String);

impl ArtifactHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a stored artifact, keyed by (producing job, name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactRef {
    pub job: String,
    pub name: String,
    pub handle: ArtifactHandle,
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 of the content.
    pub checksum: String,
}
