//! Release target and remote release types.

use crate::ids::ReleaseId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where a successful pipeline publishes to.
///
/// The tag is a floating pointer: publishing the same tag again replaces the
/// prior release rather than creating another one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReleaseTarget {
    /// Stable tag identifier, e.g. `latest`.
    pub tag: String,
    /// Human-readable release title.
    pub title: String,
    #[serde(default)]
    pub prerelease: bool,
    /// Artifacts attached to the release as assets.
    #[serde(default)]
    pub assets: Vec<AssetSpec>,
}

/// Maps a stored artifact to a remote asset file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AssetSpec {
    /// Job that produced the artifact.
    pub job: String,
    /// Declared artifact name on that job.
    pub artifact: String,
    /// File name on the release; defaults to the artifact name.
    #[serde(default)]
    pub remote_name: Option<String>,
}

impl AssetSpec {
    pub fn remote_name(&self) -> &str {
        self.remote_name.as_deref().unwrap_or(&self.artifact)
    }
}

/// A release record as seen on the remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReleaseRecord {
    pub id: ReleaseId,
    pub tag: String,
    pub title: String,
    pub prerelease: bool,
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PublishResult {
    pub release_id: ReleaseId,
    pub tag: String,
    /// True when a prior release under the tag was deleted first.
    pub replaced_existing: bool,
    pub assets_uploaded: u32,
}
