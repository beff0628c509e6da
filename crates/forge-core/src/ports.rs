//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the core domain and external
//! adapters: blob storage for artifacts and the remote release host.

use crate::artifact::{ArtifactHandle, ArtifactRef};
use crate::ids::ReleaseId;
use crate::release::ReleaseRecord;
use crate::Result;
use async_trait::async_trait;

/// Content-addressed blob store for job artifacts.
///
/// Keys are (producing job, artifact name). Writes are exclusive per key:
/// the first writer wins and a duplicate write is rejected. Reads are
/// unrestricted and repeatable.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store a blob under (job, name). Errors with `DuplicateArtifact` if the
    /// key already exists.
    async fn put(&self, job: &str, name: &str, bytes: &[u8]) -> Result<ArtifactRef>;

    /// Fetch a blob by handle.
    async fn get(&self, handle: &ArtifactHandle) -> Result<Vec<u8>>;

    /// Look up the reference for an existing (job, name) key.
    async fn resolve(&self, job: &str, name: &str) -> Result<ArtifactRef>;

    /// Names of all artifacts stored for a job.
    async fn list(&self, job: &str) -> Result<Vec<String>>;
}

/// Remote release-hosting service.
///
/// The implementation is expected to treat the tag as a single mutable
/// pointer; the publish protocol in `forge-publish` enforces that by
/// deleting any prior release under the tag before creating a new one.
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    /// Find the release currently under `tag`. Absence is not an error.
    async fn find_release(&self, tag: &str) -> Result<Option<ReleaseRecord>>;

    async fn delete_release(&self, id: &ReleaseId) -> Result<()>;

    async fn create_release(&self, tag: &str, title: &str, prerelease: bool)
        -> Result<ReleaseId>;

    async fn upload_asset(&self, id: &ReleaseId, filename: &str, bytes: Vec<u8>) -> Result<()>;
}
