//! Filesystem-backed artifact store.

use async_trait::async_trait;
use forge_core::artifact::{ArtifactHandle, ArtifactRef};
use forge_core::ports::ArtifactStore;
use forge_core::{Error, Result};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Stores each artifact as a file at `root/<job>/<name>`.
///
/// Write-once is enforced with `create_new`, so concurrent duplicate-key
/// writes race on the filesystem and exactly one wins.
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn sanitize(segment: &str) -> String {
        segment.replace(['/', '\\', ':'], "_")
    }

    fn key_path(&self, job: &str, name: &str) -> PathBuf {
        self.root
            .join(Self::sanitize(job))
            .join(Self::sanitize(name))
    }

    fn split_handle(handle: &ArtifactHandle) -> Result<(&str, &str)> {
        handle
            .as_str()
            .split_once('/')
            .filter(|(job, name)| !job.is_empty() && !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| Error::InvalidHandle(handle.to_string()))
    }
}

#[async_trait]
impl ArtifactStore for FilesystemStore {
    async fn put(&self, job: &str, name: &str, bytes: &[u8]) -> Result<ArtifactRef> {
        let path = self.key_path(job, name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // First writer wins; a second writer gets AlreadyExists.
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::DuplicateArtifact {
                    job: job.to_string(),
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        file.write_all(bytes).await?;
        file.flush().await?;

        let checksum = crate::checksum(bytes);
        debug!(job, name, size = bytes.len(), %checksum, "Artifact stored");

        Ok(ArtifactRef {
            job: job.to_string(),
            name: name.to_string(),
            handle: ArtifactHandle::new(format!(
                "{}/{}",
                Self::sanitize(job),
                Self::sanitize(name)
            )),
            size_bytes: bytes.len() as u64,
            checksum,
        })
    }

    async fn get(&self, handle: &ArtifactHandle) -> Result<Vec<u8>> {
        let (job, name) = Self::split_handle(handle)?;
        let path = self.root.join(job).join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::ArtifactNotFound {
                job: job.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve(&self, job: &str, name: &str) -> Result<ArtifactRef> {
        let path = self.key_path(job, name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::ArtifactNotFound {
                    job: job.to_string(),
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        Ok(ArtifactRef {
            job: job.to_string(),
            name: name.to_string(),
            handle: ArtifactHandle::new(format!(
                "{}/{}",
                Self::sanitize(job),
                Self::sanitize(name)
            )),
            size_bytes: bytes.len() as u64,
            checksum: crate::checksum(&bytes),
        })
    }

    async fn list(&self, job: &str) -> Result<Vec<String>> {
        let dir = self.root.join(Self::sanitize(job));
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path().to_path_buf());

        let artifact = store.put("build", "binary", b"elf bytes").await.unwrap();
        assert_eq!(artifact.size_bytes, 9);
        assert_eq!(artifact.checksum, crate::checksum(b"elf bytes"));

        let bytes = store.get(&artifact.handle).await.unwrap();
        assert_eq!(bytes, b"elf bytes");
    }

    #[tokio::test]
    async fn test_write_once_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path().to_path_buf());

        store.put("build", "binary", b"first").await.unwrap();
        let err = store.put("build", "binary", b"second").await.unwrap_err();
        assert!(matches!(err, Error::DuplicateArtifact { .. }));

        // First writer's bytes survive
        let artifact = store.resolve("build", "binary").await.unwrap();
        assert_eq!(store.get(&artifact.handle).await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path().to_path_buf());

        let err = store.resolve("build", "binary").await.unwrap_err();
        assert!(matches!(err, Error::ArtifactNotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_per_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path().to_path_buf());

        store.put("build", "binary", b"a").await.unwrap();
        store.put("build", "checksums", b"b").await.unwrap();
        store.put("docs", "manual", b"c").await.unwrap();

        assert_eq!(store.list("build").await.unwrap(), vec!["binary", "checksums"]);
        assert_eq!(store.list("nope").await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_sanitized_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path().to_path_buf());

        let artifact = store
            .put("build", "target/release/app", b"bin")
            .await
            .unwrap();
        assert_eq!(artifact.handle.as_str(), "build/target_release_app");
        assert_eq!(store.get(&artifact.handle).await.unwrap(), b"bin");
    }
}
