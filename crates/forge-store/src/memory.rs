//! In-memory artifact store for tests and embedding.

use async_trait::async_trait;
use forge_core::artifact::{ArtifactHandle, ArtifactRef};
use forge_core::ports::ArtifactStore;
use forge_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(job: &str, name: &str) -> String {
        format!("{job}/{name}")
    }

    fn make_ref(job: &str, name: &str, bytes: &[u8]) -> ArtifactRef {
        ArtifactRef {
            job: job.to_string(),
            name: name.to_string(),
            handle: ArtifactHandle::new(Self::key(job, name)),
            size_bytes: bytes.len() as u64,
            checksum: crate::checksum(bytes),
        }
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn put(&self, job: &str, name: &str, bytes: &[u8]) -> Result<ArtifactRef> {
        let mut blobs = self.blobs.lock().expect("store lock");
        let key = Self::key(job, name);
        if blobs.contains_key(&key) {
            return Err(Error::DuplicateArtifact {
                job: job.to_string(),
                name: name.to_string(),
            });
        }
        blobs.insert(key, bytes.to_vec());
        Ok(Self::make_ref(job, name, bytes))
    }

    async fn get(&self, handle: &ArtifactHandle) -> Result<Vec<u8>> {
        let blobs = self.blobs.lock().expect("store lock");
        blobs.get(handle.as_str()).cloned().ok_or_else(|| {
            let (job, name) = handle.as_str().split_once('/').unwrap_or(("", handle.as_str()));
            Error::ArtifactNotFound {
                job: job.to_string(),
                name: name.to_string(),
            }
        })
    }

    async fn resolve(&self, job: &str, name: &str) -> Result<ArtifactRef> {
        let blobs = self.blobs.lock().expect("store lock");
        blobs
            .get(&Self::key(job, name))
            .map(|bytes| Self::make_ref(job, name, bytes))
            .ok_or_else(|| Error::ArtifactNotFound {
                job: job.to_string(),
                name: name.to_string(),
            })
    }

    async fn list(&self, job: &str) -> Result<Vec<String>> {
        let blobs = self.blobs.lock().expect("store lock");
        let prefix = format!("{job}/");
        let mut names: Vec<String> = blobs
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .map(|n| n.to_string())
            .collect();
        names.sort();
        Ok(names)
    }
}
