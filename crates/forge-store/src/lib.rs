//! Artifact store adapters.
//!
//! Both adapters implement the `ArtifactStore` port from `forge-core`:
//! write-once per (job, name) key, repeatable reads, SHA-256 checksums.

pub mod filesystem;
pub mod memory;

pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

pub(crate) fn checksum(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(bytes))
}
