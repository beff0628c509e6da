//! Idempotent create-or-replace publishing of a floating release tag.

use forge_core::ports::ReleaseHost;
use forge_core::release::{PublishResult, ReleaseTarget};
use forge_core::{Error, Result};
use std::sync::Arc;
use tracing::info;

/// An artifact resolved to bytes, ready to attach to a release.
#[derive(Debug, Clone)]
pub struct AssetPayload {
    pub remote_name: String,
    pub bytes: Vec<u8>,
}

pub struct Publisher {
    host: Arc<dyn ReleaseHost>,
}

impl Publisher {
    pub fn new(host: Arc<dyn ReleaseHost>) -> Self {
        Self { host }
    }

    /// Publish `target`, replacing any prior release under its tag.
    ///
    /// Protocol: find the release currently under the tag (absence is not an
    /// error), delete it if present, create the new release, upload each
    /// asset. The tag is thereby a single mutable pointer, never a growing
    /// history.
    ///
    /// If anything fails after the delete, the remote is left without a
    /// release under the tag and the error is marked retryable; no attempt
    /// is made to restore the prior release. Re-running with the same inputs
    /// converges: the next attempt finds nothing (or a partial release) to
    /// delete and creates the release again.
    pub async fn publish(
        &self,
        target: &ReleaseTarget,
        assets: Vec<AssetPayload>,
    ) -> Result<PublishResult> {
        let existing = self.host.find_release(&target.tag).await?;
        let replaced_existing = existing.is_some();

        if let Some(prior) = existing {
            info!(tag = %target.tag, id = %prior.id, "Replacing existing release");
            self.host.delete_release(&prior.id).await?;
        }

        // Past the delete, every failure leaves a gap under the tag; make
        // sure the caller knows a retry is the way back to a good state.
        let release_id = self
            .host
            .create_release(&target.tag, &target.title, target.prerelease)
            .await
            .map_err(force_retryable)?;

        let mut uploaded = 0u32;
        for asset in assets {
            self.host
                .upload_asset(&release_id, &asset.remote_name, asset.bytes)
                .await
                .map_err(force_retryable)?;
            uploaded += 1;
        }

        info!(
            tag = %target.tag,
            id = %release_id,
            assets = uploaded,
            replaced = replaced_existing,
            "Release published"
        );

        Ok(PublishResult {
            release_id,
            tag: target.tag.clone(),
            replaced_existing,
            assets_uploaded: uploaded,
        })
    }
}

fn force_retryable(e: Error) -> Error {
    match e {
        Error::Publish { message, .. } => Error::Publish {
            message,
            retryable: true,
        },
        other => other,
    }
}
