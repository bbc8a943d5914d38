//! Mount staging: token substitution plus payload upload.

use crate::errors::Result;
use crate::transfer::{FileTransfer, TransferClient};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// A file to place on the target host and the spec token naming it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountDescriptor {
    /// Placeholder text expected in the spec.
    pub token: String,
    /// Destination path on the target host; replaces the token.
    pub source_path: String,
    /// File contents.
    pub payload: Vec<u8>,
}

impl MountDescriptor {
    /// Creates a new mount descriptor.
    pub fn new(
        token: impl Into<String>,
        source_path: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            token: token.into(),
            source_path: source_path.into(),
            payload: payload.into(),
        }
    }

    /// File name used for the local scratch copy.
    #[must_use]
    pub fn scratch_name(&self, index: usize) -> String {
        Path::new(&self.source_path)
            .file_name()
            .map_or_else(|| format!("mount-{index}"), |n| n.to_string_lossy().into_owned())
    }
}

/// Replaces every occurrence of each token with its source path.
///
/// Descriptors are applied in the given order. A token that does not occur
/// leaves the text unchanged. Empty tokens are ignored.
#[must_use]
pub fn substitute_tokens(raw_text: &str, mounts: &[MountDescriptor]) -> String {
    let mut text = raw_text.to_string();
    for mount in mounts {
        if mount.token.is_empty() {
            warn!(source_path = %mount.source_path, "Ignoring mount with empty token");
            continue;
        }
        if text.contains(&mount.token) {
            text = text.replace(&mount.token, &mount.source_path);
        } else {
            debug!(token = %mount.token, "Mount token not present in spec");
        }
    }
    text
}

/// Rewrites a spec for its mounts and uploads the mount payloads.
#[derive(Debug, Clone)]
pub struct MountStager {
    scratch_dir: PathBuf,
    transfer: TransferClient,
}

impl MountStager {
    /// Creates a stager writing scratch copies under `scratch_dir`.
    pub fn new(scratch_dir: impl Into<PathBuf>, transfer: TransferClient) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            transfer,
        }
    }

    /// Substitutes tokens, writes payloads to scratch and copies them to
    /// the host behind `endpoint`. Returns the rewritten spec text.
    ///
    /// The scratch directory is removed whether or not the copy succeeded.
    pub async fn stage(
        &self,
        mounts: &[MountDescriptor],
        raw_text: &str,
        endpoint: &str,
    ) -> Result<String> {
        let updated = substitute_tokens(raw_text, mounts);

        let scratch = self
            .scratch_dir
            .join(format!("composeflow-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&scratch).await?;

        let outcome = self.write_and_copy(&scratch, mounts, endpoint).await;

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            warn!(path = %scratch.display(), error = %e, "Failed to remove mount scratch dir");
        }

        outcome?;
        Ok(updated)
    }

    async fn write_and_copy(
        &self,
        scratch: &Path,
        mounts: &[MountDescriptor],
        endpoint: &str,
    ) -> Result<()> {
        let mut files = Vec::with_capacity(mounts.len());
        for (index, mount) in mounts.iter().enumerate() {
            // One slot per mount: payloads may share a basename.
            let slot = scratch.join(index.to_string());
            tokio::fs::create_dir_all(&slot).await?;
            let local = slot.join(mount.scratch_name(index));
            tokio::fs::write(&local, &mount.payload).await?;
            files.push(FileTransfer::new(local, mount.source_path.clone()));
        }

        self.transfer.copy_files(endpoint, &files).await?;
        Ok(())
    }
}
