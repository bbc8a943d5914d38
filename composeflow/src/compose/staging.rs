//! Single-slot staged spec per context.

use crate::errors::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Location of the staged compose file of each context.
///
/// Each context has exactly one slot; staging overwrites it. Slots of
/// different contexts never collide because the file name carries the
/// context name.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// Creates a staging area rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the slots.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the context's slot.
    #[must_use]
    pub fn spec_path(&self, context: &str) -> PathBuf {
        self.dir.join(format!("docker-compose_{context}.yaml"))
    }

    /// Writes `text` into the context's slot, replacing what was there.
    pub async fn persist(&self, context: &str, text: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.spec_path(context);
        tokio::fs::write(&path, text).await?;
        debug!(context = %context, path = %path.display(), "Staged compose spec");
        Ok(path)
    }
}
