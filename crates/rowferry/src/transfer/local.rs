//! Local-directory transfer backend.
//!
//! Maps remote paths onto a directory on the local filesystem with the same
//! replace/NotFound semantics as the SFTP client. Backs tests and offline
//! development.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::FileTransfer;
use crate::error::{FerryError, Result};

/// File transfer against a local directory standing in for the remote.
pub struct LocalDirTransfer {
    root: PathBuf,
}

impl LocalDirTransfer {
    /// Treat `root` as the remote filesystem root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, remote_path: &str) -> PathBuf {
        self.root.join(remote_path.trim_start_matches('/'))
    }
}

#[async_trait]
impl FileTransfer for LocalDirTransfer {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let target = self.resolve(remote_path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &target).await?;
        debug!("Copied {} to {}", local_path.display(), target.display());
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let source = self.resolve(remote_path);
        if !source.exists() {
            return Err(FerryError::NotFound(format!(
                "remote file not found: {}",
                remote_path
            )));
        }
        tokio::fs::copy(&source, local_path).await?;
        debug!("Copied {} to {}", source.display(), local_path.display());
        Ok(())
    }
}
