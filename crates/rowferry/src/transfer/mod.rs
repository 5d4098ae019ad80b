//! Remote file transfer.
//!
//! [`FileTransfer`] is the seam between the migration pipeline and the wire:
//! [`SftpTransfer`] is the production implementation, [`LocalDirTransfer`]
//! serves tests and offline development. Both are idempotent at the
//! destination path (an existing file is replaced, never appended to), and
//! both keep "the file is not there" ([`crate::error::FerryError::NotFound`])
//! distinct from "the endpoint is unreachable"
//! ([`crate::error::FerryError::Transport`]).
//!
//! Neither implementation retries internally; callers that want retry wrap
//! these calls themselves.

mod local;
mod sftp;

pub use local::LocalDirTransfer;
pub use sftp::SftpTransfer;

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// File transfer operations against a remote endpoint.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Upload a local file, replacing any file already at `remote_path`.
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Download a remote file to `local_path`, overwriting it.
    ///
    /// A missing remote file is a `NotFound` error.
    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()>;
}

/// Join a file name beneath the configured base remote directory.
pub fn join_remote(base_dir: &str, name: &str) -> String {
    let base = base_dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if base.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", base, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/outbound", "users.csv"), "/outbound/users.csv");
        assert_eq!(join_remote("/outbound/", "users.csv"), "/outbound/users.csv");
        assert_eq!(join_remote("/", "users.csv"), "/users.csv");
        assert_eq!(join_remote("/outbound", "/users.csv"), "/outbound/users.csv");
    }
}
