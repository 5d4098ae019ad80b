//! SFTP transfer implementation over libssh2.
//!
//! The session is dialed lazily on first use and cached; every call runs on
//! the blocking pool with the session behind a mutex, which also serializes
//! concurrent transfers through one client instance (a libssh2 session is
//! not safe for simultaneous use). A failed operation drops the cached
//! session so the next call re-dials.

use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ssh2::{Session, Sftp};
use tracing::{debug, info};

use super::FileTransfer;
use crate::config::SftpConfig;
use crate::error::{FerryError, Result};

struct SftpHandle {
    // Held so the connection outlives the Sftp channel.
    _session: Session,
    sftp: Sftp,
}

/// SFTP file transfer client with a single lazily-established session.
pub struct SftpTransfer {
    config: SftpConfig,
    handle: Arc<Mutex<Option<SftpHandle>>>,
}

impl SftpTransfer {
    /// Create a client; no connection is made until the first transfer.
    pub fn new(config: SftpConfig) -> Self {
        Self {
            config,
            handle: Arc::new(Mutex::new(None)),
        }
    }

    async fn with_sftp<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Sftp) -> Result<T> + Send + 'static,
    {
        let config = self.config.clone();
        let handle = Arc::clone(&self.handle);

        tokio::task::spawn_blocking(move || {
            let mut guard = handle
                .lock()
                .map_err(|_| FerryError::transport("transfer client mutex poisoned"))?;

            if guard.is_none() {
                *guard = Some(connect(&config)?);
            }
            let result = match guard.as_ref() {
                Some(h) => op(&h.sftp),
                None => Err(FerryError::transport("SFTP session unavailable")),
            };
            if matches!(result, Err(FerryError::Transport(_)) | Err(FerryError::Io(_))) {
                // Session may be wedged; re-dial on the next call.
                *guard = None;
            }
            result
        })
        .await
        .map_err(|e| FerryError::transport(format!("transfer task failed: {}", e)))?
    }
}

/// Dial, handshake and authenticate. Every failure here is a transport
/// error; nothing file-related has happened yet.
fn connect(config: &SftpConfig) -> Result<SftpHandle> {
    let addr = format!("{}:{}", config.host, config.port);
    let tcp = TcpStream::connect(&addr)
        .map_err(|e| FerryError::transport(format!("connecting to {}: {}", addr, e)))?;

    let mut session = Session::new()
        .map_err(|e| FerryError::transport(format!("creating SSH session: {}", e)))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| FerryError::transport(format!("SSH handshake with {}: {}", addr, e)))?;
    session
        .userauth_password(&config.username, &config.password)
        .map_err(|e| {
            FerryError::transport(format!("authenticating as {}: {}", config.username, e))
        })?;

    let sftp = session
        .sftp()
        .map_err(|e| FerryError::transport(format!("opening SFTP channel: {}", e)))?;

    info!("Connected to SFTP endpoint {}", addr);
    Ok(SftpHandle {
        _session: session,
        sftp,
    })
}

#[async_trait]
impl FileTransfer for SftpTransfer {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let local: PathBuf = local_path.to_path_buf();
        let remote = remote_path.to_string();

        self.with_sftp(move |sftp| {
            let remote_p = Path::new(&remote);

            // Replace semantics: clear any previous file at this path first.
            if sftp.stat(remote_p).is_ok() {
                sftp.unlink(remote_p).map_err(|e| {
                    FerryError::transport(format!(
                        "deleting existing remote file {}: {}",
                        remote, e
                    ))
                })?;
                debug!("Deleted existing remote file {}", remote);
            }

            let mut local_file = std::fs::File::open(&local)?;
            let mut remote_file = sftp.create(remote_p).map_err(|e| {
                FerryError::transport(format!("creating remote file {}: {}", remote, e))
            })?;
            std::io::copy(&mut local_file, &mut remote_file)?;

            info!("Uploaded {} to remote {}", local.display(), remote);
            Ok(())
        })
        .await
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let local: PathBuf = local_path.to_path_buf();
        let remote = remote_path.to_string();

        self.with_sftp(move |sftp| {
            let remote_p = Path::new(&remote);

            if sftp.stat(remote_p).is_err() {
                return Err(FerryError::NotFound(format!(
                    "remote file not found: {}",
                    remote
                )));
            }

            let mut remote_file = sftp.open(remote_p).map_err(|e| {
                FerryError::transport(format!("opening remote file {}: {}", remote, e))
            })?;
            let mut local_file = std::fs::File::create(&local)?;
            std::io::copy(&mut remote_file, &mut local_file)?;

            info!("Downloaded remote {} to {}", remote, local.display());
            Ok(())
        })
        .await
    }
}
