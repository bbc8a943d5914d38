//! Batch file copy to a remote host over one secure session.

use super::retry::{with_retry, RetryConfig};
use crate::errors::TransferError;
use async_trait::async_trait;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Where to open a transfer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    /// Host name or address.
    pub host: String,
    /// Login user; `None` leaves it to the ssh configuration.
    pub user: Option<String>,
    /// TCP port.
    pub port: u16,
}

impl SshTarget {
    /// Parses an `ssh://[user@]host[:port]` endpoint.
    pub fn parse(endpoint: &str, default_port: u16) -> Result<Self, TransferError> {
        let invalid = |reason: &str| TransferError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(endpoint).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "ssh" {
            return Err(invalid("only ssh:// endpoints accept file transfers"));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("endpoint has no host"))?;

        Ok(Self {
            host: host.to_string(),
            user: (!url.username().is_empty()).then(|| url.username().to_string()),
            port: url.port().unwrap_or(default_port),
        })
    }

    /// Destination string understood by `ssh`.
    #[must_use]
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("ssh://{user}@{}:{}", self.host, self.port),
            None => format!("ssh://{}:{}", self.host, self.port),
        }
    }
}

/// One file to copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransfer {
    /// Local source file.
    pub local_path: PathBuf,
    /// Destination path on the remote host.
    pub remote_path: String,
}

impl FileTransfer {
    /// Creates a new transfer pair.
    pub fn new(local_path: impl Into<PathBuf>, remote_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
        }
    }
}

/// Opens authenticated file-transfer sessions.
#[async_trait]
pub trait FileTransport: Send + Sync {
    /// Opens a session to `target`.
    async fn connect(&self, target: &SshTarget) -> anyhow::Result<Box<dyn TransferSession>>;
}

/// An open session. Uploads may run concurrently on one session.
#[async_trait]
pub trait TransferSession: Send + Sync {
    /// Uploads one local file to `remote_path`, replacing it.
    async fn put(&self, local_path: &Path, remote_path: &str) -> anyhow::Result<()>;

    /// Closes the session.
    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}

/// Copies batches of files, fanning out within one session and retrying
/// each file on its own.
#[derive(Clone)]
pub struct TransferClient {
    transport: Arc<dyn FileTransport>,
    retry: RetryConfig,
    default_port: u16,
}

impl std::fmt::Debug for TransferClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferClient")
            .field("retry", &self.retry)
            .field("default_port", &self.default_port)
            .finish_non_exhaustive()
    }
}

impl TransferClient {
    /// Creates a client over the given transport.
    pub fn new(transport: Arc<dyn FileTransport>, retry: RetryConfig, default_port: u16) -> Self {
        Self {
            transport,
            retry,
            default_port,
        }
    }

    /// Copies every file to `endpoint`.
    ///
    /// All files are attempted even when some fail; files that made it are
    /// left in place. The first failing file is reported.
    pub async fn copy_files(&self, endpoint: &str, files: &[FileTransfer]) -> Result<(), TransferError> {
        if files.is_empty() {
            return Ok(());
        }

        let target = SshTarget::parse(endpoint, self.default_port)?;
        let session = self
            .transport
            .connect(&target)
            .await
            .map_err(|e| TransferError::Connect {
                endpoint: endpoint.to_string(),
                cause: format!("{e:#}"),
            })?;
        debug!(endpoint = %endpoint, files = files.len(), "Transfer session open");

        let uploads = files
            .iter()
            .map(|file| self.put_with_retry(session.as_ref(), endpoint, file));
        let results = join_all(uploads).await;

        if let Err(e) = session.close().await {
            warn!(endpoint = %endpoint, error = %format!("{e:#}"), "Failed to close transfer session");
        }

        results.into_iter().collect::<Result<Vec<()>, _>>()?;
        info!(endpoint = %endpoint, files = files.len(), "Mount files transferred");
        Ok(())
    }

    async fn put_with_retry(
        &self,
        session: &dyn TransferSession,
        endpoint: &str,
        file: &FileTransfer,
    ) -> Result<(), TransferError> {
        with_retry(&self.retry, &file.remote_path, || {
            session.put(&file.local_path, &file.remote_path)
        })
        .await
        .map_err(|exhausted| TransferError::File {
            endpoint: endpoint.to_string(),
            local_path: file.local_path.display().to_string(),
            remote_path: file.remote_path.clone(),
            attempts: exhausted.attempts,
            cause: format!("{:#}", exhausted.last_error),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryTransport;

    fn client(transport: Arc<MemoryTransport>) -> TransferClient {
        TransferClient::new(transport, RetryConfig::new().with_retry_delay_ms(1), 22)
    }

    fn pairs(dir: &Path, names: &[&str]) -> Vec<FileTransfer> {
        names
            .iter()
            .map(|name| {
                let local = dir.join(name);
                std::fs::write(&local, name.as_bytes()).unwrap();
                FileTransfer::new(local, format!("/srv/{name}"))
            })
            .collect()
    }

    #[test]
    fn test_parse_ssh_target() {
        let target = SshTarget::parse("ssh://deploy@edge-1:2222", 22).unwrap();
        assert_eq!(target.host, "edge-1");
        assert_eq!(target.user.as_deref(), Some("deploy"));
        assert_eq!(target.port, 2222);
        assert_eq!(target.destination(), "ssh://deploy@edge-1:2222");

        let bare = SshTarget::parse("ssh://10.0.0.5", 22).unwrap();
        assert_eq!(bare.user, None);
        assert_eq!(bare.port, 22);
    }

    #[test]
    fn test_non_ssh_endpoint_is_rejected() {
        let err = SshTarget::parse("unix:///var/run/docker.sock", 22).unwrap_err();
        assert!(matches!(err, TransferError::InvalidEndpoint { .. }));
        assert!(SshTarget::parse("not a url", 22).is_err());
    }

    #[tokio::test]
    async fn test_copies_all_files_in_one_session() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MemoryTransport::new());
        let files = pairs(dir.path(), &["a.conf", "b.conf", "c.conf"]);

        client(transport.clone())
            .copy_files("ssh://deploy@edge-1", &files)
            .await
            .unwrap();

        assert_eq!(transport.sessions_opened(), 1);
        assert_eq!(transport.sessions_closed(), 1);
        assert_eq!(transport.uploaded("/srv/b.conf").as_deref(), Some(&b"b.conf"[..]));
        assert_eq!(transport.upload_count(), 3);
    }

    #[tokio::test]
    async fn test_two_failures_then_success_is_transparent() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_times("/srv/a.conf", 2);
        let files = pairs(dir.path(), &["a.conf"]);

        let result = client(transport.clone())
            .copy_files("ssh://edge-1", &files)
            .await;

        tokio_test::assert_ok!(result);
        assert_eq!(transport.attempts("/srv/a.conf"), 3);
        assert!(transport.uploaded("/srv/a.conf").is_some());
    }

    #[tokio::test]
    async fn test_three_failures_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_times("/srv/b.conf", 3);
        let files = pairs(dir.path(), &["a.conf", "b.conf"]);

        let err = client(transport.clone())
            .copy_files("ssh://edge-1", &files)
            .await
            .unwrap_err();

        assert_eq!(err.remote_path(), Some("/srv/b.conf"));
        assert_eq!(err.endpoint(), "ssh://edge-1");
        assert!(matches!(err, TransferError::File { attempts: 3, .. }));
        // no rollback of the file that made it
        assert!(transport.uploaded("/srv/a.conf").is_some());
        assert_eq!(transport.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let transport = Arc::new(MemoryTransport::new());
        transport.refuse_connections();
        let dir = tempfile::tempdir().unwrap();
        let files = pairs(dir.path(), &["a.conf"]);

        let err = client(transport).copy_files("ssh://edge-1", &files).await.unwrap_err();
        assert!(matches!(err, TransferError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_empty_batch_opens_no_session() {
        let transport = Arc::new(MemoryTransport::new());
        client(transport.clone())
            .copy_files("unix:///ignored", &[])
            .await
            .unwrap();
        assert_eq!(transport.sessions_opened(), 0);
    }
}
