//! SFTP transport over the system OpenSSH client.
//!
//! Authentication, agent forwarding and host aliases come from the local
//! ssh configuration, the same way `docker` itself reaches `ssh://`
//! contexts.

use super::client::{FileTransport, SshTarget, TransferSession};
use crate::config::KnownHostsPolicy;
use anyhow::Context as _;
use async_trait::async_trait;
use openssh::{KnownHosts, Session};
use openssh_sftp_client::{Sftp, SftpOptions};
use std::path::Path;
use tracing::debug;

/// Opens SFTP sessions through an OpenSSH multiplexed connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SftpTransport {
    known_hosts: KnownHostsPolicy,
}

impl SftpTransport {
    /// Creates a transport with the given host key policy.
    #[must_use]
    pub fn new(known_hosts: KnownHostsPolicy) -> Self {
        Self { known_hosts }
    }

    fn known_hosts(&self) -> KnownHosts {
        match self.known_hosts {
            KnownHostsPolicy::Strict => KnownHosts::Strict,
            KnownHostsPolicy::Add => KnownHosts::Add,
            KnownHostsPolicy::Accept => KnownHosts::Accept,
        }
    }
}

#[async_trait]
impl FileTransport for SftpTransport {
    async fn connect(&self, target: &SshTarget) -> anyhow::Result<Box<dyn TransferSession>> {
        let destination = target.destination();
        let session = Session::connect(&destination, self.known_hosts())
            .await
            .with_context(|| format!("ssh connection to {destination}"))?;
        let sftp = Sftp::from_session(session, SftpOptions::default())
            .await
            .context("starting sftp subsystem")?;
        debug!(destination = %destination, "SFTP session established");
        Ok(Box::new(SftpSession { sftp }))
    }
}

struct SftpSession {
    sftp: Sftp,
}

#[async_trait]
impl TransferSession for SftpSession {
    async fn put(&self, local_path: &Path, remote_path: &str) -> anyhow::Result<()> {
        let payload = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("reading {}", local_path.display()))?;

        let mut file = self
            .sftp
            .create(remote_path)
            .await
            .with_context(|| format!("creating {remote_path}"))?;
        file.write_all(&payload)
            .await
            .with_context(|| format!("writing {remote_path}"))?;
        file.close()
            .await
            .with_context(|| format!("closing {remote_path}"))?;

        debug!(remote_path = %remote_path, bytes = payload.len(), "Uploaded file");
        Ok(())
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.sftp.close().await.context("closing sftp session")?;
        Ok(())
    }
}
