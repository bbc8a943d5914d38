//! Mount file transfer to remote hosts.
//!
//! This module provides:
//! - [`TransferClient`], which copies a batch of files over one session
//! - [`FileTransport`] / [`TransferSession`], the seam for real and fake transports
//! - [`SftpTransport`], the OpenSSH-backed transport (feature `sftp`)
//! - bounded per-file retry

mod client;
mod retry;
#[cfg(feature = "sftp")]
mod sftp;

pub use client::{FileTransfer, FileTransport, SshTarget, TransferClient, TransferSession};
pub use retry::{with_retry, BackoffStrategy, RetryConfig, RetryExhausted};
#[cfg(feature = "sftp")]
pub use sftp::SftpTransport;
