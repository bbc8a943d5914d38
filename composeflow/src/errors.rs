//! Error types for composeflow operations.
//!
//! Every operation reports one of the kinds in [`ErrorKind`]. The
//! presentation layer maps them onto response codes with
//! [`OrchestrationError::status_code`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = OrchestrationError> = std::result::Result<T, E>;

/// The main error type for composeflow operations.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// An unknown context or container was referenced.
    #[error("{resource} not found: {name}")]
    NotFound {
        /// What kind of thing was looked up ("context", "container").
        resource: &'static str,
        /// The name that failed to resolve.
        name: String,
    },

    /// Another operation already holds the context.
    #[error("Context '{context}' is already being used")]
    Conflict {
        /// The busy context.
        context: String,
    },

    /// The composition spec could not be parsed.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Copying mount files to the target host failed.
    #[error("{0}")]
    Transfer(#[from] TransferError),

    /// An external command exited non-zero.
    #[error("Failed to execute {command}: {stderr}")]
    Execution {
        /// Short description of the command that failed.
        command: String,
        /// Captured standard error.
        stderr: String,
        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
    },

    /// The running services did not match the declared services.
    #[error("Invalid container creation count for context '{context}': expected {expected}, found {observed}")]
    Convergence {
        /// The context that was brought up.
        context: String,
        /// Number of services declared in the spec.
        expected: usize,
        /// Number of services found running.
        observed: usize,
    },

    /// Local IO error (staging, scratch files, process spawn).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// The error kinds callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Unknown context or container.
    NotFoundError,
    /// Context busy.
    ConflictError,
    /// Malformed composition spec.
    ValidationError,
    /// Secure-transport failure after the retry budget.
    TransferError,
    /// External command non-zero exit.
    ExecutionError,
    /// Post bring-up service count mismatch.
    ConvergenceError,
    /// Local failures that are none of the above.
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFoundError => "NotFoundError",
            Self::ConflictError => "ConflictError",
            Self::ValidationError => "ValidationError",
            Self::TransferError => "TransferError",
            Self::ExecutionError => "ExecutionError",
            Self::ConvergenceError => "ConvergenceError",
            Self::InternalError => "InternalError",
        };
        f.write_str(name)
    }
}

impl OrchestrationError {
    /// Creates a context not found error.
    #[must_use]
    pub fn context_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            resource: "context",
            name: name.into(),
        }
    }

    /// Creates a context busy error.
    #[must_use]
    pub fn context_busy(context: impl Into<String>) -> Self {
        Self::Conflict {
            context: context.into(),
        }
    }

    /// Creates an execution error from a failed command.
    #[must_use]
    pub fn execution(
        command: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::Execution {
            command: command.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFoundError,
            Self::Conflict { .. } => ErrorKind::ConflictError,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Transfer(_) => ErrorKind::TransferError,
            Self::Execution { .. } => ErrorKind::ExecutionError,
            Self::Convergence { .. } => ErrorKind::ConvergenceError,
            Self::Io(_) | Self::Serialization(_) | Self::Config(_) => ErrorKind::InternalError,
        }
    }

    /// Returns the HTTP status the presentation layer should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFoundError | ErrorKind::ValidationError => 400,
            ErrorKind::ConflictError => 409,
            ErrorKind::TransferError => 504,
            ErrorKind::ExecutionError
            | ErrorKind::ConvergenceError
            | ErrorKind::InternalError => 500,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind().to_string()));
        map.insert("status".to_string(), serde_json::json!(self.status_code()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        match self {
            Self::NotFound { resource, name } => {
                map.insert("resource".to_string(), serde_json::json!(resource));
                map.insert("name".to_string(), serde_json::json!(name));
            }
            Self::Conflict { context } => {
                map.insert("context".to_string(), serde_json::json!(context));
            }
            Self::Transfer(err) => {
                map.insert("endpoint".to_string(), serde_json::json!(err.endpoint()));
                if let Some(path) = err.remote_path() {
                    map.insert("remote_path".to_string(), serde_json::json!(path));
                }
            }
            Self::Execution { command, stderr, exit_code } => {
                map.insert("command".to_string(), serde_json::json!(command));
                map.insert("stderr".to_string(), serde_json::json!(stderr));
                map.insert("exit_code".to_string(), serde_json::json!(exit_code));
            }
            Self::Convergence { context, expected, observed } => {
                map.insert("context".to_string(), serde_json::json!(context));
                map.insert("expected".to_string(), serde_json::json!(expected));
                map.insert("observed".to_string(), serde_json::json!(observed));
            }
            Self::Validation(_) | Self::Io(_) | Self::Serialization(_) | Self::Config(_) => {}
        }

        map
    }
}

impl From<serde_json::Error> for OrchestrationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error raised when a composition spec is malformed.
#[derive(Debug, Clone, Error)]
#[error("InvalidSpec: {reason}")]
pub struct ValidationError {
    /// What was wrong with the document.
    pub reason: String,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors from copying mount files to a remote host.
#[derive(Debug, Clone, Error)]
pub enum TransferError {
    /// The context endpoint cannot be used as a transfer target.
    #[error("Unsupported transfer endpoint {endpoint}: {reason}")]
    InvalidEndpoint {
        /// The endpoint.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The secure session could not be opened.
    #[error("Failed to open SFTP session to {endpoint}: {cause}")]
    Connect {
        /// The endpoint.
        endpoint: String,
        /// Underlying cause.
        cause: String,
    },

    /// A file failed on every attempt.
    #[error("Failed to copy {local_path} to {endpoint}:{remote_path} after {attempts} attempts: {cause}")]
    File {
        /// The endpoint.
        endpoint: String,
        /// Local scratch path of the payload.
        local_path: String,
        /// Destination path on the host.
        remote_path: String,
        /// Attempts made.
        attempts: usize,
        /// Cause of the last failure.
        cause: String,
    },
}

impl TransferError {
    /// Returns the endpoint the transfer targeted.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        match self {
            Self::InvalidEndpoint { endpoint, .. }
            | Self::Connect { endpoint, .. }
            | Self::File { endpoint, .. } => endpoint,
        }
    }

    /// Returns the remote path of the failing file, if a single file failed.
    #[must_use]
    pub fn remote_path(&self) -> Option<&str> {
        match self {
            Self::File { remote_path, .. } => Some(remote_path),
            _ => None,
        }
    }
}
