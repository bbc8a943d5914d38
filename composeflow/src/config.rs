//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration. Environment overrides are applied explicitly with
//! [`EngineConfig::apply_env_overrides`].

use crate::errors::{OrchestrationError, Result};
use crate::logging::LoggingConfig;
use crate::transfer::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Host key checking policy for SSH sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnownHostsPolicy {
    /// Only connect to hosts already in `known_hosts`.
    #[default]
    Strict,
    /// Add new host keys, refuse changed ones.
    Add,
    /// Accept any host key.
    Accept,
}

/// Configuration for mount file transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Per-file retry policy.
    #[serde(flatten)]
    pub retry: RetryConfig,
    /// Port used when the endpoint does not name one.
    #[serde(default = "default_ssh_port")]
    pub default_port: u16,
    /// Host key checking policy.
    #[serde(default)]
    pub known_hosts: KnownHostsPolicy,
}

fn default_ssh_port() -> u16 {
    22
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            default_port: default_ssh_port(),
            known_hosts: KnownHostsPolicy::default(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Docker CLI binary.
    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,
    /// Directory holding the staged spec of each context.
    #[serde(default = "default_temp_dir")]
    pub staging_dir: PathBuf,
    /// Directory for local scratch files.
    #[serde(default = "default_temp_dir")]
    pub scratch_dir: PathBuf,
    /// Directory inside containers used for copy-in.
    #[serde(default = "default_container_tmp_dir")]
    pub container_tmp_dir: String,
    /// Bring-up arguments when the caller supplies none.
    #[serde(default = "default_up_args")]
    pub default_up_args: String,
    /// Bring-up arguments for runs with mounts when the caller supplies none.
    #[serde(default = "default_mount_up_args")]
    pub default_mount_up_args: String,
    /// Mount transfer settings.
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_container_tmp_dir() -> String {
    "/tmp".to_string()
}

fn default_up_args() -> String {
    "--force-recreate --pull always --quiet-pull".to_string()
}

fn default_mount_up_args() -> String {
    "--force-recreate --pull always".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            docker_binary: default_docker_binary(),
            staging_dir: default_temp_dir(),
            scratch_dir: default_temp_dir(),
            container_tmp_dir: default_container_tmp_dir(),
            default_up_args: default_up_args(),
            default_mount_up_args: default_mount_up_args(),
            transfer: TransferConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| OrchestrationError::Config(format!("invalid configuration: {e}")))
    }

    /// Reads a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            OrchestrationError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Applies `COMPOSEFLOW_*` environment overrides.
    #[must_use]
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(binary) = lookup("COMPOSEFLOW_DOCKER_BINARY") {
            self.docker_binary = binary;
        }
        if let Some(dir) = lookup("COMPOSEFLOW_STAGING_DIR") {
            self.staging_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("COMPOSEFLOW_SCRATCH_DIR") {
            self.scratch_dir = PathBuf::from(dir);
        }
        self
    }

    /// Sets the docker binary.
    #[must_use]
    pub fn with_docker_binary(mut self, binary: impl Into<String>) -> Self {
        self.docker_binary = binary.into();
        self
    }

    /// Sets the staging directory.
    #[must_use]
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    /// Sets the scratch directory.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Sets the transfer retry policy.
    #[must_use]
    pub fn with_transfer_retry(mut self, retry: RetryConfig) -> Self {
        self.transfer.retry = retry;
        self
    }

    /// Picks the bring-up arguments for a run.
    ///
    /// Empty caller arguments count as absent.
    #[must_use]
    pub fn up_args_for(&self, requested: Option<&str>, has_mounts: bool) -> String {
        match requested.map(str::trim) {
            Some(args) if !args.is_empty() => args.to_string(),
            _ if has_mounts => self.default_mount_up_args.clone(),
            _ => self.default_up_args.clone(),
        }
    }
}
