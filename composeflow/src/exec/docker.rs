//! Docker CLI invocations.
//!
//! Every remote command names its target with `--context <name>` on the
//! command line. Nothing here reads or writes process environment, so
//! operations against different contexts can run side by side.

use super::{CommandOutput, CommandRunner};
use crate::errors::{OrchestrationError, Result};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// `docker context ls` format producing `name|endpoint` lines.
pub const CONTEXT_LS_FORMAT: &str = "{{.Name}}|{{.DockerEndpoint}}";

/// `docker compose ps` format producing one container name per line.
pub const COMPOSE_PS_FORMAT: &str = "{{.Names}}";

/// Thin wrapper that turns docker operations into runner invocations.
#[derive(Clone)]
pub struct DockerCli {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl std::fmt::Debug for DockerCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerCli")
            .field("binary", &self.binary)
            .finish_non_exhaustive()
    }
}

impl DockerCli {
    /// Creates a docker wrapper over the given runner.
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    /// Returns the docker binary in use.
    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Runs docker against `context` (or the local default when `None`).
    pub async fn run(&self, context: Option<&str>, args: &[&str]) -> Result<CommandOutput> {
        let mut argv: Vec<String> = Vec::with_capacity(args.len() + 2);
        if let Some(context) = context {
            argv.push("--context".to_string());
            argv.push(context.to_string());
        }
        argv.extend(args.iter().map(|a| (*a).to_string()));

        debug!(context = ?context, args = ?argv, "docker");
        Ok(self.runner.run(&self.binary, &argv).await?)
    }

    /// Runs docker and turns a non-zero exit into an execution error.
    pub async fn run_checked(
        &self,
        context: Option<&str>,
        args: &[&str],
        description: &str,
    ) -> Result<CommandOutput> {
        let output = self.run(context, args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(OrchestrationError::execution(
                description,
                output.stderr.trim(),
                output.exit_code,
            ))
        }
    }

    /// Lists configured contexts as raw `name|endpoint` lines.
    pub async fn list_contexts(&self) -> Result<CommandOutput> {
        self.run_checked(
            None,
            &["context", "ls", "--format", CONTEXT_LS_FORMAT],
            "docker context ls",
        )
        .await
    }

    /// Removes unused networks on the context's host.
    pub async fn network_prune(&self, context: &str) -> Result<CommandOutput> {
        self.run_checked(
            Some(context),
            &["network", "prune", "--force"],
            "docker network prune",
        )
        .await
    }

    /// Brings the compose project up, detached, removing orphans.
    ///
    /// Returns the output even on failure so callers can report it; use
    /// [`CommandOutput::success`] to check.
    pub async fn compose_up(
        &self,
        context: &str,
        compose_file: &Path,
        extra_args: &str,
    ) -> Result<CommandOutput> {
        let file = compose_file.to_string_lossy();
        let mut args = vec![
            "compose",
            "--file",
            &*file,
            "up",
            "--detach",
            "--remove-orphans",
        ];
        args.extend(extra_args.split_whitespace());
        self.run(Some(context), &args).await
    }

    /// Names of the containers running for the compose project.
    pub async fn compose_container_names(
        &self,
        context: &str,
        compose_file: &Path,
    ) -> Result<Vec<String>> {
        let file = compose_file.to_string_lossy();
        let output = self
            .run_checked(
                Some(context),
                &["compose", "--file", &*file, "ps", "--format", COMPOSE_PS_FORMAT],
                "docker compose ps",
            )
            .await?;

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Distinct services of the compose project with a running container.
    ///
    /// A scaled service lists once however many replicas are up.
    pub async fn compose_running_services(
        &self,
        context: &str,
        compose_file: &Path,
    ) -> Result<BTreeSet<String>> {
        let file = compose_file.to_string_lossy();
        let output = self
            .run_checked(
                Some(context),
                &["compose", "--file", &*file, "ps", "--services", "--status", "running"],
                "docker compose ps",
            )
            .await?;

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Full inspection document of one container.
    pub async fn inspect(&self, context: &str, container: &str) -> Result<serde_json::Value> {
        let output = self
            .run_checked(Some(context), &["inspect", container], "docker inspect")
            .await?;

        let parsed: serde_json::Value = serde_json::from_str(output.stdout.trim())?;
        match parsed {
            serde_json::Value::Array(mut items) if !items.is_empty() => Ok(items.swap_remove(0)),
            serde_json::Value::Array(_) => Err(OrchestrationError::NotFound {
                resource: "container",
                name: container.to_string(),
            }),
            other => Ok(other),
        }
    }

    /// Copies a local file into a container's filesystem.
    pub async fn copy_into(
        &self,
        context: &str,
        local: &Path,
        container: &str,
        container_path: &str,
    ) -> Result<()> {
        let source = local.to_string_lossy();
        let destination = format!("{container}:{container_path}");
        self.run_checked(
            Some(context),
            &["cp", &*source, destination.as_str()],
            "docker cp",
        )
        .await?;
        Ok(())
    }

    /// Runs a command inside a running container.
    pub async fn exec_in(
        &self,
        context: &str,
        container: &str,
        command: &[&str],
    ) -> Result<CommandOutput> {
        let mut args = vec!["exec", container];
        args.extend_from_slice(command);
        self.run(Some(context), &args).await
    }
}
