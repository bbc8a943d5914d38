//! Test fixtures for engine-level tests.

use super::mocks::{MemoryTransport, ScriptedRunner};
use crate::api::ControlPlane;
use crate::config::EngineConfig;
use crate::events::CollectingEventSink;
use crate::exec::CommandOutput;
use crate::transfer::RetryConfig;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Context with an `ssh://` endpoint registered by [`TestHarness`].
pub const REMOTE_CONTEXT: &str = "edge-1";
/// Endpoint of [`REMOTE_CONTEXT`].
pub const REMOTE_ENDPOINT: &str = "ssh://deploy@edge-1:2222";
/// Context with a local socket endpoint registered by [`TestHarness`].
pub const LOCAL_CONTEXT: &str = "default";
/// Endpoint of [`LOCAL_CONTEXT`].
pub const LOCAL_ENDPOINT: &str = "unix:///var/run/docker.sock";

/// A spec declaring the services `web` and `worker`.
pub const TWO_SERVICE_SPEC: &str = "\
services:
  web:
    image: nginx:1.27
    ports:
      - \"8080:80\"
  worker:
    image: busybox
    command: [\"sleep\", \"infinity\"]
";

/// Mount token used by [`MOUNTED_SPEC`].
pub const NGINX_TOKEN: &str = "${NGINX_CONF}";

/// A one-service spec referencing [`NGINX_TOKEN`] twice.
pub const MOUNTED_SPEC: &str = "\
services:
  web:
    image: nginx:1.27
    volumes:
      - ${NGINX_CONF}:/etc/nginx/nginx.conf:ro
    labels:
      config.source: ${NGINX_CONF}
";

/// Renders `docker context ls` output for the given contexts.
#[must_use]
pub fn context_listing(entries: &[(&str, &str)]) -> String {
    entries
        .iter()
        .map(|(name, endpoint)| format!("{name}|{endpoint}\n"))
        .collect()
}

/// Renders `docker compose ps` output, one entry per line.
#[must_use]
pub fn ps_output(names: &[&str]) -> CommandOutput {
    CommandOutput::ok(names.iter().map(|n| format!("{n}\n")).collect::<String>())
}

/// Fakes, a scratch directory and a configuration pointing into it.
///
/// The runner is pre-scripted with a context listing holding
/// [`REMOTE_CONTEXT`] and [`LOCAL_CONTEXT`]; every other command succeeds
/// with empty output until scripted otherwise.
pub struct TestHarness {
    /// Scripted docker runner.
    pub runner: Arc<ScriptedRunner>,
    /// In-memory file transport.
    pub transport: Arc<MemoryTransport>,
    /// Collected engine events.
    pub events: Arc<CollectingEventSink>,
    /// Configuration rooted in the harness directory.
    pub config: EngineConfig,
    dir: TempDir,
}

impl TestHarness {
    /// Creates a harness in a fresh temporary directory.
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let staging = dir.path().join("staging");
        let scratch = dir.path().join("scratch");
        std::fs::create_dir_all(&staging)?;
        std::fs::create_dir_all(&scratch)?;

        let config = EngineConfig::new()
            .with_staging_dir(staging)
            .with_scratch_dir(scratch)
            .with_transfer_retry(RetryConfig::new().with_retry_delay_ms(1));

        let runner = Arc::new(ScriptedRunner::new());
        runner.on(
            "context ls",
            CommandOutput::ok(context_listing(&[
                (REMOTE_CONTEXT, REMOTE_ENDPOINT),
                (LOCAL_CONTEXT, LOCAL_ENDPOINT),
            ])),
        );

        Ok(Self {
            runner,
            transport: Arc::new(MemoryTransport::new()),
            events: Arc::new(CollectingEventSink::new()),
            config,
            dir,
        })
    }

    /// Root of the harness directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Builds a control plane over the fakes with contexts loaded.
    pub async fn control_plane(&self) -> ControlPlane {
        ControlPlane::connect(&self.config, self.runner.clone(), self.transport.clone())
            .await
            .with_event_sink(self.events.clone())
    }

    /// Number of entries left in the scratch directory.
    #[must_use]
    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(&self.config.scratch_dir).map_or(0, Iterator::count)
    }
}

impl std::fmt::Debug for TestHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHarness")
            .field("dir", &self.dir.path())
            .finish_non_exhaustive()
    }
}
