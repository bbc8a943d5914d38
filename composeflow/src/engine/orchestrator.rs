//! The composition run state machine.

use super::phase::{PhaseTracker, RunPhase};
use crate::compose::{CompositionSpec, MountDescriptor, MountStager, StagingArea};
use crate::config::EngineConfig;
use crate::contexts::{ContextLocks, ContextRegistry};
use crate::errors::{OrchestrationError, Result};
use crate::events::{EventSink, NoOpEventSink};
use crate::exec::DockerCli;
use crate::transfer::TransferClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Input of one composition run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    /// Target context name.
    pub context: String,
    /// Compose spec text.
    pub spec_text: String,
    /// Mounts to stage before bring-up.
    pub mounts: Vec<MountDescriptor>,
    /// Bring-up arguments; `None` or blank picks the configured default.
    pub extra_args: Option<String>,
}

impl RunRequest {
    /// Creates a request without mounts.
    pub fn new(context: impl Into<String>, spec_text: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            spec_text: spec_text.into(),
            ..Self::default()
        }
    }

    /// Adds a mount.
    #[must_use]
    pub fn with_mount(mut self, mount: MountDescriptor) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Replaces the mounts.
    #[must_use]
    pub fn with_mounts(mut self, mounts: Vec<MountDescriptor>) -> Self {
        self.mounts = mounts;
        self
    }

    /// Sets the bring-up arguments.
    #[must_use]
    pub fn with_extra_args(mut self, args: impl Into<String>) -> Self {
        self.extra_args = Some(args.into());
        self
    }
}

/// Output of the bring-up command of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit code of the bring-up command.
    #[serde(rename = "returncode")]
    pub exit_code: Option<i32>,
}

/// Drives composition runs against remote contexts.
///
/// At most one run per context is in flight; a second run for a busy
/// context fails with a conflict instead of waiting.
pub struct Orchestrator {
    registry: Arc<ContextRegistry>,
    locks: ContextLocks,
    docker: DockerCli,
    stager: MountStager,
    staging: StagingArea,
    config: Arc<EngineConfig>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("contexts", &self.registry.len())
            .field("busy", &self.locks.held_count())
            .field("staging", &self.staging.dir())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator.
    pub fn new(
        registry: Arc<ContextRegistry>,
        docker: DockerCli,
        transfer: TransferClient,
        config: &EngineConfig,
    ) -> Self {
        Self {
            registry,
            locks: ContextLocks::new(),
            docker,
            stager: MountStager::new(&config.scratch_dir, transfer),
            staging: StagingArea::new(&config.staging_dir),
            config: Arc::new(config.clone()),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Shares an existing lock table.
    #[must_use]
    pub fn with_locks(mut self, locks: ContextLocks) -> Self {
        self.locks = locks;
        self
    }

    /// The lock table.
    #[must_use]
    pub fn locks(&self) -> &ContextLocks {
        &self.locks
    }

    /// The staged-spec slots.
    #[must_use]
    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Runs one composition.
    ///
    /// Resolves the context, takes its lock, validates the spec, stages
    /// mounts and the spec, prunes networks, brings the project up and
    /// checks that every declared service is running. The lock is released
    /// on every exit. Remote changes made before a failure are kept.
    pub async fn run(&self, request: RunRequest) -> Result<RunResult> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("composition_run", run_id = %run_id, context = %request.context);
        let mut tracker = PhaseTracker::new(&run_id, &request.context, Arc::clone(&self.events));

        let outcome = self.execute(&request, &mut tracker).instrument(span).await;

        match &outcome {
            Ok(result) => {
                info!(run_id = %run_id, context = %request.context, "Composition run succeeded");
                tracker.complete(result.exit_code);
            }
            Err(e) => {
                warn!(
                    run_id = %run_id,
                    context = %request.context,
                    phase = %tracker.phase(),
                    error = %e,
                    "Composition run failed"
                );
                tracker.fail(e);
            }
        }
        outcome
    }

    async fn execute(&self, request: &RunRequest, tracker: &mut PhaseTracker) -> Result<RunResult> {
        let context = self.registry.lookup(&request.context)?;

        let _guard = self
            .locks
            .try_guard(&context.name)
            .ok_or_else(|| OrchestrationError::context_busy(&context.name))?;
        tracker.advance(RunPhase::Locked);

        tracker.advance(RunPhase::Validating);
        let spec = CompositionSpec::parse(request.spec_text.as_str())?;

        tracker.advance(RunPhase::Staging);
        let has_mounts = !request.mounts.is_empty();
        let staged_text = if has_mounts {
            self.stager
                .stage(&request.mounts, spec.raw_text(), &context.endpoint)
                .await?
        } else {
            spec.raw_text().to_string()
        };
        let staged_path = self.staging.persist(&context.name, &staged_text).await?;

        tracker.advance(RunPhase::RunningLifecycle);
        self.docker.network_prune(&context.name).await?;

        let up_args = self
            .config
            .up_args_for(request.extra_args.as_deref(), has_mounts);
        let up = self
            .docker
            .compose_up(&context.name, &staged_path, &up_args)
            .await?;
        if !up.success() {
            return Err(OrchestrationError::execution(
                "docker compose up",
                up.stderr.trim(),
                up.exit_code,
            ));
        }

        tracker.advance(RunPhase::Converging);
        let running = self
            .docker
            .compose_running_services(&context.name, &staged_path)
            .await?;
        if running.len() != spec.service_count() {
            return Err(OrchestrationError::Convergence {
                context: context.name,
                expected: spec.service_count(),
                observed: running.len(),
            });
        }

        Ok(RunResult {
            stdout: up.stdout,
            stderr: up.stderr,
            exit_code: up.exit_code,
        })
    }
}
