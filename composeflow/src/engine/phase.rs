//! Run phases and the tracker that reports transitions.

use crate::errors::OrchestrationError;
use crate::events::{EventSink, COMPLETED_EVENT, FAILED_EVENT, PHASE_EVENT};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The state of one composition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// No run in progress for the context.
    #[default]
    Idle,
    /// The context lock is held.
    Locked,
    /// The spec is being parsed.
    Validating,
    /// Mounts are uploaded and the spec is written to its slot.
    Staging,
    /// Network cleanup and bring-up are running.
    RunningLifecycle,
    /// Running services are being counted.
    Converging,
    /// A step failed; the lock is released next.
    Failed,
}

impl RunPhase {
    /// Returns true if `next` is a legal successor of this phase.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        use RunPhase::{Converging, Failed, Idle, Locked, RunningLifecycle, Staging, Validating};
        matches!(
            (self, next),
            (Idle, Locked)
                | (Locked, Validating)
                | (Validating, Staging)
                | (Staging, RunningLifecycle)
                | (RunningLifecycle, Converging)
                | (Converging | Failed, Idle)
                | (Locked | Validating | Staging | RunningLifecycle | Converging, Failed)
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Locked => write!(f, "locked"),
            Self::Validating => write!(f, "validating"),
            Self::Staging => write!(f, "staging"),
            Self::RunningLifecycle => write!(f, "running_lifecycle"),
            Self::Converging => write!(f, "converging"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Tracks the phase of one run and emits an event per transition.
pub(crate) struct PhaseTracker {
    run_id: String,
    context: String,
    phase: RunPhase,
    sink: Arc<dyn EventSink>,
}

impl PhaseTracker {
    pub(crate) fn new(run_id: impl Into<String>, context: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            run_id: run_id.into(),
            context: context.into(),
            phase: RunPhase::Idle,
            sink,
        }
    }

    pub(crate) fn phase(&self) -> RunPhase {
        self.phase
    }

    pub(crate) fn advance(&mut self, next: RunPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal run transition {} -> {next}",
            self.phase
        );
        debug!(from = %self.phase, to = %next, "Run phase");
        self.sink.emit(
            PHASE_EVENT,
            Some(serde_json::json!({
                "run_id": self.run_id,
                "context": self.context,
                "timestamp": Utc::now().to_rfc3339(),
                "from": self.phase,
                "to": next,
            })),
        );
        self.phase = next;
    }

    /// Returns to `Idle` and reports success.
    pub(crate) fn complete(&mut self, exit_code: Option<i32>) {
        self.advance(RunPhase::Idle);
        self.sink.emit(
            COMPLETED_EVENT,
            Some(serde_json::json!({
                "run_id": self.run_id,
                "context": self.context,
                "timestamp": Utc::now().to_rfc3339(),
                "exit_code": exit_code,
            })),
        );
    }

    /// Records a failure in the current phase and returns to `Idle`.
    pub(crate) fn fail(&mut self, error: &OrchestrationError) {
        let failed_in = self.phase;
        if failed_in.can_advance_to(RunPhase::Failed) {
            self.advance(RunPhase::Failed);
            self.advance(RunPhase::Idle);
        }
        self.sink.emit(
            FAILED_EVENT,
            Some(serde_json::json!({
                "run_id": self.run_id,
                "context": self.context,
                "timestamp": Utc::now().to_rfc3339(),
                "phase": failed_in,
                "error": error.to_dict(),
            })),
        );
    }
}
