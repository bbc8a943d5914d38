//! Orchestration engine.
//!
//! A run moves through
//! `Idle -> Locked -> Validating -> Staging -> RunningLifecycle -> Converging -> Idle`,
//! or to `Failed -> Idle` from any step after the lock is taken.

mod integration_tests;
mod orchestrator;
mod phase;

pub use orchestrator::{Orchestrator, RunRequest, RunResult};
pub use phase::RunPhase;
