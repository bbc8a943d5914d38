//! External command execution.
//!
//! This module provides:
//! - [`CommandRunner`], the capability every remote operation goes through
//! - [`ProcessRunner`], the child-process implementation
//! - [`DockerCli`], the docker invocations the engine needs

mod docker;
mod runner;

pub use docker::{DockerCli, COMPOSE_PS_FORMAT, CONTEXT_LS_FORMAT};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};

#[cfg(test)]
pub use runner::MockCommandRunner;
