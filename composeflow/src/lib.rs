//! # Composeflow
//!
//! Applies docker compose specifications to remote docker contexts.
//!
//! Composeflow provides:
//!
//! - **Context registry**: the docker contexts known to the local CLI, reloadable on demand
//! - **Per-context exclusion**: at most one composition run in flight per context
//! - **Mount staging**: token substitution in the spec plus SFTP upload with per-file retry
//! - **Convergence checks**: every declared service must be running after bring-up
//! - **Container inspection**: partial results when single containers cannot be inspected
//! - **Remote file editing**: plain replacement and schema-driven JSON merge
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use composeflow::prelude::*;
//!
//! let config = EngineConfig::from_file("composeflow.json")?.apply_env_overrides();
//! init_logging(&config.logging)?;
//!
//! let plane = ControlPlane::from_config(&config).await;
//! let result = plane
//!     .run_composition(ComposeRequest::new("edge-1", spec_text))
//!     .await?;
//! println!("{}", result.stdout);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod api;
pub mod compose;
pub mod config;
pub mod contexts;
pub mod editor;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exec;
pub mod inspect;
pub mod logging;
pub mod testing;
pub mod transfer;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::api::{
        ComposeRequest, ControlPlane, VolumeMount, WriteFileRequest, WriteJsonFileRequest,
    };
    pub use crate::compose::{CompositionSpec, MountDescriptor};
    pub use crate::config::{EngineConfig, KnownHostsPolicy, TransferConfig};
    pub use crate::contexts::{Context, ContextLocks, ContextRegistry};
    pub use crate::editor::{EditAck, MergeRule, MergeStrategy};
    pub use crate::engine::{Orchestrator, RunPhase, RunRequest, RunResult};
    pub use crate::errors::{
        ErrorKind, OrchestrationError, Result, TransferError, ValidationError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::exec::{CommandOutput, CommandRunner, DockerCli, ProcessRunner};
    pub use crate::inspect::{ContainerInspector, FAILED_MARKER};
    pub use crate::logging::{init_logging, LogFormat, LoggingConfig};
    pub use crate::transfer::{BackoffStrategy, FileTransport, RetryConfig, TransferClient};

    #[cfg(feature = "sftp")]
    pub use crate::transfer::SftpTransport;
}
