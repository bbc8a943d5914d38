//! Testing utilities for composeflow.
//!
//! This module provides:
//! - A scripted command runner standing in for the docker CLI
//! - An in-memory file transport with injectable failures
//! - Compose spec fixtures and a harness wiring them together

mod fixtures;
mod mocks;

pub use fixtures::{
    context_listing, ps_output, TestHarness, LOCAL_CONTEXT, LOCAL_ENDPOINT, MOUNTED_SPEC,
    NGINX_TOKEN, REMOTE_CONTEXT, REMOTE_ENDPOINT, TWO_SERVICE_SPEC,
};
pub use mocks::{MemoryTransport, RecordedCommand, ScriptedRunner};
