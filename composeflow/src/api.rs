//! Operations exposed to the presentation layer.
//!
//! [`ControlPlane`] wires the registry, engine, inspector and editor
//! together. The request types deserialize from the payloads clients send.

use crate::compose::MountDescriptor;
use crate::config::EngineConfig;
use crate::contexts::ContextRegistry;
use crate::editor::{EditAck, MergeRule, RemoteFileEditor};
use crate::engine::{Orchestrator, RunRequest, RunResult};
use crate::errors::Result;
use crate::events::EventSink;
use crate::exec::{CommandRunner, DockerCli};
use crate::inspect::ContainerInspector;
use crate::transfer::{FileTransport, TransferClient};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A mount as sent by clients: target path and file body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Destination path on the target host.
    pub source: String,
    /// File contents.
    pub file: String,
}

/// Request to run a composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeRequest {
    /// Compose spec text.
    pub yaml_content: String,
    /// Target context.
    pub context: String,
    /// Mounts keyed by the token they replace, applied in order.
    #[serde(default)]
    pub mounts: IndexMap<String, VolumeMount>,
    /// Bring-up arguments; empty selects the default policy.
    #[serde(default)]
    pub additional_args: String,
}

impl ComposeRequest {
    /// Creates a request without mounts.
    pub fn new(context: impl Into<String>, yaml_content: impl Into<String>) -> Self {
        Self {
            yaml_content: yaml_content.into(),
            context: context.into(),
            mounts: IndexMap::new(),
            additional_args: String::new(),
        }
    }

    /// Adds a mount.
    #[must_use]
    pub fn with_mount(
        mut self,
        token: impl Into<String>,
        source: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        self.mounts.insert(
            token.into(),
            VolumeMount {
                source: source.into(),
                file: file.into(),
            },
        );
        self
    }

    /// Sets the bring-up arguments.
    #[must_use]
    pub fn with_additional_args(mut self, args: impl Into<String>) -> Self {
        self.additional_args = args.into();
        self
    }
}

impl From<ComposeRequest> for RunRequest {
    fn from(request: ComposeRequest) -> Self {
        let mounts = request
            .mounts
            .into_iter()
            .map(|(token, mount)| MountDescriptor::new(token, mount.source, mount.file.into_bytes()))
            .collect();
        RunRequest {
            context: request.context,
            spec_text: request.yaml_content,
            mounts,
            extra_args: Some(request.additional_args),
        }
    }
}

/// Request to replace a file inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFileRequest {
    /// Target container.
    pub container_id: String,
    /// Path inside the container.
    pub file_path: String,
    /// New file contents.
    pub file_content: String,
    /// Context the container runs on.
    pub context: String,
}

/// Request to merge JSON into a file inside a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteJsonFileRequest {
    /// Target container.
    pub container_id: String,
    /// Path inside the container.
    pub file_path: String,
    /// Document merged into the existing file.
    pub json_content: Value,
    /// Optional merge schema.
    #[serde(default)]
    pub merge_schema: Option<Value>,
    /// Context the container runs on.
    pub context: String,
}

/// The operation surface over one set of contexts.
#[derive(Debug)]
pub struct ControlPlane {
    registry: Arc<ContextRegistry>,
    docker: DockerCli,
    orchestrator: Orchestrator,
    inspector: ContainerInspector,
    editor: RemoteFileEditor,
}

impl ControlPlane {
    /// Creates a control plane with an empty registry.
    ///
    /// Call [`ControlPlane::reload_contexts`] before use, or use
    /// [`ControlPlane::connect`].
    pub fn new(
        config: &EngineConfig,
        runner: Arc<dyn CommandRunner>,
        transport: Arc<dyn FileTransport>,
    ) -> Self {
        let registry = Arc::new(ContextRegistry::new());
        let docker = DockerCli::new(runner, config.docker_binary.clone());
        let transfer = TransferClient::new(
            transport,
            config.transfer.retry.clone(),
            config.transfer.default_port,
        );

        let orchestrator = Orchestrator::new(Arc::clone(&registry), docker.clone(), transfer, config);
        let inspector = ContainerInspector::new(
            Arc::clone(&registry),
            docker.clone(),
            orchestrator.staging().clone(),
        );
        let editor = RemoteFileEditor::new(Arc::clone(&registry), docker.clone(), config);

        Self {
            registry,
            docker,
            orchestrator,
            inspector,
            editor,
        }
    }

    /// Creates a control plane and loads the contexts.
    pub async fn connect(
        config: &EngineConfig,
        runner: Arc<dyn CommandRunner>,
        transport: Arc<dyn FileTransport>,
    ) -> Self {
        let plane = Self::new(config, runner, transport);
        plane.reload_contexts().await;
        plane
    }

    /// Creates a control plane over the local docker CLI and OpenSSH.
    #[cfg(feature = "sftp")]
    pub async fn from_config(config: &EngineConfig) -> Self {
        Self::connect(
            config,
            Arc::new(crate::exec::ProcessRunner::new()),
            Arc::new(crate::transfer::SftpTransport::new(config.transfer.known_hosts)),
        )
        .await
    }

    /// Sets the sink receiving run events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.orchestrator = self.orchestrator.with_event_sink(sink);
        self
    }

    /// The context registry.
    #[must_use]
    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    /// The orchestration engine.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Known contexts and their endpoints.
    #[must_use]
    pub fn list_contexts(&self) -> BTreeMap<String, String> {
        self.registry.list()
    }

    /// Re-reads the contexts from docker. Returns how many are known.
    pub async fn reload_contexts(&self) -> usize {
        self.registry.reload(&self.docker).await
    }

    /// Runs a composition.
    pub async fn run_composition(&self, request: ComposeRequest) -> Result<RunResult> {
        self.orchestrator.run(request.into()).await
    }

    /// Inspects the containers of a context's staged composition.
    pub async fn inspect(&self, context: &str) -> Result<BTreeMap<String, Value>> {
        self.inspector.inspect(context).await
    }

    /// Replaces a file inside a container.
    pub async fn write_file(&self, request: WriteFileRequest) -> Result<EditAck> {
        self.editor
            .write_file(
                &request.context,
                &request.container_id,
                &request.file_path,
                request.file_content.as_bytes(),
            )
            .await
    }

    /// Merges JSON into a file inside a container.
    pub async fn write_json_file(&self, request: WriteJsonFileRequest) -> Result<EditAck> {
        self.registry.lookup(&request.context)?;
        let rule = match &request.merge_schema {
            None | Some(Value::Null) => None,
            Some(schema) => Some(MergeRule::from_schema(schema)?),
        };
        self.editor
            .write_json_file(
                &request.context,
                &request.container_id,
                &request.file_path,
                &request.json_content,
                rule.as_ref(),
            )
            .await
    }
}
