//! Writing files inside remote containers.

use super::merge::{merge_documents, MergeRule};
use crate::config::EngineConfig;
use crate::contexts::ContextRegistry;
use crate::errors::{OrchestrationError, Result};
use crate::exec::DockerCli;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shell script that replaces `$1` with the contents of `$0`, then removes `$0`.
const MOVE_SCRIPT: &str = r#"cat "$0" > "$1"; rm -f "$0""#;

/// Acknowledgement of a file written into a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditAck {
    /// Target container.
    pub container_id: String,
    /// Path inside the container.
    pub path: String,
    /// Number of bytes written.
    pub bytes_written: usize,
    /// True if the file was produced by a structured merge.
    pub structured: bool,
}

impl EditAck {
    /// Human-readable confirmation.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EditAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.structured { "JSON file" } else { "File" };
        write!(
            f,
            "{kind} '{}' updated successfully in container '{}'",
            self.path, self.container_id
        )
    }
}

/// Replaces files inside running containers.
///
/// Content is staged in a local scratch file, copied to a temporary path
/// inside the container and then written over the target in one step, so
/// the target keeps its ownership and mode.
#[derive(Debug, Clone)]
pub struct RemoteFileEditor {
    registry: Arc<ContextRegistry>,
    docker: DockerCli,
    scratch_dir: PathBuf,
    container_tmp_dir: String,
}

impl RemoteFileEditor {
    /// Creates an editor using the configured scratch and container temp dirs.
    pub fn new(registry: Arc<ContextRegistry>, docker: DockerCli, config: &EngineConfig) -> Self {
        Self {
            registry,
            docker,
            scratch_dir: config.scratch_dir.clone(),
            container_tmp_dir: config.container_tmp_dir.clone(),
        }
    }

    /// Writes `content` to `path` inside the container.
    pub async fn write_file(
        &self,
        context: &str,
        container_id: &str,
        path: &str,
        content: &[u8],
    ) -> Result<EditAck> {
        let context = self.registry.lookup(context)?;
        let bytes_written = self.place(&context.name, container_id, path, content).await?;
        info!(context = %context.name, container = %container_id, path = %path, "File updated");
        Ok(EditAck {
            container_id: container_id.to_string(),
            path: path.to_string(),
            bytes_written,
            structured: false,
        })
    }

    /// Merges `content` into the JSON document at `path` and writes it back.
    ///
    /// An empty or undecodable existing file counts as `{}`. Failing to read
    /// the file at all is an execution error.
    pub async fn write_json_file(
        &self,
        context: &str,
        container_id: &str,
        path: &str,
        content: &Value,
        rule: Option<&MergeRule>,
    ) -> Result<EditAck> {
        let context = self.registry.lookup(context)?;
        let existing = self.read_json(&context.name, container_id, path).await?;
        let merged = merge_documents(&existing, content, rule);
        let text = to_pretty_json(&merged)?;

        let bytes_written = self
            .place(&context.name, container_id, path, text.as_bytes())
            .await?;
        info!(context = %context.name, container = %container_id, path = %path, "JSON file updated");
        Ok(EditAck {
            container_id: container_id.to_string(),
            path: path.to_string(),
            bytes_written,
            structured: true,
        })
    }

    /// Reads and decodes a JSON file from the container.
    pub async fn read_json(&self, context: &str, container_id: &str, path: &str) -> Result<Value> {
        let output = self
            .docker
            .exec_in(context, container_id, &["cat", path])
            .await?;
        if !output.success() {
            return Err(OrchestrationError::execution(
                "read JSON file",
                output.stderr.trim(),
                output.exit_code,
            ));
        }

        let text = output.stdout.trim();
        if text.is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        Ok(serde_json::from_str(text).unwrap_or_else(|e| {
            warn!(container = %container_id, path = %path, error = %e, "Existing file is not JSON, merging into {{}}");
            Value::Object(serde_json::Map::new())
        }))
    }

    async fn place(
        &self,
        context: &str,
        container_id: &str,
        path: &str,
        content: &[u8],
    ) -> Result<usize> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("composeflow-edit-")
            .tempfile_in(&self.scratch_dir)?;
        tokio::fs::write(scratch.path(), content).await?;

        let file_name = scratch
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let container_tmp = format!(
            "{}/{file_name}",
            self.container_tmp_dir.trim_end_matches('/')
        );
        debug!(container = %container_id, temp = %container_tmp, "Copying file into container");

        self.docker
            .copy_into(context, scratch.path(), container_id, &container_tmp)
            .await?;

        let moved = self
            .docker
            .exec_in(
                context,
                container_id,
                &["sh", "-c", MOVE_SCRIPT, &container_tmp, path],
            )
            .await?;
        if !moved.success() {
            return Err(OrchestrationError::execution(
                "update file inside container",
                moved.stderr.trim(),
                moved.exit_code,
            ));
        }

        if let Err(e) = scratch.close() {
            warn!(error = %e, "Failed to remove scratch file");
        }
        Ok(content.len())
    }
}

/// Serializes with four-space indentation.
fn to_pretty_json(value: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(|e| OrchestrationError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contexts::Context;
    use crate::exec::{CommandOutput, CommandRunner, MockCommandRunner};
    use crate::testing::ScriptedRunner;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Captures what `docker cp` would upload and answers `cat` with a fixed body.
    #[derive(Default)]
    struct CopyCapture {
        existing: Option<CommandOutput>,
        copied: Mutex<Vec<(String, Vec<u8>)>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl CommandRunner for CopyCapture {
        async fn run(&self, _program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
            self.calls.lock().push(args.to_vec());
            match args.get(2).map(String::as_str) {
                Some("cp") => {
                    let body = std::fs::read(&args[3])?;
                    self.copied.lock().push((args[4].clone(), body));
                    Ok(CommandOutput::ok(""))
                }
                Some("exec") if args.get(4).map(String::as_str) == Some("cat") => {
                    Ok(self.existing.clone().unwrap_or_else(|| CommandOutput::ok("")))
                }
                _ => Ok(CommandOutput::ok("")),
            }
        }
    }

    fn registry() -> Arc<ContextRegistry> {
        Arc::new(ContextRegistry::from_contexts([Context::new(
            "edge-1",
            "ssh://edge-1",
        )]))
    }

    fn editor(runner: Arc<dyn CommandRunner>, scratch: &std::path::Path) -> RemoteFileEditor {
        let config = EngineConfig::new().with_scratch_dir(scratch);
        RemoteFileEditor::new(registry(), DockerCli::new(runner, "docker"), &config)
    }

    #[tokio::test]
    async fn test_write_file_copies_then_moves() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(CopyCapture::default());
        let ack = editor(runner.clone(), dir.path())
            .write_file("edge-1", "c0ffee", "/etc/app.conf", b"level=debug\n")
            .await
            .unwrap();

        assert_eq!(ack.bytes_written, 12);
        assert_eq!(
            ack.message(),
            "File '/etc/app.conf' updated successfully in container 'c0ffee'"
        );

        let copied = runner.copied.lock().clone();
        assert_eq!(copied.len(), 1);
        assert!(copied[0].0.starts_with("c0ffee:/tmp/composeflow-edit-"));
        assert_eq!(copied[0].1, b"level=debug\n".to_vec());

        let calls = runner.calls.lock().clone();
        let mv = &calls[1];
        assert_eq!(
            mv[..7].to_vec(),
            vec!["--context", "edge-1", "exec", "c0ffee", "sh", "-c", MOVE_SCRIPT]
        );
        assert_eq!(format!("c0ffee:{}", mv[7]), copied[0].0);
        assert_eq!(mv[8], "/etc/app.conf");

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_write_json_file_merges_and_indents() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(CopyCapture {
            existing: Some(CommandOutput::ok(r#"{"features": ["a"], "port": 80}"#)),
            ..CopyCapture::default()
        });
        let rule = MergeRule::append();

        let ack = editor(runner.clone(), dir.path())
            .write_json_file(
                "edge-1",
                "c0ffee",
                "/app/config.json",
                &json!({"features": ["b"], "debug": true}),
                Some(&rule),
            )
            .await
            .unwrap();

        let body = String::from_utf8(runner.copied.lock()[0].1.clone()).unwrap();
        let written: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(written, json!({"features": ["a", "b"], "port": 80, "debug": true}));
        assert!(body.contains("\n    \"debug\": true"));
        assert_eq!(ack.bytes_written, body.len());
        assert!(ack.message().starts_with("JSON file '/app/config.json'"));
    }

    #[tokio::test]
    async fn test_undecodable_existing_file_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(CopyCapture {
            existing: Some(CommandOutput::ok("not json at all")),
            ..CopyCapture::default()
        });

        editor(runner.clone(), dir.path())
            .write_json_file("edge-1", "c0ffee", "/app/config.json", &json!({"a": 1}), None)
            .await
            .unwrap();

        let body = runner.copied.lock()[0].1.clone();
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_unreadable_json_file_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on(" cat ", CommandOutput::failed(1, "cat: /app/x.json: Permission denied"));

        let err = editor(runner.clone(), dir.path())
            .write_json_file("edge-1", "c0ffee", "/app/x.json", &json!({}), None)
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestrationError::Execution { .. }));
        assert_eq!(runner.count_matching(" cp "), 0);
    }

    #[tokio::test]
    async fn test_failed_copy_stops_and_cleans_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .withf(|_, args| args.get(2).map(String::as_str) == Some("cp"))
            .times(1)
            .returning(|_, _| Ok(CommandOutput::failed(1, "No such container: c0ffee")));
        mock.expect_run()
            .withf(|_, args| args.get(2).map(String::as_str) == Some("exec"))
            .times(0);

        let err = editor(Arc::new(mock), dir.path())
            .write_file("edge-1", "c0ffee", "/etc/app.conf", b"x")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("No such container"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_move_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("sh -c", CommandOutput::failed(2, "sh: can't create /etc/app.conf: Read-only file system"));

        let err = editor(runner, dir.path())
            .write_file("edge-1", "c0ffee", "/etc/app.conf", b"x")
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("Read-only file system"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_context_is_rejected_before_any_command() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());

        let err = editor(runner.clone(), dir.path())
            .write_file("ghost", "c0ffee", "/etc/app.conf", b"x")
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestrationError::NotFound { .. }));
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn test_pretty_json_uses_four_spaces() {
        let text = to_pretty_json(&json!({"a": {"b": 1}})).unwrap();
        assert_eq!(text, "{\n    \"a\": {\n        \"b\": 1\n    }\n}");
    }
}
