//! Fake command runner and file transport.

use crate::exec::{CommandOutput, CommandRunner};
use crate::transfer::{FileTransport, SshTarget, TransferSession};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// One command seen by a [`ScriptedRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    /// Program name.
    pub program: String,
    /// Arguments in order.
    pub args: Vec<String>,
}

impl RecordedCommand {
    /// Arguments joined with single spaces.
    #[must_use]
    pub fn line(&self) -> String {
        self.args.join(" ")
    }
}

#[derive(Debug)]
enum Reply {
    Output(VecDeque<CommandOutput>),
    SpawnError(String),
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    reply: Reply,
    delay: Option<Duration>,
}

impl Rule {
    fn next(&mut self) -> std::io::Result<CommandOutput> {
        match &mut self.reply {
            Reply::Output(queue) => {
                let output = if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                };
                Ok(output.unwrap_or_default())
            }
            Reply::SpawnError(message) => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                message.clone(),
            )),
        }
    }
}

/// A command runner answering from scripted rules.
///
/// A rule matches when its pattern is a substring of the space-joined
/// arguments. The most recently added matching rule answers; commands no
/// rule matches succeed with empty output. Every command is recorded.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCommand>>,
}

impl ScriptedRunner {
    /// Creates a runner where every command succeeds silently.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers matching commands with `output`.
    pub fn on(&self, pattern: impl Into<String>, output: CommandOutput) -> &Self {
        self.push(pattern.into(), Reply::Output(VecDeque::from([output])), None)
    }

    /// Answers matching commands with `output` after sleeping for `delay`.
    pub fn on_delayed(
        &self,
        pattern: impl Into<String>,
        output: CommandOutput,
        delay: Duration,
    ) -> &Self {
        self.push(pattern.into(), Reply::Output(VecDeque::from([output])), Some(delay))
    }

    /// Answers matching commands with each output in turn, repeating the last.
    pub fn on_sequence(&self, pattern: impl Into<String>, outputs: Vec<CommandOutput>) -> &Self {
        self.push(pattern.into(), Reply::Output(outputs.into()), None)
    }

    /// Makes matching commands fail to start.
    pub fn fail_to_spawn(&self, pattern: impl Into<String>) -> &Self {
        let pattern = pattern.into();
        let message = format!("scripted spawn failure for '{pattern}'");
        self.push(pattern, Reply::SpawnError(message), None)
    }

    fn push(&self, pattern: String, reply: Reply, delay: Option<Duration>) -> &Self {
        self.rules.lock().push(Rule {
            pattern,
            reply,
            delay,
        });
        self
    }

    /// Returns every recorded command.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.calls.lock().clone()
    }

    /// Returns the number of recorded commands.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the number of recorded commands whose arguments contain `pattern`.
    #[must_use]
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.line().contains(pattern))
            .count()
    }

    /// Clears recorded commands, keeping the rules.
    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let command = RecordedCommand {
            program: program.to_string(),
            args: args.to_vec(),
        };
        let line = command.line();
        self.calls.lock().push(command);

        let (reply, delay) = {
            let mut rules = self.rules.lock();
            match rules.iter_mut().rev().find(|r| line.contains(&r.pattern)) {
                Some(rule) => (rule.next(), rule.delay),
                None => (Ok(CommandOutput::ok("")), None),
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        reply
    }
}

#[derive(Debug, Default)]
struct TransportState {
    refuse: bool,
    failures: HashMap<String, usize>,
    attempts: HashMap<String, usize>,
    uploads: BTreeMap<String, Vec<u8>>,
    targets: Vec<SshTarget>,
    opened: usize,
    closed: usize,
}

/// An in-memory file transport.
///
/// Uploaded content is read from the local file and kept by remote path.
/// Failures can be injected per remote path.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<TransportState>>,
}

impl MemoryTransport {
    /// Creates an empty transport that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `times` uploads to `remote_path`.
    pub fn fail_times(&self, remote_path: impl Into<String>, times: usize) {
        self.state.lock().failures.insert(remote_path.into(), times);
    }

    /// Makes every connection attempt fail.
    pub fn refuse_connections(&self) {
        self.state.lock().refuse = true;
    }

    /// Content last uploaded to `remote_path`.
    #[must_use]
    pub fn uploaded(&self, remote_path: &str) -> Option<Vec<u8>> {
        self.state.lock().uploads.get(remote_path).cloned()
    }

    /// Number of distinct remote paths written.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.state.lock().uploads.len()
    }

    /// Upload attempts made for `remote_path`, failed ones included.
    #[must_use]
    pub fn attempts(&self, remote_path: &str) -> usize {
        self.state
            .lock()
            .attempts
            .get(remote_path)
            .copied()
            .unwrap_or(0)
    }

    /// Targets connected to, in order.
    #[must_use]
    pub fn targets(&self) -> Vec<SshTarget> {
        self.state.lock().targets.clone()
    }

    /// Number of sessions opened.
    #[must_use]
    pub fn sessions_opened(&self) -> usize {
        self.state.lock().opened
    }

    /// Number of sessions closed.
    #[must_use]
    pub fn sessions_closed(&self) -> usize {
        self.state.lock().closed
    }
}

#[async_trait]
impl FileTransport for MemoryTransport {
    async fn connect(&self, target: &SshTarget) -> anyhow::Result<Box<dyn TransferSession>> {
        let mut state = self.state.lock();
        if state.refuse {
            anyhow::bail!("connection to {} refused", target.destination());
        }
        state.opened += 1;
        state.targets.push(target.clone());
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<TransportState>>,
}

#[async_trait]
impl TransferSession for MemorySession {
    async fn put(&self, local_path: &Path, remote_path: &str) -> anyhow::Result<()> {
        let payload = tokio::fs::read(local_path).await?;

        let mut state = self.state.lock();
        *state.attempts.entry(remote_path.to_string()).or_default() += 1;
        if let Some(remaining) = state.failures.get_mut(remote_path) {
            if *remaining > 0 {
                *remaining -= 1;
                anyhow::bail!("injected failure writing {remote_path}");
            }
        }
        state.uploads.insert(remote_path.to_string(), payload);
        Ok(())
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.state.lock().closed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_unmatched_commands_succeed_and_are_recorded() {
        let runner = ScriptedRunner::new();
        let out = runner.run("docker", &args(&["ps"])).await.unwrap();

        assert!(out.success());
        assert_eq!(runner.call_count(), 1);
        assert_eq!(runner.calls()[0].line(), "ps");
    }

    #[tokio::test]
    async fn test_latest_rule_wins() {
        let runner = ScriptedRunner::new();
        runner
            .on("compose", CommandOutput::ok("first"))
            .on("compose up", CommandOutput::failed(1, "boom"));

        let up = runner.run("docker", &args(&["compose", "up"])).await.unwrap();
        let ps = runner.run("docker", &args(&["compose", "ps"])).await.unwrap();

        assert_eq!(up.exit_code, Some(1));
        assert_eq!(ps.stdout, "first");
        assert_eq!(runner.count_matching("compose"), 2);
    }

    #[tokio::test]
    async fn test_sequence_repeats_last() {
        let runner = ScriptedRunner::new();
        runner.on_sequence(
            "inspect",
            vec![CommandOutput::failed(1, ""), CommandOutput::ok("[]")],
        );

        let argv = args(&["inspect", "x"]);
        let mut codes = Vec::new();
        for _ in 0..3 {
            codes.push(runner.run("docker", &argv).await.unwrap().exit_code);
        }

        assert_eq!(codes, vec![Some(1), Some(0), Some(0)]);
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let runner = ScriptedRunner::new();
        runner.fail_to_spawn("context ls");
        assert!(runner.run("docker", &args(&["context", "ls"])).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_transport_counts_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("f");
        std::fs::write(&local, b"data").unwrap();

        let transport = MemoryTransport::new();
        transport.fail_times("/r", 1);
        let target = SshTarget::parse("ssh://h", 22).unwrap();
        let session = transport.connect(&target).await.unwrap();

        assert!(session.put(&local, "/r").await.is_err());
        assert!(session.put(&local, "/r").await.is_ok());
        session.close().await.unwrap();

        assert_eq!(transport.attempts("/r"), 2);
        assert_eq!(transport.uploaded("/r").as_deref(), Some(&b"data"[..]));
        assert_eq!(transport.sessions_closed(), 1);
        assert_eq!(transport.targets()[0].host, "h");
    }
}
