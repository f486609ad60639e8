//! Verification runner port and the child-process implementation.
//!
//! `run(contract, timeoutMs)` spawns `contract.command contract.args...` in
//! `contract.workingDirectory` with environment
//! `base ∪ additionalEnv ∪ contract.env` (later overrides earlier), kills
//! the child on timeout, and captures both streams. The kill is delivered
//! through the tokio process handle; the outcome reports the terminating
//! signal and `timedOut: true`.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::contract::ReproducibilityContract;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOutcome {
    pub exit_code: Option<i64>,
    pub signal: Option<String>,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
#[error("verification runner error: {0}")]
pub struct RunnerError(pub String);

#[async_trait]
pub trait VerificationRunner: Send + Sync {
    async fn run(
        &self,
        contract: &ReproducibilityContract,
        timeout_ms: u64,
    ) -> Result<RunnerOutcome, RunnerError>;
}

#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    /// Start from the parent process environment instead of a clean slate.
    pub inherit_env: bool,
    /// Applied between the base environment and the contract env.
    pub additional_env: BTreeMap<String, String>,
}

/// Default runner: spawns the proof checker as a child process.
#[derive(Debug, Clone, Default)]
pub struct ChildProcessRunner {
    pub options: RunnerOptions,
}

impl ChildProcessRunner {
    pub fn new(options: RunnerOptions) -> Self {
        Self { options }
    }
}

async fn drain<R: tokio::io::AsyncRead + Unpin>(reader: Option<R>) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|n| match n {
        9 => "SIGKILL".to_string(),
        15 => "SIGTERM".to_string(),
        other => format!("SIG{other}"),
    })
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<String> {
    None
}

#[async_trait]
impl VerificationRunner for ChildProcessRunner {
    async fn run(
        &self,
        contract: &ReproducibilityContract,
        timeout_ms: u64,
    ) -> Result<RunnerOutcome, RunnerError> {
        let mut cmd = Command::new(&contract.command);
        cmd.args(&contract.args)
            .current_dir(&contract.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if !self.options.inherit_env {
            cmd.env_clear();
        }
        cmd.envs(&self.options.additional_env);
        cmd.envs(&contract.env);

        debug!(command = %contract.command, timeout_ms, "spawning verification runner");

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| RunnerError(format!("failed to spawn {}: {e}", contract.command)))?;

        let stdout_task = tokio::spawn(drain(child.stdout.take()));
        let stderr_task = tokio::spawn(drain(child.stderr.take()));

        let waited =
            tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait()).await;

        let (status, timed_out) = match waited {
            Ok(Ok(status)) => (Some(status), false),
            Ok(Err(e)) => return Err(RunnerError(format!("wait failed: {e}"))),
            Err(_) => {
                let _ = child.start_kill();
                let status = child.wait().await.ok();
                (status, true)
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let duration_ms = start.elapsed().as_millis() as u64;

        let (exit_code, signal) = match &status {
            Some(s) => (s.code().map(i64::from), exit_signal(s)),
            None => (None, None),
        };

        Ok(RunnerOutcome {
            exit_code,
            signal,
            duration_ms,
            timed_out,
            stdout,
            stderr,
        })
    }
}
