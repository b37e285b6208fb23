//! Command Executor
//!
//! Runs a validated command as a direct process invocation (never through a
//! shell) inside the sandbox directory, with a timeout and bounded output
//! capture.

use super::process_group::ProcessGroupGuard;
use super::timeout::ExecutionTimeout;
use super::tokenizer::ParsedCommand;
use crate::policy::SecurityPolicy;
use serde::Serialize;
use std::borrow::Cow;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

/// Read buffer size for output capture
const CAPTURE_CHUNK_SIZE: usize = 8 * 1024;

/// Failures once a command has passed validation
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Command timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("Failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to capture output of '{command}': {source}")]
    OutputCapture {
        command: String,
        #[source]
        source: io::Error,
    },
}

impl ExecutionError {
    /// Stable, machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Spawn { .. } => "spawn",
            Self::OutputCapture { .. } => "output_capture",
        }
    }
}

/// Result of a command that ran to completion
///
/// A non-zero exit code is still a completed execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Exit code; `128 + signal` if the process was killed by a signal
    pub exit_code: i32,

    /// Captured standard output, at most `max_output_bytes`
    pub stdout: Vec<u8>,

    /// Captured standard error, at most `max_output_bytes`
    pub stderr: Vec<u8>,

    /// Whether stdout was cut at the byte budget
    pub stdout_truncated: bool,

    /// Whether stderr was cut at the byte budget
    pub stderr_truncated: bool,

    /// Wall-clock time from spawn to exit
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Whether the process exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Whether either stream was truncated
    pub fn truncated(&self) -> bool {
        self.stdout_truncated || self.stderr_truncated
    }

    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "exit code {} in {}ms ({} bytes stdout, {} bytes stderr{})",
            self.exit_code,
            self.duration_ms,
            self.stdout.len(),
            self.stderr.len(),
            if self.truncated() { ", truncated" } else { "" }
        )
    }
}

/// Bytes read from one output stream
#[derive(Debug, Default)]
struct CapturedStream {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Process executor for validated commands
///
/// # Security
///
/// 1. Uses `tokio::process::Command` with an argument vector, no shell
/// 2. Working directory is the sandbox root
/// 3. The child leads its own process group, killed as a whole on timeout
///    or cancellation
/// 4. Output is capped per stream to bound memory use
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    policy: Arc<SecurityPolicy>,
}

impl ExecutionEngine {
    /// Create an engine bound to `policy`
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }

    /// Execute a validated command
    ///
    /// If the returned future is dropped before completion, the process
    /// group is killed.
    ///
    /// # Errors
    ///
    /// - `Spawn` if the process cannot be started
    /// - `Timeout` if it outlives the policy timeout (it is killed first)
    /// - `OutputCapture` if reading its output or status fails
    pub async fn execute(
        &self,
        command: &ParsedCommand,
    ) -> Result<ExecutionResult, ExecutionError> {
        let start = Instant::now();
        let limit = self.policy.max_output_bytes();
        let timeout = ExecutionTimeout::new(self.policy.command_timeout());

        let mut process = TokioCommand::new(&command.name);
        process
            .args(command.argv())
            .current_dir(self.policy.allowed_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        process.process_group(0);

        let mut child = process.spawn().map_err(|source| ExecutionError::Spawn {
            command: command.name.clone(),
            source,
        })?;
        let mut group = ProcessGroupGuard::new(&child);
        debug!("Spawned '{}' (pid {:?})", command.name, child.id());

        let capture_error = |source: io::Error| ExecutionError::OutputCapture {
            command: command.name.clone(),
            source,
        };
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| capture_error(io::Error::other("stdout was not piped")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| capture_error(io::Error::other("stderr was not piped")))?;

        let outcome = timeout
            .run(async {
                // Leftover descendants would hold the pipes open
                let wait = group.reap_with_group(&mut child);
                let (status, out, err) =
                    tokio::join!(wait, capture(stdout, limit), capture(stderr, limit));
                Ok::<_, io::Error>((status?, out?, err?))
            })
            .await;

        match outcome {
            Ok(Ok((status, out, err))) => {
                group.disarm();
                let result = ExecutionResult {
                    exit_code: exit_code(status),
                    stdout: out.bytes,
                    stderr: err.bytes,
                    stdout_truncated: out.truncated,
                    stderr_truncated: err.truncated,
                    duration_ms: elapsed_ms(start),
                };
                if result.truncated() {
                    warn!(
                        max_size = limit,
                        "Output of '{}' truncated", command.name
                    );
                }
                info!("'{}' completed: {}", command.name, result.summary());
                Ok(result)
            }
            Ok(Err(source)) => Err(capture_error(source)),
            Err(expired) => {
                warn!("'{}' timed out after {:?}, killing", command.name, expired.0);
                if let Err(e) = group.kill() {
                    warn!("Failed to kill process group: {}", e);
                }
                if let Err(e) = child.kill().await {
                    debug!("Failed to kill timed out process: {}", e);
                }
                group.disarm();
                Err(ExecutionError::Timeout(expired.0))
            }
        }
    }

    /// Get the policy this engine runs under
    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }
}

/// Read `reader` to EOF, keeping at most `limit` bytes
///
/// Bytes past the limit are drained and discarded so the child never blocks
/// on a full pipe.
async fn capture<R>(mut reader: R, limit: usize) -> io::Result<CapturedStream>
where
    R: AsyncRead + Unpin,
{
    let mut captured = CapturedStream::default();
    let mut chunk = [0u8; CAPTURE_CHUNK_SIZE];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(captured.bytes.len());
        if n > room {
            captured.bytes.extend_from_slice(&chunk[..room]);
            captured.truncated = true;
        } else {
            captured.bytes.extend_from_slice(&chunk[..n]);
        }
    }

    Ok(captured)
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
