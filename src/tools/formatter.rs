//! Result Formatting
//!
//! Maps the terminal state of a request to the shape handed back to callers:
//! `{exitCode, stdout, stderr, truncated}` on success, or
//! `{error: {kind, message}}` with a stable kind on rejection.

use super::executor::{ExecutionError, ExecutionResult};
use super::validator::ValidationError;
use serde::Serialize;
use std::fmt;

/// Any error a `run_command` request can end in
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl CommandError {
    /// Stable, machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.kind(),
            Self::Execution(e) => e.kind(),
        }
    }

    /// Whether the command was refused before anything ran
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Lifecycle of a single `run_command` request
///
/// States only move forward; each request starts a fresh machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestState {
    Received,
    Scanned,
    Tokenized,
    Validated,
    Executing,
    Completed,
    Rejected,
    TimedOut,
    Failed,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Rejected | Self::TimedOut | Self::Failed
        )
    }

    /// Move to `next`, logging the transition
    pub fn advance(self, next: RequestState) -> RequestState {
        debug_assert!(
            !self.is_terminal() && next > self,
            "invalid transition {:?} -> {:?}",
            self,
            next
        );
        tracing::debug!("request state {:?} -> {:?}", self, next);
        next
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Terminal outcome of a `run_command` request
#[derive(Debug)]
pub enum CommandOutcome {
    Completed(ExecutionResult),
    Rejected(CommandError),
}

impl CommandOutcome {
    /// Terminal state this outcome corresponds to
    pub fn state(&self) -> RequestState {
        match self {
            Self::Completed(_) => RequestState::Completed,
            Self::Rejected(CommandError::Validation(_)) => RequestState::Rejected,
            Self::Rejected(CommandError::Execution(ExecutionError::Timeout(_))) => {
                RequestState::TimedOut
            }
            Self::Rejected(CommandError::Execution(_)) => RequestState::Failed,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn result(&self) -> Option<&ExecutionResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Rejected(_) => None,
        }
    }

    pub fn error(&self) -> Option<&CommandError> {
        match self {
            Self::Completed(_) => None,
            Self::Rejected(error) => Some(error),
        }
    }

    /// Caller-visible structured form
    pub fn to_reply(&self) -> CommandReply {
        match self {
            Self::Completed(result) => CommandReply::Completed {
                exit_code: result.exit_code,
                stdout: result.stdout_lossy().into_owned(),
                stderr: result.stderr_lossy().into_owned(),
                truncated: result.truncated(),
                duration_ms: result.duration_ms,
            },
            Self::Rejected(error) => CommandReply::Rejected {
                error: ErrorBody {
                    kind: error.kind(),
                    message: error.to_string(),
                },
            },
        }
    }

    /// Human-readable text blocks, in display order
    pub fn to_text(&self) -> Vec<String> {
        match self {
            Self::Completed(result) => {
                let mut blocks = Vec::new();
                if !result.stdout.is_empty() {
                    blocks.push(result.stdout_lossy().into_owned());
                }
                if !result.stderr.is_empty() {
                    blocks.push(result.stderr_lossy().into_owned());
                }
                blocks.push(format!(
                    "\nCommand completed with return code: {}",
                    result.exit_code
                ));
                if result.truncated() {
                    blocks.push("[Output truncated]".to_string());
                }
                blocks
            }
            Self::Rejected(error @ CommandError::Validation(_)) => {
                vec![format!("Security violation: {}", error)]
            }
            Self::Rejected(CommandError::Execution(error @ ExecutionError::Timeout(_))) => {
                vec![error.to_string()]
            }
            Self::Rejected(error) => vec![format!("Error: {}", error)],
        }
    }
}

impl From<Result<ExecutionResult, CommandError>> for CommandOutcome {
    fn from(result: Result<ExecutionResult, CommandError>) -> Self {
        match result {
            Ok(result) => Self::Completed(result),
            Err(error) => Self::Rejected(error),
        }
    }
}

/// Structured reply for a `run_command` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CommandReply {
    #[serde(rename_all = "camelCase")]
    Completed {
        exit_code: i32,
        stdout: String,
        stderr: String,
        truncated: bool,
        duration_ms: u64,
    },
    Rejected {
        error: ErrorBody,
    },
}

/// Stable error kind plus human-readable detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn completed(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutcome {
        CommandOutcome::Completed(ExecutionResult {
            exit_code,
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            stdout_truncated: false,
            stderr_truncated: false,
            duration_ms: 5,
        })
    }

    #[test]
    fn test_states() {
        assert_eq!(completed(0, "", "").state(), RequestState::Completed);
        assert_eq!(completed(3, "", "").state(), RequestState::Completed);

        let rejected = CommandOutcome::Rejected(
            ValidationError::CommandNotAllowed("rm".into()).into(),
        );
        assert_eq!(rejected.state(), RequestState::Rejected);

        let timed_out = CommandOutcome::Rejected(
            ExecutionError::Timeout(Duration::from_secs(1)).into(),
        );
        assert_eq!(timed_out.state(), RequestState::TimedOut);

        let failed = CommandOutcome::Rejected(
            ExecutionError::Spawn {
                command: "ls".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }
            .into(),
        );
        assert_eq!(failed.state(), RequestState::Failed);
    }

    #[test]
    fn test_state_order() {
        assert!(RequestState::Received < RequestState::Scanned);
        assert!(RequestState::Validated < RequestState::Executing);
        assert!(RequestState::Completed.is_terminal());
        assert!(RequestState::TimedOut.is_terminal());
        assert!(!RequestState::Executing.is_terminal());
        assert_eq!(
            RequestState::Received.advance(RequestState::Scanned),
            RequestState::Scanned
        );
    }

    #[test]
    fn test_completed_reply_shape() {
        let reply = serde_json::to_value(completed(2, "out", "err").to_reply()).unwrap();
        assert_eq!(reply["exitCode"], 2);
        assert_eq!(reply["stdout"], "out");
        assert_eq!(reply["stderr"], "err");
        assert_eq!(reply["truncated"], false);
        assert!(reply.get("error").is_none());
    }

    #[test]
    fn test_rejected_reply_shape() {
        let outcome = CommandOutcome::Rejected(ValidationError::FlagNotAllowed("-R".into()).into());
        let reply = serde_json::to_value(outcome.to_reply()).unwrap();
        assert_eq!(reply["error"]["kind"], "flag_not_allowed");
        assert_eq!(reply["error"]["message"], "Flag '-R' is not allowed");
        assert!(reply.get("exitCode").is_none());
    }

    #[test]
    fn test_completed_text() {
        let blocks = completed(0, "file.txt\n", "").to_text();
        assert_eq!(
            blocks,
            vec!["file.txt\n", "\nCommand completed with return code: 0"]
        );

        let blocks = completed(1, "", "oops").to_text();
        assert_eq!(blocks, vec!["oops", "\nCommand completed with return code: 1"]);
    }

    #[test]
    fn test_truncation_note_appended() {
        let outcome = CommandOutcome::Completed(ExecutionResult {
            exit_code: 0,
            stdout: b"partial".to_vec(),
            stderr: Vec::new(),
            stdout_truncated: true,
            stderr_truncated: false,
            duration_ms: 1,
        });
        let blocks = outcome.to_text();
        assert_eq!(blocks.last().unwrap(), "[Output truncated]");
        assert_eq!(outcome.to_reply(), CommandReply::Completed {
            exit_code: 0,
            stdout: "partial".into(),
            stderr: String::new(),
            truncated: true,
            duration_ms: 1,
        });
    }

    #[test]
    fn test_rejected_text() {
        let outcome = CommandOutcome::Rejected(ValidationError::CommandNotAllowed("rm".into()).into());
        assert_eq!(
            outcome.to_text(),
            vec!["Security violation: Command 'rm' is not allowed"]
        );

        let outcome =
            CommandOutcome::Rejected(ExecutionError::Timeout(Duration::from_secs(30)).into());
        assert_eq!(
            outcome.to_text(),
            vec!["Command timed out after 30 seconds"]
        );

        let outcome = CommandOutcome::Rejected(
            ExecutionError::Spawn {
                command: "ls".into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            }
            .into(),
        );
        assert!(outcome.to_text()[0].starts_with("Error: Failed to start 'ls'"));
    }
}
