//! Command Service
//!
//! The two operations exposed to the protocol layer. `run_command` drives one
//! request through scan, tokenize, validate and execute; `show_security_rules`
//! returns a snapshot of the policy.

use super::executor::ExecutionEngine;
use super::formatter::{CommandError, CommandOutcome, RequestState};
use super::scanner::OperatorScanner;
use super::tokenizer::{CommandTokenizer, ParsedCommand};
use super::validator::{PolicyValidator, ValidationError};
use crate::policy::{SecurityPolicy, SecurityPolicySnapshot};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// Longest command prefix written to logs
const MAX_LOGGED_COMMAND_CHARS: usize = 120;

/// Entry point for command requests
///
/// Cheap to share: holds only `Arc`s to the immutable policy.
#[derive(Debug, Clone)]
pub struct CommandService {
    policy: Arc<SecurityPolicy>,
    validator: PolicyValidator,
    engine: ExecutionEngine,
}

impl CommandService {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self {
            validator: PolicyValidator::new(policy.clone()),
            engine: ExecutionEngine::new(policy.clone()),
            policy,
        }
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Validate and execute `raw`
    ///
    /// Never fails as a future: every error is folded into the outcome.
    /// Dropping the future while the command runs kills its process group.
    pub async fn run_command(&self, raw: &str) -> CommandOutcome {
        let span = info_span!("run_command", command = %truncate_for_log(raw));
        async {
            let (state, outcome) = self.process(raw).await;
            match &outcome {
                CommandOutcome::Completed(result) => {
                    info!(%state, "Command finished with exit code {}", result.exit_code)
                }
                CommandOutcome::Rejected(error) => {
                    warn!(%state, kind = error.kind(), "{}", error)
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// Drive one request to a terminal state
    async fn process(&self, raw: &str) -> (RequestState, CommandOutcome) {
        let mut state = RequestState::Received;
        let outcome: CommandOutcome = self.drive(raw, &mut state).await.into();
        (state.advance(outcome.state()), outcome)
    }

    async fn drive(
        &self,
        raw: &str,
        state: &mut RequestState,
    ) -> Result<super::ExecutionResult, CommandError> {
        self.validator.check_length(raw)?;
        OperatorScanner::scan(raw)?;
        *state = state.advance(RequestState::Scanned);

        let parsed = CommandTokenizer::tokenize(raw)?;
        *state = state.advance(RequestState::Tokenized);

        self.validator.check(&parsed)?;
        *state = state.advance(RequestState::Validated);

        *state = state.advance(RequestState::Executing);
        Ok(self.engine.execute(&parsed).await?)
    }

    /// Run every validation step without executing
    pub fn check_command(&self, raw: &str) -> Result<ParsedCommand, ValidationError> {
        self.validator.validate(raw)
    }

    /// Read-only snapshot of the active policy
    pub fn show_security_rules(&self) -> SecurityPolicySnapshot {
        self.policy.snapshot()
    }
}

/// Shorten a command for log output
fn truncate_for_log(raw: &str) -> String {
    if raw.chars().count() <= MAX_LOGGED_COMMAND_CHARS {
        return raw.escape_debug().to_string();
    }
    let prefix: String = raw.chars().take(MAX_LOGGED_COMMAND_CHARS).collect();
    format!("{}... ({} chars)", prefix.escape_debug(), raw.chars().count())
}
