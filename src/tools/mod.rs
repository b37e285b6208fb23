//! Command Execution Subsystem
//!
//! This module turns a raw command string from an LLM client into either a
//! rejection or a captured process result. Nothing ever reaches a shell.
//!
//! # Security Features
//!
//! - **Operator Rejection**: `;`, `|`, `&&`, `$(`, redirections and friends
//!   are refused anywhere in the input, quoted or not
//! - **Allowlists**: command names and flags must match configured sets exactly
//! - **Containment**: path arguments must resolve inside the sandbox directory
//! - **Timeout Enforcement**: the whole process group is killed on expiry
//! - **Bounded Output**: each stream is capped at a configured byte budget
//!
//! # Architecture
//!
//! The module is organized into:
//! - `scanner.rs`: shell operator detection
//! - `tokenizer.rs`: quote-aware splitting into name, flags and arguments
//! - `path.rs`: canonicalization and containment
//! - `validator.rs`: the ordered policy checks
//! - `executor.rs`: subprocess execution with timeout and capture
//! - `process_group.rs`: group-wide termination
//! - `timeout.rs`: timeout management
//! - `formatter.rs`: request states and caller-visible results
//! - `service.rs`: the `run_command` / `show_security_rules` operations
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cmdguard_server::policy::SecurityPolicy;
//! use cmdguard_server::tools::CommandService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let policy = SecurityPolicy::builder("/srv/sandbox").build()?;
//!     let service = CommandService::new(Arc::new(policy));
//!
//!     let outcome = service.run_command("ls -l notes.txt").await;
//!     if let Some(result) = outcome.result() {
//!         println!("Exit code: {}", result.exit_code);
//!         println!("Stdout: {}", result.stdout_lossy());
//!     }
//!
//!     Ok(())
//! }
//! ```

mod executor;
mod formatter;
mod path;
mod process_group;
mod scanner;
mod service;
mod timeout;
mod tokenizer;
mod validator;

#[cfg(test)]
mod proptests;

pub use executor::{ExecutionEngine, ExecutionError, ExecutionResult};
pub use formatter::{CommandError, CommandOutcome, CommandReply, ErrorBody, RequestState};
pub use path::PathResolver;
pub use process_group::ProcessGroupGuard;
pub use scanner::{OperatorScanner, SHELL_OPERATORS};
pub use service::CommandService;
pub use timeout::{ExecutionTimeout, TimeoutExpired};
pub use tokenizer::{is_flag, CommandTokenizer, ParsedCommand};
pub use validator::{PolicyValidator, ValidationError};
