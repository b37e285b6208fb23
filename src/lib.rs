//! CmdGuard Server Library
//!
//! This library provides the core functionality for CmdGuard: a policy-checked
//! command runner for LLM clients, served over MCP.
//!
//! - [`config`]: file and environment configuration
//! - [`policy`]: the immutable security policy
//! - [`tools`]: validation and sandboxed execution
//! - [`mcp`]: the JSON-RPC stdio server
//! - [`logging`]: tracing subscriber setup

pub mod config;
pub mod logging;
pub mod mcp;
pub mod policy;
pub mod tools;
