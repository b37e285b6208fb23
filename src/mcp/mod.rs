//! MCP (Model Context Protocol) Server Implementation
//!
//! This module exposes the command service to LLM clients over stdio,
//! built directly on Tokio and Serde (no external SDK).
//!
//! # Architecture
//!
//! The implementation is organized into three layers:
//!
//! 1. **Protocol Layer** (`protocol`): JSON-RPC 2.0 message types
//! 2. **Handler Layer** (`handler`): method dispatch and the tool table
//! 3. **Server Layer** (`server`): line framing, per-request tasks, cancellation
//!
//! # Design Principles
//!
//! - **Minimal Dependencies**: Only Tokio and Serde
//! - **Isolation**: every `tools/call` runs in its own task
//! - **Type Safety**: tools are a closed enum, not a string registry

// Protocol layer: JSON-RPC 2.0 message types
pub mod protocol;

// Handler layer: request dispatch
pub mod handler;

// Server layer: stdio loop
pub mod server;

// Re-export commonly used types for convenience
pub use handler::{McpHandler, ToolKind};
pub use protocol::{
    CallToolResult, CancelledParams, Content, InitializeResult, McpError, McpMethod, McpRequest,
    McpResponse, RequestId, ServerInfo, Tool, ToolCallParams,
};
pub use server::McpServer;
