//! MCP Protocol Types (JSON-RPC 2.0)
//!
//! This module defines the protocol types the server reads and writes for the
//! Model Context Protocol (MCP). MCP is built on top of JSON-RPC 2.0.
//!
//! # Protocol Specification
//!
//! - JSON-RPC 2.0: <https://www.jsonrpc.org/specification>
//! - MCP Spec: <https://modelcontextprotocol.io/specification/2024-11-05>
//!
//! # Architecture
//!
//! The protocol layer is responsible only for serialization/deserialization of MCP messages.
//! Dispatch lives in `handler`, framing and concurrency in `server`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision advertised during initialization
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Name reported in `serverInfo`
pub const SERVER_NAME: &str = "cmdguard";

/// A JSON-RPC request identifier
///
/// Clients may use numbers or strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for RequestId {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// A JSON-RPC 2.0 request or notification
///
/// Messages without an `id` are notifications and never get a response.
///
/// # Example
///
/// ```json
/// {
///   "jsonrpc": "2.0",
///   "id": 1,
///   "method": "tools/call",
///   "params": {"name": "run_command", "arguments": {"command": "ls -l"}}
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Request identifier; absent for notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    /// Method name to invoke
    pub method: String,

    /// Method parameters (optional, depends on method)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl McpRequest {
    /// Create a new MCP request
    pub fn new(
        id: impl Into<RequestId>,
        method: impl Into<String>,
        params: Option<serde_json::Value>,
    ) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// Create a notification (no id, no response expected)
    pub fn notification(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Parsed method identifier
    pub fn method(&self) -> McpMethod {
        self.method.as_str().into()
    }
}

/// A JSON-RPC 2.0 response message
///
/// A response either contains a `result` or an `error`, but never both.
/// `id` is `null` when the request could not be parsed far enough to read it.
///
/// # Example (Error)
///
/// ```json
/// {
///   "jsonrpc": "2.0",
///   "id": null,
///   "error": {"code": -32700, "message": "Parse error: expected value at line 1 column 1"}
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Request identifier (must match the request's ID)
    pub id: Option<RequestId>,

    /// Result payload (present on success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Error information (present on failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl McpResponse {
    /// Create a successful response
    pub fn ok(id: RequestId, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn err(id: Option<RequestId>, error: McpError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Check if the response is successful
    pub fn is_success(&self) -> bool {
        self.result.is_some() && self.error.is_none()
    }

    /// Get the result, or the error if unsuccessful
    pub fn into_result(self) -> Result<serde_json::Value, McpError> {
        match (self.result, self.error) {
            (Some(result), None) => Ok(result),
            (None, Some(error)) => Err(error),
            _ => Err(McpError::internal_error(
                "Invalid response: both result and error present",
            )),
        }
    }
}

/// A JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpError {
    /// Error code (JSON-RPC defined)
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Additional error data (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl McpError {
    /// Create a new error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    // JSON-RPC standard errors
    /// Parse error (-32700): Invalid JSON was received
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(-32700, message)
    }

    /// Invalid request (-32600): The JSON sent is not a valid Request object
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(-32600, message)
    }

    /// Method not found (-32601): The method does not exist / is not available
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(-32601, format!("Method not found: {}", method.into()))
    }

    /// Invalid params (-32602): Invalid method parameter(s)
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(-32602, message)
    }

    /// Internal error (-32603): Internal JSON-RPC error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(-32603, message)
    }
}

impl fmt::Display for McpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Error {}] {}", self.code, self.message)
    }
}

impl std::error::Error for McpError {}

/// MCP method identifiers handled by the server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum McpMethod {
    /// Initialize the connection (must be called first)
    Initialize,

    /// Client finished initialization (notification)
    Initialized,

    /// Liveness check
    Ping,

    /// List available tools
    ToolsList,

    /// Call a specific tool
    ToolsCall,

    /// Client gave up on an in-flight request (notification)
    Cancelled,

    /// Anything else
    Custom(String),
}

impl McpMethod {
    /// Convert to string for JSON-RPC method field
    pub fn as_str(&self) -> &str {
        match self {
            Self::Initialize => "initialize",
            Self::Initialized => "notifications/initialized",
            Self::Ping => "ping",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::Cancelled => "notifications/cancelled",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl From<&str> for McpMethod {
    fn from(s: &str) -> Self {
        match s {
            "initialize" => Self::Initialize,
            "notifications/initialized" => Self::Initialized,
            "ping" => Self::Ping,
            "tools/list" => Self::ToolsList,
            "tools/call" => Self::ToolsCall,
            "notifications/cancelled" => Self::Cancelled,
            _ => Self::Custom(s.to_string()),
        }
    }
}

/// Result of the initialize handshake
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Server protocol version
    pub protocol_version: String,

    /// Server capabilities
    pub capabilities: serde_json::Value,

    /// Server information
    pub server_info: ServerInfo,
}

impl Default for InitializeResult {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({ "tools": {} }),
            server_info: ServerInfo::default(),
        }
    }
}

/// Server identification information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server name
    pub name: String,

    /// Server version
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Tool definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tool {
    /// Tool name (unique identifier)
    pub name: String,

    /// Tool description
    pub description: String,

    /// Tool input schema (JSON Schema)
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// Tool call parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallParams {
    /// Name of the tool to call
    pub name: String,

    /// Tool arguments (must match input schema)
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// One item of tool output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Result of a `tools/call`
///
/// Tool-level failures are reported here with `isError: true`, not as
/// JSON-RPC errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,

    #[serde(default)]
    pub is_error: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<serde_json::Value>,
}

impl CallToolResult {
    pub fn success(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: false,
            structured_content: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
            structured_content: None,
        }
    }

    pub fn with_structured(mut self, value: serde_json::Value) -> Self {
        self.structured_content = Some(value);
        self
    }
}

/// Parameters of `notifications/cancelled`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CancelledParams {
    pub request_id: RequestId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
