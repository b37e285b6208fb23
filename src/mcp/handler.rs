//! Request dispatch
//!
//! Maps a parsed JSON-RPC request to its response. Tools are a fixed table
//! ([`ToolKind`]); there is no dynamic registration.

use super::protocol::{
    CallToolResult, Content, InitializeResult, McpError, McpMethod, McpRequest, McpResponse,
    RequestId, Tool, ToolCallParams,
};
use crate::policy::SecurityPolicy;
use crate::tools::CommandService;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// The tools this server exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    RunCommand,
    ShowSecurityRules,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::RunCommand, ToolKind::ShowSecurityRules];

    pub fn name(&self) -> &'static str {
        match self {
            Self::RunCommand => "run_command",
            Self::ShowSecurityRules => "show_security_rules",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    /// Definition advertised through `tools/list`
    pub fn definition(&self, policy: &SecurityPolicy) -> Tool {
        match self {
            Self::RunCommand => Tool {
                name: self.name().to_string(),
                description: format!(
                    "Allows command (CLI) execution in the directory: {}\n\n\
                     Available commands: {}\n\
                     Available flags: {}\n\n\
                     Note: Shell operators (&&, |, >, >>) are not supported.",
                    policy.allowed_dir().display(),
                    join(policy.allowed_commands()),
                    join(policy.allowed_flags()),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "command": {
                            "type": "string",
                            "description": "Single command to execute (example: 'ls -l' or 'cat file.txt')"
                        }
                    },
                    "required": ["command"]
                }),
            },
            Self::ShowSecurityRules => Tool {
                name: self.name().to_string(),
                description: "Show what commands and operations are allowed in this environment."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {}
                }),
            },
        }
    }
}

fn join<'a>(values: impl IntoIterator<Item = &'a String>) -> String {
    values
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Stateless request handler shared by every in-flight request
#[derive(Debug, Clone)]
pub struct McpHandler {
    service: Arc<CommandService>,
}

impl McpHandler {
    pub fn new(service: Arc<CommandService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &CommandService {
        &self.service
    }

    /// Handle one request
    ///
    /// Returns `None` for notifications, which never get a response.
    pub async fn handle(&self, request: McpRequest) -> Option<McpResponse> {
        let method = request.method();
        let Some(id) = request.id else {
            debug!("Notification {}", method.as_str());
            return None;
        };

        let result = match method {
            McpMethod::Initialize => {
                info!("Client initialized session");
                to_value(InitializeResult::default())
            }
            McpMethod::Ping => Ok(json!({})),
            McpMethod::ToolsList => Ok(self.list_tools()),
            McpMethod::ToolsCall => self.call_tool(request.params).await,
            McpMethod::Initialized | McpMethod::Cancelled => Err(McpError::invalid_request(
                format!("{} must be sent as a notification", method.as_str()),
            )),
            McpMethod::Custom(name) => Err(McpError::method_not_found(name)),
        };

        Some(respond(id, result))
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Tool> = ToolKind::ALL
            .iter()
            .map(|tool| tool.definition(self.service.policy()))
            .collect();
        json!({ "tools": tools })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, McpError> {
        let params: ToolCallParams = params
            .ok_or_else(|| McpError::invalid_params("Missing tool call parameters"))
            .and_then(|params| {
                serde_json::from_value(params)
                    .map_err(|e| McpError::invalid_params(format!("Invalid tool call: {}", e)))
            })?;

        let tool = ToolKind::from_name(&params.name)
            .ok_or_else(|| McpError::invalid_params(format!("Unknown tool: {}", params.name)))?;

        let result = match tool {
            ToolKind::RunCommand => self.run_command(&params.arguments).await?,
            ToolKind::ShowSecurityRules => self.show_security_rules()?,
        };
        to_value(result)
    }

    async fn run_command(&self, arguments: &Value) -> Result<CallToolResult, McpError> {
        let Some(command) = arguments.get("command").and_then(Value::as_str) else {
            return Ok(CallToolResult::error("No command provided"));
        };

        let outcome = self.service.run_command(command).await;
        let content = outcome.to_text().into_iter().map(Content::text).collect();
        let structured = to_value(outcome.to_reply())?;

        Ok(CallToolResult {
            content,
            is_error: outcome.is_error(),
            structured_content: Some(structured),
        })
    }

    fn show_security_rules(&self) -> Result<CallToolResult, McpError> {
        let snapshot = self.service.show_security_rules();
        let structured = to_value(&snapshot)?;
        Ok(CallToolResult::success(vec![Content::text(snapshot.to_string())])
            .with_structured(structured))
    }
}

fn respond(id: RequestId, result: Result<Value, McpError>) -> McpResponse {
    match result {
        Ok(value) => McpResponse::ok(id, value),
        Err(error) => McpResponse::err(Some(id), error),
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::internal_error(e.to_string()))
}
