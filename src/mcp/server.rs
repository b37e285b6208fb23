//! Stdio server loop
//!
//! Reads newline-delimited JSON-RPC messages, runs each request as its own
//! task, and writes responses as they complete. Responses are not ordered.
//!
//! Shutdown rules:
//! - end of input stops reading; in-flight requests finish and are answered
//! - `notifications/cancelled` aborts one request without a reply
//! - a failed write aborts everything still running
//!
//! Aborting a request drops its future, which kills the command's process
//! group.

use super::handler::McpHandler;
use super::protocol::{
    CancelledParams, McpError, McpMethod, McpRequest, McpResponse, RequestId, JSONRPC_VERSION,
};
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::{AbortHandle, Id as TaskId, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// MCP server bound to one input and one output stream
#[derive(Debug, Clone)]
pub struct McpServer {
    handler: McpHandler,
}

impl McpServer {
    pub fn new(handler: McpHandler) -> Self {
        Self { handler }
    }

    /// Serve until input ends and every in-flight request is answered
    ///
    /// # Errors
    ///
    /// Fails if reading input or writing a response fails. In-flight requests
    /// are aborted before returning.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        let mut in_flight = InFlight::default();
        let mut reading = true;

        info!("MCP server ready");

        loop {
            tokio::select! {
                line = lines.next_line(), if reading => {
                    match line.context("Failed to read request")? {
                        Some(line) => {
                            if let Some(response) = self.dispatch(&line, &mut in_flight).await {
                                write_response(&mut writer, &response).await?;
                            }
                        }
                        None => {
                            info!("Input closed, waiting for {} in-flight request(s)", in_flight.len());
                            reading = false;
                        }
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Some(response) = in_flight.finished(joined) {
                        write_response(&mut writer, &response).await?;
                    }
                }
                else => break,
            }
        }

        info!("MCP server stopped");
        Ok(())
    }

    /// Parse one input line and either answer it inline or start a task
    async fn dispatch(&self, line: &str, in_flight: &mut InFlight) -> Option<McpResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!("Unparsable message: {}", e);
                return Some(McpResponse::err(
                    None,
                    McpError::parse_error(format!("Parse error: {}", e)),
                ));
            }
        };

        let request = match parse_request(value) {
            Ok(request) => request,
            Err(response) => return Some(response),
        };

        match (request.method(), request.id.clone()) {
            (McpMethod::Cancelled, None) => {
                in_flight.cancel(request.params);
                None
            }
            (_, None) => self.handler.handle(request).await,
            (_, Some(id)) if in_flight.contains(&id) => Some(McpResponse::err(
                Some(id.clone()),
                McpError::invalid_request(format!("Request id {} is already in flight", id)),
            )),
            (method, Some(id)) => {
                debug!("Request {} {}", id, method.as_str());
                let handler = self.handler.clone();
                in_flight.spawn(id, async move { handler.handle(request).await });
                None
            }
        }
    }
}

/// Validate the JSON-RPC envelope
fn parse_request(value: Value) -> Result<McpRequest, McpResponse> {
    let id = value
        .get("id")
        .cloned()
        .and_then(|id| serde_json::from_value::<RequestId>(id).ok());

    let request: McpRequest = serde_json::from_value(value).map_err(|e| {
        McpResponse::err(
            id.clone(),
            McpError::invalid_request(format!("Invalid request: {}", e)),
        )
    })?;

    if request.jsonrpc != JSONRPC_VERSION {
        return Err(McpResponse::err(
            id,
            McpError::invalid_request(format!("Unsupported jsonrpc version '{}'", request.jsonrpc)),
        ));
    }

    Ok(request)
}

async fn write_response<W>(writer: &mut W, response: &McpResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(response).context("Failed to serialize MCP response")?;
    debug!("Sending: {}", json);

    writer
        .write_all(json.as_bytes())
        .await
        .context("Failed to write response")?;
    writer
        .write_all(b"\n")
        .await
        .context("Failed to write newline")?;
    writer.flush().await.context("Failed to flush output")?;

    Ok(())
}

/// Requests currently running, indexed both ways
///
/// Dropping this aborts every task.
#[derive(Default)]
struct InFlight {
    tasks: JoinSet<Option<McpResponse>>,
    by_request: HashMap<RequestId, AbortHandle>,
    by_task: HashMap<TaskId, RequestId>,
}

impl InFlight {
    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn contains(&self, id: &RequestId) -> bool {
        self.by_request.contains_key(id)
    }

    fn spawn<F>(&mut self, id: RequestId, future: F)
    where
        F: std::future::Future<Output = Option<McpResponse>> + Send + 'static,
    {
        let handle = self.tasks.spawn(future);
        self.by_task.insert(handle.id(), id.clone());
        self.by_request.insert(id, handle);
    }

    async fn join_next(&mut self) -> Option<Result<(TaskId, Option<McpResponse>), JoinError>> {
        self.tasks.join_next_with_id().await
    }

    /// Abort the request named in `notifications/cancelled` params
    fn cancel(&mut self, params: Option<Value>) {
        let params = params.and_then(|params| serde_json::from_value::<CancelledParams>(params).ok());
        let Some(params) = params else {
            warn!("Ignoring malformed cancellation");
            return;
        };

        match self.by_request.remove(&params.request_id) {
            Some(handle) => {
                info!(
                    reason = params.reason.as_deref().unwrap_or("none"),
                    "Cancelling request {}", params.request_id
                );
                handle.abort();
            }
            None => debug!("Cancellation for unknown request {}", params.request_id),
        }
    }

    /// Bookkeeping for a finished task; returns the response to send, if any
    fn finished(
        &mut self,
        joined: Result<(TaskId, Option<McpResponse>), JoinError>,
    ) -> Option<McpResponse> {
        match joined {
            Ok((task_id, response)) => {
                let id = self.by_task.remove(&task_id)?;
                // Cancelled after completing but before being joined
                self.by_request.remove(&id)?;
                response
            }
            Err(e) if e.is_cancelled() => {
                if let Some(id) = self.by_task.remove(&e.id()) {
                    debug!("Request {} aborted", id);
                }
                None
            }
            Err(e) => {
                let id = self.by_task.remove(&e.id())?;
                self.by_request.remove(&id);
                error!("Request {} panicked: {}", id, e);
                Some(McpResponse::err(
                    Some(id),
                    McpError::internal_error("Request handler failed"),
                ))
            }
        }
    }
}
