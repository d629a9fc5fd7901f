use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::errors::{ErrorCode, McpError, ToolError};
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use crate::services::logger::Logger;
use crate::services::tool_executor::{CallToolResult, ToolExecutor};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "lawmatics-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Line-delimited JSON-RPC front end over a [`ToolExecutor`].
pub struct McpServer {
    logger: Logger,
    executor: ToolExecutor,
}

impl McpServer {
    pub fn new(logger: Logger, executor: ToolExecutor) -> Self {
        Self {
            logger: logger.child("server"),
            executor,
        }
    }

    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
        })
    }

    fn handle_tools_list(&self) -> Value {
        json!({ "tools": self.executor.list_tools() })
    }

    async fn handle_tools_call(&self, params: &Value) -> Value {
        let name = params
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        let result = if name.is_empty() {
            self.logger.error(
                "tools/call without a tool name",
                Some(&json!({ "params": params })),
            );
            CallToolResult::error(
                ToolError::config("Tool name is required")
                    .with_hint("Pass params.name as one of the names returned by tools/list.")
                    .render(),
            )
        } else {
            let args = params.get("arguments").cloned().unwrap_or(Value::Null);
            self.executor.execute(name, args).await
        };
        serde_json::to_value(&result).unwrap_or_else(|err| {
            json!({
                "content": [ { "type": "text", "text": err.to_string() } ],
                "isError": true,
            })
        })
    }

    /// Dispatches one request; notifications yield no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.method.starts_with("notifications/") {
            self.logger
                .debug("Notification", Some(&json!({ "method": request.method })));
            return None;
        }
        let id = request.id.clone()?;
        let response = match request.method.as_str() {
            "initialize" => {
                self.logger.info(
                    "Client initialised",
                    Some(&json!({ "client": request.params.get("clientInfo") })),
                );
                JsonRpcResponse::success(id, self.handle_initialize())
            }
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, self.handle_tools_list()),
            "tools/call" => JsonRpcResponse::success(id, self.handle_tools_call(&request.params).await),
            other => JsonRpcResponse::failure(
                id,
                McpError::new(ErrorCode::MethodNotFound, format!("Method not found: {}", other)),
            ),
        };
        Some(response)
    }

    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let parsed: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(err) => {
                self.logger
                    .warn("Unparseable input line", Some(&json!({ "error": err.to_string() })));
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    McpError::new(ErrorCode::ParseError, "Parse error"),
                ));
            }
        };
        let id = parsed.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(parsed) {
            Ok(req) => req,
            Err(_) => {
                return Some(JsonRpcResponse::failure(
                    id,
                    McpError::new(ErrorCode::InvalidRequest, "Invalid request"),
                ))
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::failure(
                id,
                McpError::new(ErrorCode::InvalidRequest, "Invalid request: jsonrpc must be \"2.0\""),
            ));
        }
        self.handle_request(request).await
    }

    /// Serves requests until `reader` hits EOF.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), ToolError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut writer = BufWriter::new(writer);
        while let Some(line) = lines.next_line().await? {
            if let Some(response) = self.handle_line(&line).await {
                let payload = serde_json::to_string(&response)
                    .map_err(|err| ToolError::internal(err.to_string()))?;
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }

    pub async fn run_stdio(&self) -> Result<(), ToolError> {
        self.logger.info(
            "Serving on stdio",
            Some(&json!({ "tools": self.executor.tool_count() })),
        );
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }
}
