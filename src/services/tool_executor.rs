use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::errors::{ToolError, ToolErrorKind};
use crate::mcp::catalog::{ToolDef, ToolRegistry};
use crate::services::logger::Logger;
use crate::utils::suggest::suggest;

#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Receives arguments that already passed schema validation and normalisation.
    async fn handle(&self, args: Value) -> Result<String, ToolError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallToolResult {
    pub content: Vec<TextContent>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![TextContent {
                kind: "text".to_string(),
                text: text.into(),
            }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }

    /// Concatenated text of every content block.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs tools by name. Every outcome, including failures, comes back as a
/// `CallToolResult`; nothing escapes as an error.
#[derive(Clone)]
pub struct ToolExecutor {
    logger: Logger,
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(logger: Logger, registry: Arc<ToolRegistry>) -> Self {
        Self {
            logger: logger.child("executor"),
            registry,
        }
    }

    pub fn list_tools(&self) -> Vec<ToolDef> {
        self.registry.list()
    }

    pub fn tool_count(&self) -> usize {
        self.registry.len()
    }

    fn unknown_tool(&self, name: &str) -> ToolError {
        let suggestions = suggest(name, &self.registry.names(), 3);
        let err = ToolError::not_found(format!("Unknown tool: {}", name));
        if suggestions.is_empty() {
            err.with_hint("Call tools/list to see the available tools.")
        } else {
            err.with_hint(format!("Did you mean: {}?", suggestions.join(", ")))
        }
    }

    async fn run(&self, name: &str, args: Value) -> Result<String, ToolError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| self.unknown_tool(name))?;
        let args = tool.validator.validate(&args)?;
        tool.handler.handle(args).await
    }

    pub async fn execute(&self, name: &str, args: Value) -> CallToolResult {
        let invocation = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        self.logger.debug(
            "Tool call",
            Some(&serde_json::json!({ "tool": name, "invocation": invocation })),
        );

        match self.run(name, args).await {
            Ok(text) => {
                self.logger.debug(
                    "Tool call finished",
                    Some(&serde_json::json!({
                        "tool": name,
                        "invocation": invocation,
                        "duration_ms": started.elapsed().as_millis() as u64,
                    })),
                );
                CallToolResult::text(text)
            }
            Err(err) => {
                let meta = serde_json::json!({
                    "tool": name,
                    "invocation": invocation,
                    "kind": err.kind,
                    "code": err.code,
                    "details": err.details,
                });
                match err.kind {
                    ToolErrorKind::Config | ToolErrorKind::Internal | ToolErrorKind::NotFound => {
                        self.logger.error(&err.message, Some(&meta))
                    }
                    _ => self.logger.warn(&err.message, Some(&meta)),
                }
                CallToolResult::error(err.render())
            }
        }
    }
}
