use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::require_str;
use crate::errors::ToolError;
use crate::mcp::catalog::{ToolDef, ToolRegistry};
use crate::services::lawmatics::models::Document;
use crate::services::lawmatics::LawmaticsClient;
use crate::services::tool_executor::ToolHandler;

fn format_document(document: &Document) -> String {
    format!(
        "{} ({})",
        document.attr_text("name").unwrap_or_default(),
        document
            .attr_text("file_type")
            .unwrap_or_else(|| "unknown type".to_string())
    )
}

pub fn format_document_list(documents: &[Document]) -> String {
    if documents.is_empty() {
        return "No documents found.".to_string();
    }
    let lines: Vec<String> = documents
        .iter()
        .map(|doc| format!("* {} [ID: {}]", format_document(doc), doc.id))
        .collect();
    format!("Available Documents:\n\n{}\n", lines.join("\n"))
}

struct GetDocument(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for GetDocument {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let document_id = require_str(&args, "documentId")?;
        let document = self.0.get_document(&document_id).await?.data;
        Ok(format_document(&document))
    }
}

struct ListDocuments(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for ListDocuments {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let prospect_id = require_str(&args, "prospectId")?;
        let response = self.0.get_documents(&prospect_id).await?;
        Ok(format_document_list(&response.data))
    }
}

struct DownloadDocument(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for DownloadDocument {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let document_id = require_str(&args, "documentId")?;
        let content = self.0.download_document(&document_id).await?;
        let payload = json!({
            "documentId": document_id,
            "encoding": "base64",
            "content": content,
        });
        serde_json::to_string_pretty(&payload).map_err(|err| ToolError::internal(err.to_string()))
    }
}

fn document_id_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": { "documentId": { "type": "string", "description": description } },
        "required": ["documentId"]
    })
}

pub fn register_document_tools(
    registry: &mut ToolRegistry,
    client: Arc<LawmaticsClient>,
) -> Result<(), ToolError> {
    registry.register(
        ToolDef::new(
            "get_document",
            "Get a document by ID",
            document_id_schema("The ID of the document to get"),
        ),
        Arc::new(GetDocument(client.clone())),
    )?;
    registry.register(
        ToolDef::new(
            "list_documents",
            "List available documents for matter",
            json!({
                "type": "object",
                "properties": {
                    "prospectId": { "type": "string", "description": "The ID of the prospect to get documents for" }
                },
                "required": ["prospectId"]
            }),
        ),
        Arc::new(ListDocuments(client.clone())),
    )?;
    registry.register(
        ToolDef::new(
            "download_document",
            "Download a document's content, base64 encoded",
            document_id_schema("The ID of the document to download"),
        ),
        Arc::new(DownloadDocument(client)),
    )
}
