use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

use super::{arg_str, require_str};
use crate::errors::ToolError;
use crate::mcp::catalog::{ToolDef, ToolRegistry};
use crate::services::lawmatics::models::{DocumentableType, UploadRequest};
use crate::services::lawmatics::LawmaticsClient;
use crate::services::logger::Logger;
use crate::services::tool_executor::ToolHandler;

fn documentable_type(args: &Value) -> Result<DocumentableType, ToolError> {
    match args.get("documentableType") {
        None | Some(Value::Null) => Ok(DocumentableType::Firm),
        Some(value) => serde_json::from_value(value.clone()).map_err(|_| {
            ToolError::invalid_params(format!("Unsupported documentableType: {}", value))
                .with_hint("Use one of: firm, client, matter, contact.")
        }),
    }
}

fn folder_path(args: &Value) -> Option<Vec<String>> {
    let items = args.get("folderPath")?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}

pub struct FileManager {
    logger: Logger,
    client: Arc<LawmaticsClient>,
}

impl FileManager {
    pub fn new(logger: Logger, client: Arc<LawmaticsClient>) -> Self {
        Self {
            logger: logger.child("files"),
            client,
        }
    }

    /// Checks the local file and target before reading anything.
    pub async fn prepare(&self, args: &Value) -> Result<UploadRequest, ToolError> {
        let file_path = require_str(args, "filePath")?;
        let documentable_type = documentable_type(args)?;
        let documentable_id = arg_str(args, "documentableId");

        let metadata = tokio::fs::metadata(&file_path).await.ok();
        if !metadata.map(|m| m.is_file()).unwrap_or(false) {
            return Err(ToolError::invalid_params(format!(
                "File not found at path: {}",
                file_path
            )));
        }
        if documentable_type != DocumentableType::Firm && documentable_id.is_none() {
            return Err(ToolError::invalid_params(format!(
                "documentableId is required when documentableType is {}",
                documentable_type.as_str()
            )));
        }

        let bytes = tokio::fs::read(&file_path).await?;
        let name = arg_str(args, "name");
        let file_name = name.clone().unwrap_or_else(|| {
            Path::new(&file_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file_path.clone())
        });
        Ok(UploadRequest {
            bytes,
            file_name,
            documentable_type,
            documentable_id,
            name,
            folder_id: arg_str(args, "folderId"),
            path: folder_path(args),
        })
    }

    pub async fn upload(&self, args: &Value) -> Result<String, ToolError> {
        let upload = self.prepare(args).await?;
        self.logger.debug(
            "Prepared upload",
            Some(&json!({ "file_name": upload.file_name, "bytes": upload.bytes.len() })),
        );
        let response = self.client.upload_file(upload).await.map_err(|err| {
            let mut err = ToolError::from(err);
            err.message = format!("Failed to upload file: {}", err.message);
            err
        })?;
        let file_url = response
            .pointer("/data/attributes/file_url")
            .and_then(|v| v.as_str())
            .unwrap_or("No direct file URL available");
        let details = serde_json::to_string_pretty(&response).unwrap_or_default();
        Ok(format!(
            "File uploaded successfully.\n\nFile URL: {}\n\nDetails:\n{}",
            file_url, details
        ))
    }
}

struct UploadFile(Arc<FileManager>);

#[async_trait]
impl ToolHandler for UploadFile {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        self.0.upload(&args).await
    }
}

pub fn register_file_tools(
    registry: &mut ToolRegistry,
    logger: &Logger,
    client: Arc<LawmaticsClient>,
) -> Result<(), ToolError> {
    let manager = Arc::new(FileManager::new(logger.clone(), client));
    registry.register(
        ToolDef::new(
            "upload_file",
            "Upload a file to Lawmatics",
            json!({
                "type": "object",
                "properties": {
                    "filePath": { "type": "string", "description": "The local path to the file to upload" },
                    "documentableType": {
                        "type": "string",
                        "enum": ["firm", "client", "matter", "contact"],
                        "default": "firm",
                        "description": "The type of entity to attach the file to (defaults to \"firm\" if not specified)"
                    },
                    "documentableId": { "type": "string", "description": "The ID of the entity to attach the file to (not required for firm)" },
                    "name": { "type": "string", "description": "Optional custom name for the file" },
                    "folderId": { "type": "string", "description": "Optional folder ID to place the file in" },
                    "folderPath": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Optional path array (e.g. [\"Root\", \"Folder 1\"]) - will create folders if needed. Overrides folderId."
                    }
                },
                "required": ["filePath"]
            }),
        ),
        Arc::new(UploadFile(manager)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn manager() -> FileManager {
        let client = LawmaticsClient::new(
            Logger::new("test"),
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            "token",
            Duration::from_secs(60),
        );
        FileManager::new(Logger::new("test"), Arc::new(client))
    }

    fn temp_file(name: &str, body: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", uuid::Uuid::new_v4(), name));
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn missing_file_is_rejected() {
        let err = manager()
            .prepare(&json!({ "filePath": "/definitely/not/here.pdf" }))
            .await
            .unwrap_err();
        assert_eq!(err.message, "File not found at path: /definitely/not/here.pdf");
    }

    #[tokio::test]
    async fn non_firm_upload_needs_an_id() {
        let path = temp_file("a.txt", b"hello");
        let err = manager()
            .prepare(&json!({ "filePath": path, "documentableType": "matter" }))
            .await
            .unwrap_err();
        assert_eq!(err.message, "documentableId is required when documentableType is matter");
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn firm_upload_uses_file_name_and_folder_path() {
        let path = temp_file("brief.txt", b"hello");
        let upload = manager()
            .prepare(&json!({ "filePath": path, "folderPath": ["Root", "Briefs"] }))
            .await
            .unwrap();
        assert_eq!(upload.bytes, b"hello");
        assert!(upload.file_name.ends_with("brief.txt"));
        assert_eq!(upload.documentable_type, DocumentableType::Firm);
        assert_eq!(upload.path, Some(vec!["Root".to_string(), "Briefs".to_string()]));
        let _ = std::fs::remove_file(path);
    }
}
