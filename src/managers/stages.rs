use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{format_timestamp, require_str};
use crate::errors::ToolError;
use crate::mcp::catalog::{ToolDef, ToolRegistry};
use crate::services::lawmatics::models::Stage;
use crate::services::lawmatics::LawmaticsClient;
use crate::services::tool_executor::ToolHandler;

fn format_stage(stage_id: &str, stage: &Stage) -> String {
    let text = |key: &str| stage.attr_text(key).unwrap_or_default();
    format!(
        "Stage: {}\n    Name: {}\n    Created: {}\n    Updated: {}\n    Color: {}\n    Order: {}",
        stage_id,
        text("name"),
        format_timestamp(stage.attr_text("created_at").as_deref()),
        format_timestamp(stage.attr_text("updated_at").as_deref()),
        text("color"),
        text("order"),
    )
}

struct GetStage(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for GetStage {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let stage_id = require_str(&args, "stageId")?;
        let response = self.0.get_stage(&stage_id).await?;
        Ok(format_stage(&stage_id, &response.data))
    }
}

struct ListStages(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for ListStages {
    async fn handle(&self, _args: Value) -> Result<String, ToolError> {
        let response = self.0.get_stages().await?;
        if response.data.is_empty() {
            return Ok("No stages found.".to_string());
        }
        let mut stages = response.data;
        stages.sort_by(|a, b| {
            let order = |s: &Stage| s.attr_f64("order").unwrap_or(f64::MAX);
            order(a).total_cmp(&order(b))
        });
        let lines: Vec<String> = stages
            .iter()
            .map(|stage| {
                format!(
                    "- {}: {} (#{})",
                    stage.id,
                    stage.attr_text("name").unwrap_or_default(),
                    stage.attr_text("color").unwrap_or_default()
                )
            })
            .collect();
        Ok(format!("Stages ({}):\n{}", lines.len(), lines.join("\n")))
    }
}

pub fn register_stage_tools(
    registry: &mut ToolRegistry,
    client: Arc<LawmaticsClient>,
) -> Result<(), ToolError> {
    registry.register(
        ToolDef::new(
            "get_stage",
            "Get a pipeline stage by ID",
            json!({
                "type": "object",
                "properties": { "stageId": { "type": "string", "description": "The ID of the stage to get" } },
                "required": ["stageId"]
            }),
        ),
        Arc::new(GetStage(client.clone())),
    )?;
    registry.register(
        ToolDef::new(
            "list_stages",
            "List every pipeline stage, ordered by position",
            json!({ "type": "object", "properties": {} }),
        ),
        Arc::new(ListStages(client)),
    )
}
