use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{arg_u32, format_date, format_timestamp, require_str};
use crate::errors::ToolError;
use crate::mcp::catalog::{ToolDef, ToolRegistry};
use crate::services::lawmatics::models::{PageMeta, PracticeArea};
use crate::services::lawmatics::LawmaticsClient;
use crate::services::tool_executor::ToolHandler;

const DEFAULT_PER_PAGE: u32 = 25;

/// Page header plus one block per area.
pub fn format_practice_area_page(
    areas: &[PracticeArea],
    meta: Option<&PageMeta>,
    page: u32,
    per_page: u32,
) -> String {
    if areas.is_empty() {
        return "No practice areas found.".to_string();
    }
    let total = meta
        .and_then(|m| m.total_entries)
        .filter(|t| *t > 0)
        .unwrap_or(areas.len() as u64);
    let total_pages = meta
        .and_then(|m| m.total_pages)
        .filter(|t| *t > 0)
        .unwrap_or_else(|| total.div_ceil(u64::from(per_page.max(1))));
    let blocks: Vec<String> = areas
        .iter()
        .map(|area| {
            format!(
                "{} (ID: {})\n  • Color: {}\n  • Created: {}\n  • Updated: {}",
                area.attr_text("name").unwrap_or_default(),
                area.id,
                area.attr_text("color").unwrap_or_default(),
                format_date(area.attr_text("created_at").as_deref()),
                format_date(area.attr_text("updated_at").as_deref()),
            )
        })
        .collect();
    format!(
        "Practice Areas (Page {} of {}, Showing {} of {} total):\n\n{}",
        page,
        total_pages,
        areas.len(),
        total,
        blocks.join("\n\n")
    )
}

struct ListPracticeAreas(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for ListPracticeAreas {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let page = arg_u32(&args, "page").unwrap_or(1);
        let per_page = arg_u32(&args, "perPage").unwrap_or(DEFAULT_PER_PAGE);
        let response = self.0.get_practice_areas(page, per_page).await?;
        Ok(format_practice_area_page(
            &response.data,
            response.meta.as_ref(),
            page,
            per_page,
        ))
    }
}

struct GetPracticeArea(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for GetPracticeArea {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let id = require_str(&args, "practiceAreaId")?;
        let area = self.0.get_practice_area(&id).await?.data;
        Ok(format!(
            "Practice Area: {} (ID: {})\n• Color: {}\n• Created: {}\n• Updated: {}",
            area.attr_text("name").unwrap_or_default(),
            if area.id.is_empty() { id.as_str() } else { area.id.as_str() },
            area.attr_text("color").unwrap_or_default(),
            format_timestamp(area.attr_text("created_at").as_deref()),
            format_timestamp(area.attr_text("updated_at").as_deref()),
        ))
    }
}

pub fn register_practice_area_tools(
    registry: &mut ToolRegistry,
    client: Arc<LawmaticsClient>,
) -> Result<(), ToolError> {
    registry.register(
        ToolDef::new(
            "list_practice_areas",
            "List all practice areas with pagination support",
            json!({
                "type": "object",
                "properties": {
                    "page": { "type": "integer", "minimum": 1, "default": 1, "description": "Page number (1-based)" },
                    "perPage": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 100,
                        "default": DEFAULT_PER_PAGE,
                        "description": "Number of items per page (max 100)"
                    }
                }
            }),
        ),
        Arc::new(ListPracticeAreas(client.clone())),
    )?;
    registry.register(
        ToolDef::new(
            "get_practice_area",
            "Get a specific practice area by ID",
            json!({
                "type": "object",
                "properties": {
                    "practiceAreaId": { "type": "string", "description": "The ID of the practice area to retrieve" }
                },
                "required": ["practiceAreaId"]
            }),
        ),
        Arc::new(GetPracticeArea(client)),
    )
}
