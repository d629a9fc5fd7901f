use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{
    arg_str, arg_u32, attributes_from, format_prospect_details, format_prospect_list,
    format_timestamp, require_str, StageLabel,
};
use crate::errors::ToolError;
use crate::mcp::catalog::{ToolDef, ToolRegistry};
use crate::services::lawmatics::models::{Prospect, SearchOptions, TimelineActivity};
use crate::services::lawmatics::LawmaticsClient;
use crate::services::logger::Logger;
use crate::services::tool_executor::ToolHandler;

const PROSPECT_ATTRIBUTES: &[(&str, &str)] = &[
    ("firstName", "first_name"),
    ("lastName", "last_name"),
    ("email", "email"),
    ("phone", "phone"),
    ("notes", "notes"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProspectOp {
    Get,
    List,
    Create,
    Update,
    Delete,
    Search,
    FindByName,
    FindByEmail,
    FindByPhone,
    FindByCaseTitle,
    Timeline,
    TimelineActivity,
}

pub struct ProspectManager {
    logger: Logger,
    client: Arc<LawmaticsClient>,
}

impl ProspectManager {
    pub fn new(logger: Logger, client: Arc<LawmaticsClient>) -> Self {
        Self {
            logger: logger.child("prospects"),
            client,
        }
    }

    async fn stage_label(&self, prospect: &Prospect) -> StageLabel {
        let Some(stage) = prospect.relation_one("stage") else {
            return StageLabel::None;
        };
        match self.client.get_stage(&stage.id).await {
            Ok(response) => match response.data.attr_text("name") {
                Some(name) => StageLabel::Named {
                    name,
                    color: response.data.attr_text("color").unwrap_or_default(),
                },
                None => StageLabel::None,
            },
            Err(err) => {
                self.logger.warn(
                    "Stage lookup failed",
                    Some(&json!({ "stage_id": stage.id, "error": err.to_string() })),
                );
                StageLabel::Unavailable { id: stage.id }
            }
        }
    }

    pub async fn get(&self, args: &Value) -> Result<String, ToolError> {
        let prospect_id = require_str(args, "prospectId")?;
        let fields = arg_str(args, "fields");
        let response = self
            .client
            .get_prospect(&prospect_id, fields.as_deref())
            .await?;
        let stage = self.stage_label(&response.data).await;
        let mut prospect = response.data;
        if prospect.id.is_empty() {
            prospect.id = prospect_id;
        }
        Ok(format_prospect_details(&prospect, &stage))
    }

    pub async fn list(&self, args: &Value) -> Result<String, ToolError> {
        let fields = arg_str(args, "fields").unwrap_or_else(|| "all".to_string());
        let response = self.client.get_prospects(Some(&fields)).await?;
        let prospects = response.data;
        if prospects.is_empty() {
            return Ok("No matters / prospects found.".to_string());
        }
        let total = response.meta.and_then(|m| m.total).unwrap_or(0);
        let of_total = if total > prospects.len() as u64 {
            format!(" of {} total", total)
        } else {
            String::new()
        };
        Ok(format!(
            "Result ({} matters / prospects found{}):\n{}",
            prospects.len(),
            of_total,
            format_prospect_list(&prospects)
        ))
    }

    pub async fn create(&self, args: &Value) -> Result<String, ToolError> {
        let attributes = attributes_from(args, PROSPECT_ATTRIBUTES);
        let response = self.client.create_prospect(&attributes).await?;
        Ok(format!(
            "Matter / Prospect created with ID: {}.",
            response.data.id
        ))
    }

    pub async fn update(&self, args: &Value) -> Result<String, ToolError> {
        let prospect_id = require_str(args, "prospectId")?;
        let attributes = attributes_from(args, PROSPECT_ATTRIBUTES);
        if attributes.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return Err(ToolError::invalid_params(
                "update_prospect needs at least one field to change",
            )
            .with_hint("Pass any of firstName, lastName, email, phone, notes."));
        }
        self.client
            .update_prospect(&prospect_id, &attributes)
            .await?;
        Ok(format!(
            "Matter / Prospect with ID {} updated successfully.",
            prospect_id
        ))
    }

    pub async fn delete(&self, args: &Value) -> Result<String, ToolError> {
        let prospect_id = require_str(args, "prospectId")?;
        self.client.delete_prospect(&prospect_id).await?;
        Ok(format!(
            "Matter / Prospect with ID {} deleted successfully.",
            prospect_id
        ))
    }

    pub async fn search(&self, args: &Value) -> Result<String, ToolError> {
        let query = require_str(args, "query")?;
        let defaults = SearchOptions::default();
        let options = SearchOptions {
            page: arg_u32(args, "page").unwrap_or(defaults.page),
            limit: arg_u32(args, "limit"),
            max_pages: arg_u32(args, "maxPages").unwrap_or(defaults.max_pages),
        };
        let result = self.client.search_prospects(&query, options).await?;
        if result.prospects.is_empty() {
            return Ok("Result: No matters / prospects found.".to_string());
        }
        let pagination = &result.pagination;
        let mut text = format!(
            "Result ({} matters / prospects found matching \"{}\", page {} of {}, {} total entries):\n{}",
            result.prospects.len(),
            query,
            pagination.current_page,
            pagination.total_pages,
            pagination.total_entries,
            format_prospect_list(&result.prospects)
        );
        if pagination.too_many_results {
            text.push_str(&format!(
                "\n\nNote: Too many results. Stopped after {} page request(s); more pages remain. \
                 Refine the query or continue with page {}.",
                options.max_pages,
                pagination.current_page + 1
            ));
        } else if pagination.has_more {
            text.push_str(&format!(
                "\n\nNote: More pages remain. Continue with page {}.",
                pagination.current_page + 1
            ));
        }
        Ok(text)
    }

    async fn find_one(&self, field: &str, label: &str, value: String) -> Result<String, ToolError> {
        let lookup = match field {
            "name" => self.client.find_prospect_by_name(&value).await,
            "email" => self.client.find_prospect_by_email(&value).await,
            _ => self.client.find_prospect_by_phone(&value).await,
        };
        let prospect = match lookup {
            Ok(response) => response.data,
            Err(err) if err.status() == Some(404) => {
                return Ok(format!(
                    "No matter / prospect found matching the {}: \"{}\".",
                    label, value
                ))
            }
            Err(err) => {
                let mut err = ToolError::from(err);
                err.message = format!(
                    "Failed to find matter / prospect by {}: \"{}\". {}",
                    field, value, err.message
                );
                return Err(err);
            }
        };
        if prospect.id.is_empty() {
            return Ok(format!(
                "No matter / prospect found matching the {}: \"{}\".",
                label, value
            ));
        }
        let notes = prospect
            .attr_text("notes")
            .map(|n| format!("Notes:\n{}", n))
            .unwrap_or_else(|| "[No notes]".to_string());
        Ok(format!(
            "Matter / Prospect found matching {} \"{}\":\n\nID: {}\nName: {} {}\nEmail: {}\nPhone: {}\nCreated: {}\nUpdated: {}\n\n{}",
            label,
            value,
            prospect.id,
            prospect.attr_text("first_name").unwrap_or_default(),
            prospect.attr_text("last_name").unwrap_or_default(),
            prospect.attr_text("email").unwrap_or_else(|| "[Not set]".to_string()),
            prospect.attr_text("phone").unwrap_or_else(|| "[Not set]".to_string()),
            format_timestamp(prospect.attr_text("created_at").as_deref()),
            format_timestamp(prospect.attr_text("updated_at").as_deref()),
            notes
        ))
    }

    pub async fn find_by_case_title(&self, args: &Value) -> Result<String, ToolError> {
        let case_title = require_str(args, "caseTitle")?;
        let response = self.client.find_prospects_by_case_title(&case_title).await?;
        if response.data.is_empty() {
            return Ok(format!(
                "No matters / prospects found with case title matching \"{}\".",
                case_title
            ));
        }
        Ok(format!(
            "Result ({} matters / prospects found with case title matching \"{}\"):\n{}",
            response.data.len(),
            case_title,
            format_prospect_list(&response.data)
        ))
    }

    pub async fn timeline(&self, args: &Value) -> Result<String, ToolError> {
        let prospect_id = require_str(args, "prospectId")?;
        let response = self.client.get_timeline_activities(&prospect_id).await?;
        if response.data.is_empty() {
            return Ok(format!(
                "No timeline activity found for matter / prospect {}.",
                prospect_id
            ));
        }
        let lines: Vec<String> = response.data.iter().map(activity_line).collect();
        Ok(format!(
            "Timeline for matter / prospect {} ({} activities):\n{}",
            prospect_id,
            lines.len(),
            lines.join("\n")
        ))
    }

    pub async fn timeline_activity(&self, args: &Value) -> Result<String, ToolError> {
        let activity_id = require_str(args, "activityId")?;
        let activity = self.client.get_timeline_activity(&activity_id).await?.data;
        let mut text = activity_line(&activity);
        if let Some(matter) = activity
            .relation_one("matter")
            .or_else(|| activity.relation_one("prospect"))
        {
            text.push_str(&format!("\nMatter / prospect: {}", matter.id));
        }
        Ok(text)
    }
}

fn activity_line(activity: &TimelineActivity) -> String {
    let title = ["name", "title", "activity_type"]
        .iter()
        .find_map(|key| activity.attr_text(key))
        .unwrap_or_else(|| activity.kind.clone());
    let description = activity
        .attr_text("description")
        .or_else(|| activity.attr_text("body"))
        .map(|d| format!(": {}", d))
        .unwrap_or_default();
    format!(
        "- [{}] {}{} (ID: {})",
        format_timestamp(activity.attr_text("created_at").as_deref()),
        title,
        description,
        activity.id
    )
}

struct ProspectTool {
    manager: Arc<ProspectManager>,
    op: ProspectOp,
}

#[async_trait]
impl ToolHandler for ProspectTool {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let m = &self.manager;
        match self.op {
            ProspectOp::Get => m.get(&args).await,
            ProspectOp::List => m.list(&args).await,
            ProspectOp::Create => m.create(&args).await,
            ProspectOp::Update => m.update(&args).await,
            ProspectOp::Delete => m.delete(&args).await,
            ProspectOp::Search => m.search(&args).await,
            ProspectOp::FindByName => m.find_one("name", "name", require_str(&args, "name")?).await,
            ProspectOp::FindByEmail => {
                m.find_one("email", "email address", require_str(&args, "email")?)
                    .await
            }
            ProspectOp::FindByPhone => {
                m.find_one("phone", "phone number", require_str(&args, "phone")?)
                    .await
            }
            ProspectOp::FindByCaseTitle => m.find_by_case_title(&args).await,
            ProspectOp::Timeline => m.timeline(&args).await,
            ProspectOp::TimelineActivity => m.timeline_activity(&args).await,
        }
    }
}

fn id_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": { "prospectId": { "type": "string", "description": description } },
        "required": ["prospectId"]
    })
}

fn string_lookup_schema(field: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": { field: { "type": "string", "description": description } },
        "required": [field]
    })
}

fn tool_defs() -> Vec<(ToolDef, ProspectOp)> {
    let person = json!({
        "firstName": { "type": "string", "description": "First name of the prospect" },
        "lastName": { "type": "string", "description": "Last name of the prospect" },
        "email": { "type": "string", "description": "Email address of the prospect" },
        "phone": { "type": "string", "description": "Phone number of the prospect" },
        "notes": { "type": "string", "description": "Additional notes about the prospect" }
    });
    let mut update_props = person.clone();
    if let Some(props) = update_props.as_object_mut() {
        props.insert(
            "prospectId".to_string(),
            json!({ "type": "string", "description": "The ID of the matter / prospect to update" }),
        );
    }

    vec![
        (
            ToolDef::new(
                "get_prospect",
                "Get a Lawmatics matter / prospect by ID",
                json!({
                    "type": "object",
                    "properties": {
                        "prospectId": { "type": "string", "description": "The ID of the matter / prospect to get" },
                        "fields": {
                            "type": "string",
                            "description": "Comma-separated list of fields to include or 'all' for all fields, defaults to 'all' if not provided"
                        }
                    },
                    "required": ["prospectId"]
                }),
            ),
            ProspectOp::Get,
        ),
        (
            ToolDef::new(
                "list_prospects_with_optional_filtering",
                "List Lawmatics matters / prospects with optional filtering",
                json!({
                    "type": "object",
                    "properties": {
                        "fields": {
                            "type": "string",
                            "description": "Comma-separated list of fields to include or 'all' for all fields"
                        }
                    }
                }),
            ),
            ProspectOp::List,
        ),
        (
            ToolDef::new(
                "create_prospect",
                "Create a new Lawmatics matter / prospect",
                json!({
                    "type": "object",
                    "properties": person,
                    "required": ["firstName", "lastName", "email"]
                }),
            ),
            ProspectOp::Create,
        ),
        (
            ToolDef::new(
                "update_prospect",
                "Update an existing Lawmatics matter / prospect",
                json!({
                    "type": "object",
                    "properties": update_props,
                    "required": ["prospectId"]
                }),
            ),
            ProspectOp::Update,
        ),
        (
            ToolDef::new(
                "delete_prospect",
                "Delete a Lawmatics matter / prospect",
                id_schema("The ID of the matter / prospect to delete"),
            ),
            ProspectOp::Delete,
        ),
        (
            ToolDef::new(
                "search_prospects",
                "Search for Lawmatics matters / prospects. Fetches at most maxPages pages per call",
                json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Search query to find matching prospects" },
                        "page": { "type": "integer", "minimum": 1, "default": 1, "description": "First page to fetch (1-based)" },
                        "limit": { "type": "integer", "minimum": 1, "maximum": 100, "description": "Results per page" },
                        "maxPages": { "type": "integer", "minimum": 1, "maximum": 20, "default": 5, "description": "Upper bound on page requests" }
                    },
                    "required": ["query"]
                }),
            ),
            ProspectOp::Search,
        ),
        (
            ToolDef::new(
                "find_prospect_by_name",
                "Find a Lawmatics matter / prospect by name (fuzzy search)",
                string_lookup_schema("name", "Name to search for (first name, last name, or both)"),
            ),
            ProspectOp::FindByName,
        ),
        (
            ToolDef::new(
                "find_prospect_by_email",
                "Find a Lawmatics matter / prospect by email address",
                string_lookup_schema("email", "Email address to search for"),
            ),
            ProspectOp::FindByEmail,
        ),
        (
            ToolDef::new(
                "find_prospect_by_phone",
                "Find a Lawmatics matter / prospect by phone number (fuzzy search)",
                string_lookup_schema("phone", "Phone number to search for"),
            ),
            ProspectOp::FindByPhone,
        ),
        (
            ToolDef::new(
                "find_prospects_by_case_title",
                "Find Lawmatics matters / prospects whose case title contains the given text",
                string_lookup_schema("caseTitle", "Case title text to match (case-insensitive)"),
            ),
            ProspectOp::FindByCaseTitle,
        ),
        (
            ToolDef::new(
                "get_prospect_timeline",
                "List timeline activities recorded for a Lawmatics matter / prospect",
                id_schema("The ID of the matter / prospect"),
            ),
            ProspectOp::Timeline,
        ),
        (
            ToolDef::new(
                "get_timeline_activity",
                "Get a single timeline activity by ID",
                string_lookup_schema("activityId", "The ID of the timeline activity"),
            ),
            ProspectOp::TimelineActivity,
        ),
    ]
}

pub fn register_prospect_tools(
    registry: &mut ToolRegistry,
    logger: &Logger,
    client: Arc<LawmaticsClient>,
) -> Result<(), ToolError> {
    let manager = Arc::new(ProspectManager::new(logger.clone(), client));
    for (def, op) in tool_defs() {
        registry.register(
            def,
            Arc::new(ProspectTool {
                manager: manager.clone(),
                op,
            }),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_definition_compiles_and_names_are_distinct() {
        let mut registry = ToolRegistry::new();
        let client = Arc::new(LawmaticsClient::new(
            Logger::new("test"),
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            "token",
            std::time::Duration::from_secs(60),
        ));
        register_prospect_tools(&mut registry, &Logger::new("test"), client).unwrap();
        assert_eq!(registry.len(), 12);
        assert!(registry.contains("find_prospects_by_case_title"));
    }

    #[test]
    fn search_defaults_are_filled_by_the_schema() {
        let defs = tool_defs();
        let (search, _) = defs
            .iter()
            .find(|(def, _)| def.name == "search_prospects")
            .unwrap();
        assert_eq!(search.input_schema["properties"]["maxPages"]["default"], 5);
        assert_eq!(search.input_schema["properties"]["page"]["default"], 1);
    }
}
