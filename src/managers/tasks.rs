use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{arg_str, arg_u32, attributes_from, format_timestamp, require_str};
use crate::errors::ToolError;
use crate::mcp::catalog::{ToolDef, ToolRegistry};
use crate::services::lawmatics::models::{PageMeta, Task, TaskFilter};
use crate::services::lawmatics::LawmaticsClient;
use crate::services::tool_executor::ToolHandler;

const DEFAULT_LIMIT: u32 = 25;
const FILTER_KEYS: &[&str] = &[
    "matter_id",
    "prospect_id",
    "contact_id",
    "company_id",
    "client_id",
    "user_id",
];

fn task_tags(task: &Task) -> String {
    let tags: Vec<String> = task
        .attr("tags")
        .and_then(|v| v.as_array())
        .map(|tags| {
            tags.iter()
                .filter_map(|t| t.get("name").and_then(|n| n.as_str()))
                .map(|name| format!("#{}", name))
                .collect()
        })
        .unwrap_or_default();
    if tags.is_empty() {
        "No tags".to_string()
    } else {
        tags.join(", ")
    }
}

fn task_status(task: &Task) -> &'static str {
    if task.attr("done").and_then(|v| v.as_bool()).unwrap_or(false) {
        "✅ Done"
    } else {
        "⏳ Pending"
    }
}

fn task_due(task: &Task) -> String {
    match task.attr_text("due_date") {
        Some(due) => format_timestamp(Some(&due)),
        None => "No due date".to_string(),
    }
}

fn task_block(task: &Task) -> String {
    let priority = task
        .attr_text("priority")
        .map(|p| format!("({})", p))
        .unwrap_or_default();
    format!(
        "📝 {} {}\n  • Status: {}\n  • Due: {}\n  • ID: {}\n  • Tags: {}",
        task.attr_text("name").unwrap_or_default(),
        priority,
        task_status(task),
        task_due(task),
        task.id,
        task_tags(task)
    )
}

pub fn format_task_page(tasks: &[Task], meta: Option<&PageMeta>, page: u32, limit: u32) -> String {
    if tasks.is_empty() {
        return "No tasks found matching the criteria.".to_string();
    }
    let total = meta
        .and_then(|m| m.total_entries)
        .filter(|t| *t > 0)
        .unwrap_or(tasks.len() as u64);
    let server_pages = meta.and_then(|m| m.total_pages).filter(|t| *t > 0);
    let total_pages = server_pages.unwrap_or_else(|| total.div_ceil(u64::from(limit.max(1))));
    let blocks: Vec<String> = tasks.iter().map(task_block).collect();
    let mut text = format!(
        "Tasks (Page {} of {}, Showing {} of {} total):\n\n{}",
        page,
        total_pages,
        tasks.len(),
        total,
        blocks.join("\n\n")
    );
    if server_pages.map(|p| p > u64::from(page)).unwrap_or(false) {
        text.push_str(
            "\n\nNote: There are more tasks available. Use the 'page' parameter to see more.",
        );
    }
    text
}

struct ListTasks(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for ListTasks {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let page = arg_u32(&args, "page").unwrap_or(1);
        let limit = arg_u32(&args, "limit").unwrap_or(DEFAULT_LIMIT);
        let filter = TaskFilter {
            matter_id: arg_str(&args, "matter_id"),
            prospect_id: arg_str(&args, "prospect_id"),
            contact_id: arg_str(&args, "contact_id"),
            company_id: arg_str(&args, "company_id"),
            client_id: arg_str(&args, "client_id"),
            user_id: arg_str(&args, "user_id"),
            page: Some(page),
            limit: Some(limit),
        };
        let response = self.0.get_tasks(&filter).await?;
        Ok(format_task_page(&response.data, response.meta.as_ref(), page, limit))
    }
}

struct GetTask(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for GetTask {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let task_id = require_str(&args, "taskId")?;
        let task = self.0.get_task(&task_id).await?.data;
        let mut text = task_block(&task);
        if let Some(description) = task.attr_text("description") {
            text.push_str(&format!("\n  • Description: {}", description));
        }
        if let Some(created) = task.attr_text("created_at") {
            text.push_str(&format!("\n  • Created: {}", format_timestamp(Some(&created))));
        }
        Ok(text)
    }
}

const TASK_ATTRIBUTES: &[(&str, &str)] = &[
    ("name", "name"),
    ("description", "description"),
    ("dueDate", "due_date"),
    ("priority", "priority"),
    ("done", "done"),
    ("taskableType", "taskable_type"),
    ("taskableId", "taskable_id"),
    ("userIds", "user_ids"),
];

struct CreateTask(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for CreateTask {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let attributes = attributes_from(&args, TASK_ATTRIBUTES);
        let task = self.0.create_task(&attributes).await?.data;
        Ok(format!(
            "Task created with ID: {}.\n\n{}",
            task.id,
            task_block(&task)
        ))
    }
}

struct UpdateTask(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for UpdateTask {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let task_id = require_str(&args, "taskId")?;
        let attributes = attributes_from(&args, TASK_ATTRIBUTES);
        if attributes.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return Err(ToolError::invalid_params(
                "update_task needs at least one field to change",
            ));
        }
        let task = self.0.update_task(&task_id, &attributes).await?.data;
        Ok(format!("Task {} updated.\n\n{}", task_id, task_block(&task)))
    }
}

struct DeleteTask(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for DeleteTask {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let task_id = require_str(&args, "taskId")?;
        self.0.delete_task(&task_id).await?;
        Ok(format!("Task {} deleted.", task_id))
    }
}

fn task_properties() -> Value {
    json!({
        "name": { "type": "string", "description": "Task name" },
        "description": { "type": "string" },
        "dueDate": { "type": "string", "description": "Due date (ISO 8601 datetime)" },
        "priority": { "type": "string", "enum": ["high", "medium", "low"] },
        "done": { "type": "boolean" },
        "taskableType": { "type": "string", "description": "Record type the task belongs to (Prospect, Contact, Company, Client)" },
        "taskableId": { "type": "string", "description": "ID of the record the task belongs to" },
        "userIds": { "type": "array", "items": { "type": "integer" }, "description": "Firm users assigned to the task" }
    })
}

fn task_id_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "taskId": { "type": "string", "description": "The ID of the task" } },
        "required": ["taskId"]
    })
}

pub fn register_task_tools(
    registry: &mut ToolRegistry,
    client: Arc<LawmaticsClient>,
) -> Result<(), ToolError> {
    let mut filter_props = serde_json::Map::new();
    for key in FILTER_KEYS {
        let label = key.trim_end_matches("_id");
        filter_props.insert(
            key.to_string(),
            json!({ "type": "string", "description": format!("Filter by {} ID", label) }),
        );
    }
    filter_props.insert(
        "page".to_string(),
        json!({ "type": "integer", "minimum": 1, "default": 1, "description": "Page number (1-based)" }),
    );
    filter_props.insert(
        "limit".to_string(),
        json!({
            "type": "integer",
            "minimum": 1,
            "maximum": 100,
            "default": DEFAULT_LIMIT,
            "description": "Number of items per page (max 100)"
        }),
    );

    registry.register(
        ToolDef::new(
            "list_tasks",
            "List all tasks with optional filtering and pagination",
            json!({ "type": "object", "properties": filter_props }),
        ),
        Arc::new(ListTasks(client.clone())),
    )?;
    registry.register(
        ToolDef::new(
            "get_task",
            "Get a task by ID",
            task_id_schema(),
        ),
        Arc::new(GetTask(client.clone())),
    )?;
    registry.register(
        ToolDef::new(
            "create_task",
            "Create a task, optionally attached to a matter, contact, company or client",
            json!({ "type": "object", "properties": task_properties(), "required": ["name"] }),
        ),
        Arc::new(CreateTask(client.clone())),
    )?;
    let mut update_props = task_properties();
    if let Some(props) = update_props.as_object_mut() {
        props.insert(
            "taskId".to_string(),
            json!({ "type": "string", "description": "The ID of the task to update" }),
        );
    }
    registry.register(
        ToolDef::new(
            "update_task",
            "Update fields of an existing task",
            json!({ "type": "object", "properties": update_props, "required": ["taskId"] }),
        ),
        Arc::new(UpdateTask(client.clone())),
    )?;
    registry.register(
        ToolDef::new("delete_task", "Delete a task by ID", task_id_schema()),
        Arc::new(DeleteTask(client)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(done: bool) -> Task {
        serde_json::from_value(json!({
            "id": "t1",
            "type": "task",
            "attributes": {
                "name": "Call client",
                "done": done,
                "priority": "high",
                "due_date": "2024-02-01T09:00:00Z",
                "tags": [ { "name": "intake" }, { "name": "urgent" } ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn task_block_renders_status_and_tags() {
        let text = task_block(&task(true));
        assert_eq!(
            text,
            "📝 Call client (high)\n  • Status: ✅ Done\n  • Due: 2024-02-01 09:00:00 UTC\n  • ID: t1\n  • Tags: #intake, #urgent"
        );
        let pending: Task = serde_json::from_value(json!({ "id": "t2", "attributes": { "name": "x" } })).unwrap();
        let text = task_block(&pending);
        assert!(text.contains("⏳ Pending"));
        assert!(text.contains("No due date"));
        assert!(text.contains("No tags"));
    }

    #[test]
    fn more_pages_note_follows_server_page_count() {
        let meta = PageMeta {
            total_entries: Some(30),
            total_pages: Some(2),
            ..PageMeta::default()
        };
        let first = format_task_page(&[task(false)], Some(&meta), 1, 25);
        assert!(first.starts_with("Tasks (Page 1 of 2, Showing 1 of 30 total)"));
        assert!(first.ends_with("Use the 'page' parameter to see more."));
        let last = format_task_page(&[task(false)], Some(&meta), 2, 25);
        assert!(!last.contains("more tasks available"));
        assert_eq!(format_task_page(&[], None, 1, 25), "No tasks found matching the criteria.");
    }
}
