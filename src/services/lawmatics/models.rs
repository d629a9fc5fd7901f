use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A JSON:API style record as returned by Lawmatics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, deserialize_with = "object_or_empty")]
    pub attributes: Map<String, Value>,
    #[serde(default, deserialize_with = "object_or_empty")]
    pub relationships: Map<String, Value>,
}

pub type Prospect = Resource;
pub type Stage = Resource;
pub type PracticeArea = Resource;
pub type Task = Resource;
pub type Document = Resource;
pub type Contact = Resource;
pub type Company = Resource;
pub type TimelineActivity = Resource;

impl Resource {
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|v| !v.is_null())
    }

    /// Attribute rendered as text; empty strings count as absent.
    pub fn attr_text(&self, key: &str) -> Option<String> {
        match self.attr(key)? {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Bool(false) => None,
            other => Some(other.to_string()),
        }
    }

    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        match self.attr(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// `relationships.<name>.data` when it is a single `{id, type}` reference.
    pub fn relation_one(&self, name: &str) -> Option<RelationRef> {
        let data = self.relationships.get(name)?.get("data")?;
        if data.is_object() {
            serde_json::from_value(data.clone()).ok()
        } else {
            None
        }
    }

    pub fn relation_many(&self, name: &str) -> Vec<RelationRef> {
        self.relationships
            .get(name)
            .and_then(|rel| rel.get("data"))
            .and_then(|data| data.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelationRef {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_entries: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_per_page: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Links {
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            meta: None,
            links: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub page: u32,
    pub limit: Option<u32>,
    pub max_pages: u32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            page: 1,
            limit: None,
            max_pages: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_entries: u64,
    pub has_more: bool,
    pub too_many_results: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProspectSearch {
    pub prospects: Vec<Prospect>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub matter_id: Option<String>,
    pub prospect_id: Option<String>,
    pub contact_id: Option<String>,
    pub company_id: Option<String>,
    pub client_id: Option<String>,
    pub user_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentableType {
    Firm,
    Client,
    Matter,
    Contact,
}

impl DocumentableType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentableType::Firm => "firm",
            DocumentableType::Client => "client",
            DocumentableType::Matter => "matter",
            DocumentableType::Contact => "contact",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub documentable_type: DocumentableType,
    pub documentable_id: Option<String>,
    pub name: Option<String>,
    pub folder_id: Option<String>,
    pub path: Option<Vec<String>>,
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

fn object_or_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}
