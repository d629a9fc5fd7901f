pub mod contacts;
pub mod documents;
pub mod endpoint;
pub mod files;
pub mod practice_areas;
mod prospect_format;
pub mod prospects;
pub mod stages;
pub mod tasks;

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};

use crate::errors::ToolError;

pub use prospect_format::{format_prospect_details, format_prospect_list, StageLabel};

pub(crate) fn arg_str(args: &Value, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn require_str(args: &Value, key: &str) -> Result<String, ToolError> {
    arg_str(args, key)
        .ok_or_else(|| ToolError::invalid_params(format!("{} must be a non-empty string", key)))
}

pub(crate) fn arg_u32(args: &Value, key: &str) -> Option<u32> {
    args.get(key)
        .and_then(|v| v.as_u64())
        .and_then(|n| u32::try_from(n).ok())
}

/// Copies `camelCase` tool arguments into a `snake_case` attribute object,
/// skipping absent and empty values.
pub(crate) fn attributes_from(args: &Value, mapping: &[(&str, &str)]) -> Value {
    let mut out = Map::new();
    for (arg, attribute) in mapping {
        if let Some(value) = args.get(*arg) {
            let empty = value.is_null() || value.as_str().map(str::is_empty).unwrap_or(false);
            if !empty {
                out.insert(attribute.to_string(), value.clone());
            }
        }
    }
    Value::Object(out)
}

/// `2024-03-01T10:00:00Z` → `2024-03-01 10:00:00 UTC`; unparseable input is echoed.
pub(crate) fn format_timestamp(raw: Option<&str>) -> String {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return "[Not set]".to_string();
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed
            .with_timezone(&chrono::Utc)
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string();
    }
    raw.to_string()
}

pub(crate) fn format_date(raw: Option<&str>) -> String {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return "[Not set]".to_string();
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.format("%Y-%m-%d").to_string();
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return parsed.format("%Y-%m-%d").to_string();
    }
    raw.to_string()
}
