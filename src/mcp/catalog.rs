use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::errors::ToolError;
use crate::managers::endpoint::EndpointDefinition;
use crate::services::security::SecurityScheme;
use crate::services::tool_executor::ToolHandler;
use crate::services::validation::SchemaValidator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDef {
    pub fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

pub struct RegisteredTool {
    pub def: ToolDef,
    pub validator: SchemaValidator,
    pub handler: Arc<dyn ToolHandler>,
}

/// Name → definition, compiled schema and handler.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: ToolDef, handler: Arc<dyn ToolHandler>) -> Result<(), ToolError> {
        if self.tools.contains_key(&def.name) {
            return Err(ToolError::config(format!(
                "Tool '{}' is registered twice",
                def.name
            ))
            .with_hint("Every tool name must be unique across all tool families."));
        }
        let validator = SchemaValidator::compile(&def.name, &def.input_schema)?;
        self.tools.insert(
            def.name.clone(),
            RegisteredTool {
                def,
                validator,
                handler,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Definitions sorted by name.
    pub fn list(&self) -> Vec<ToolDef> {
        let mut defs: Vec<ToolDef> = self.tools.values().map(|t| t.def.clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Declarative endpoint tools plus the security schemes they reference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointCatalog {
    #[serde(rename = "securitySchemes", default)]
    pub security_schemes: BTreeMap<String, SecurityScheme>,
    #[serde(default)]
    pub tools: Vec<EndpointDefinition>,
}

impl EndpointCatalog {
    pub fn from_json(raw: &str) -> Result<Self, ToolError> {
        serde_json::from_str(raw)
            .map_err(|err| ToolError::config(format!("Invalid endpoint catalog: {}", err)))
    }
}

static ENDPOINT_CATALOG: Lazy<EndpointCatalog> = Lazy::new(|| {
    let raw = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tool_catalog.json"));
    serde_json::from_str(raw).expect("tool_catalog.json must be a valid endpoint catalog")
});

pub fn endpoint_catalog() -> &'static EndpointCatalog {
    &ENDPOINT_CATALOG
}
