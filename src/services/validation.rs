use jsonschema::error::ValidationErrorKind;
use jsonschema::JSONSchema;
use serde_json::{Map, Value};

use crate::errors::ToolError;

const MAX_REPORTED_ERRORS: usize = 10;

/// Compiled input schema for one tool.
pub struct SchemaValidator {
    tool: String,
    schema: Value,
    compiled: JSONSchema,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("tool", &self.tool)
            .finish()
    }
}

impl SchemaValidator {
    pub fn compile(tool: &str, schema: &Value) -> Result<Self, ToolError> {
        let compiled = JSONSchema::compile(schema).map_err(|err| {
            ToolError::config(format!("Invalid input schema for tool '{}': {}", tool, err))
        })?;
        Ok(Self {
            tool: tool.to_string(),
            schema: schema.clone(),
            compiled,
        })
    }

    /// Validates `args` and returns the normalised object handlers receive.
    pub fn validate(&self, args: &Value) -> Result<Value, ToolError> {
        let args = if args.is_null() {
            Value::Object(Map::new())
        } else {
            args.clone()
        };

        if let Err(errors) = self.compiled.validate(&args) {
            let rendered: Vec<String> = errors
                .take(MAX_REPORTED_ERRORS)
                .map(|err| {
                    let path = match &err.kind {
                        ValidationErrorKind::Required { property } => property
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| property.to_string()),
                        _ => pointer_to_path(&err.instance_path.to_string()),
                    };
                    let keyword = schema_keyword(&err.schema_path.to_string());
                    format!("{} ({}): {}", path, keyword, err)
                })
                .collect();
            return Err(ToolError::invalid_params(format!(
                "Invalid arguments for tool '{}': {}",
                self.tool,
                rendered.join(", ")
            )));
        }

        Ok(self.normalize(args))
    }

    /// Fills top-level defaults and drops undeclared keys.
    fn normalize(&self, args: Value) -> Value {
        let Value::Object(mut map) = args else {
            return args;
        };
        let properties = self
            .schema
            .get("properties")
            .and_then(|v| v.as_object());
        let keep_unknown = matches!(
            self.schema.get("additionalProperties"),
            Some(Value::Bool(true)) | Some(Value::Object(_))
        );

        if let Some(properties) = properties {
            if !keep_unknown {
                map.retain(|key, _| properties.contains_key(key));
            }
            for (key, definition) in properties {
                if map.contains_key(key) {
                    continue;
                }
                if let Some(default) = definition.get("default") {
                    map.insert(key.clone(), default.clone());
                }
            }
        }
        Value::Object(map)
    }
}

fn pointer_to_path(pointer: &str) -> String {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        "(root)".to_string()
    } else {
        trimmed.replace('/', ".")
    }
}

fn schema_keyword(schema_path: &str) -> String {
    schema_path
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("schema")
        .to_string()
}
