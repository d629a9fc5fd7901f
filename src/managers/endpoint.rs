use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::errors::{transport_code, ToolError};
use crate::mcp::catalog::{EndpointCatalog, ToolDef, ToolRegistry};
use crate::services::logger::Logger;
use crate::services::security::{RequestParts, SecurityRequirement, SecurityResolver};
use crate::services::tool_executor::ToolHandler;
use crate::utils::text::{encode_uri_component, truncate_chars};

const MAX_ERROR_BODY_CHARS: usize = 200;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[^{}]*\}").expect("placeholder regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutionParameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParamLocation,
}

/// How validated tool arguments become one HTTP request.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    pub method: String,
    #[serde(rename = "pathTemplate")]
    pub path_template: String,
    #[serde(rename = "executionParameters", default)]
    pub execution_parameters: Vec<ExecutionParameter>,
    #[serde(rename = "requestBodyContentType", default)]
    pub request_body_content_type: Option<String>,
    #[serde(rename = "securityRequirements", default)]
    pub security_requirements: Vec<SecurityRequirement>,
}

impl EndpointDefinition {
    pub fn tool_def(&self) -> ToolDef {
        ToolDef::new(&self.name, &self.description, self.input_schema.clone())
    }
}

/// Request after parameter binding, before authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundRequest {
    pub method: Method,
    pub url: String,
    pub parts: RequestParts,
    pub body: Option<Value>,
    pub content_type: Option<String>,
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitutes path, query and header parameters. Leftover `{placeholders}`
/// are a configuration error for the tool, not a caller mistake.
pub fn bind_request(
    def: &EndpointDefinition,
    base_url: &str,
    args: &Value,
) -> Result<BoundRequest, ToolError> {
    let method = Method::from_bytes(def.method.to_uppercase().as_bytes()).map_err(|_| {
        ToolError::config(format!(
            "Tool '{}' declares an invalid HTTP method '{}'",
            def.name, def.method
        ))
    })?;
    let empty = Map::new();
    let args_map = args.as_object().unwrap_or(&empty);

    let mut path = def.path_template.clone();
    let mut parts = RequestParts::default();
    parts
        .headers
        .insert("accept".to_string(), "application/json".to_string());

    for param in &def.execution_parameters {
        let Some(value) = args_map.get(&param.name).filter(|v| !v.is_null()) else {
            continue;
        };
        match param.location {
            ParamLocation::Path => {
                let placeholder = format!("{{{}}}", param.name);
                path = path.replace(&placeholder, &encode_uri_component(&scalar_text(value)));
            }
            ParamLocation::Query => match value {
                Value::Array(items) => {
                    for item in items.iter().filter(|v| !v.is_null()) {
                        parts.query.push((param.name.clone(), scalar_text(item)));
                    }
                }
                other => parts.query.push((param.name.clone(), scalar_text(other))),
            },
            ParamLocation::Header => {
                parts
                    .headers
                    .insert(param.name.to_lowercase(), scalar_text(value));
            }
        }
    }

    if PLACEHOLDER.is_match(&path) {
        return Err(ToolError::config(format!(
            "Failed to resolve path parameters: {}",
            path
        ))
        .with_details(serde_json::json!({ "tool": def.name, "template": def.path_template })));
    }

    let body = args_map
        .get("requestBody")
        .filter(|v| !v.is_null())
        .cloned();
    let content_type = body.as_ref().map(|_| {
        def.request_body_content_type
            .clone()
            .unwrap_or_else(|| "application/json".to_string())
    });
    if let Some(content_type) = &content_type {
        if !content_type.starts_with("multipart/") {
            parts
                .headers
                .insert("content-type".to_string(), content_type.clone());
        }
    }

    Ok(BoundRequest {
        method,
        url: format!("{}{}", base_url.trim_end_matches('/'), path),
        parts,
        body,
        content_type,
    })
}

fn encode_body(
    request: reqwest::RequestBuilder,
    body: &Value,
    content_type: &str,
) -> Result<reqwest::RequestBuilder, ToolError> {
    let ct = content_type.to_lowercase();
    if ct.starts_with("multipart/form-data") {
        let mut form = reqwest::multipart::Form::new();
        if let Some(fields) = body.as_object() {
            for (key, value) in fields {
                if value.is_null() {
                    continue;
                }
                form = form.text(key.clone(), scalar_text(value));
            }
        }
        // reqwest writes the content-type with its boundary.
        return Ok(request.multipart(form));
    }
    if ct.starts_with("application/x-www-form-urlencoded") {
        let pairs: Vec<(String, String)> = body
            .as_object()
            .map(|fields| {
                fields
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.clone(), scalar_text(v)))
                    .collect()
            })
            .unwrap_or_default();
        let encoded = serde_urlencoded::to_string(&pairs)
            .map_err(|err| ToolError::invalid_params(format!("Invalid form body: {}", err)))?;
        return Ok(request.body(encoded));
    }
    if ct.contains("json") {
        return Ok(request.body(body.to_string()));
    }
    Ok(request.body(scalar_text(body)))
}

/// Renders a successful response as `API Response (Status: N):\n<body>`.
pub fn format_response(status: u16, content_type: &str, body: &str) -> String {
    let rendered = if body.is_empty() {
        format!("(Status: {} - No body content)", status)
    } else if content_type.contains("application/json") {
        match serde_json::from_str::<Value>(body) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| body.to_string())
            }
            Ok(Value::String(text)) => text,
            Ok(other) => other.to_string(),
            Err(_) => body.to_string(),
        }
    } else {
        body.to_string()
    };
    format!("API Response (Status: {}):\n{}", status, rendered)
}

/// One-line diagnostic for a non-2xx response.
pub fn format_http_error(status: u16, status_text: &str, content_type: &str, body: &str) -> String {
    let status_text = if status_text.is_empty() {
        "Status text not available"
    } else {
        status_text
    };
    let mut message = format!("API Error: Status {} ({}). ", status, status_text);
    if body.is_empty() {
        message.push_str("No response body received.");
        return message;
    }
    let stringified = if content_type.contains("json") {
        serde_json::from_str::<Value>(body)
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .unwrap_or_else(|_| body.to_string())
    } else {
        body.to_string()
    };
    let (kept, truncated) = truncate_chars(&stringified, MAX_ERROR_BODY_CHARS);
    message.push_str(&format!(
        "Response: {}{}",
        kept,
        if truncated { "..." } else { "" }
    ));
    message
}

pub fn format_network_error(code: Option<&str>) -> String {
    let mut message = "API Network Error: No response received from server.".to_string();
    if let Some(code) = code {
        message.push_str(&format!(" (Code: {})", code));
    }
    message
}

/// Executes declarative endpoint tools: bind, authenticate, send, format.
#[derive(Clone)]
pub struct EndpointExecutor {
    logger: Logger,
    http: Client,
    base_url: String,
    security: SecurityResolver,
}

impl EndpointExecutor {
    pub fn new(
        logger: Logger,
        http: Client,
        base_url: impl Into<String>,
        security: SecurityResolver,
    ) -> Self {
        Self {
            logger: logger.child("endpoint"),
            http,
            base_url: base_url.into(),
            security,
        }
    }

    pub async fn execute(&self, def: &EndpointDefinition, args: &Value) -> Result<String, ToolError> {
        let mut bound = bind_request(def, &self.base_url, args).map_err(|err| {
            self.logger.error(
                &err.message,
                Some(&serde_json::json!({ "tool": def.name, "args": args })),
            );
            err
        })?;

        let outcome = self
            .security
            .apply(&def.security_requirements, &mut bound.parts)
            .await;
        self.logger.debug(
            "Sending endpoint request",
            Some(&serde_json::json!({
                "tool": def.name,
                "method": bound.method.as_str(),
                "url": bound.url,
                "security": format!("{:?}", outcome),
            })),
        );

        let mut request = self
            .http
            .request(bound.method.clone(), &bound.url)
            .query(&bound.parts.query);
        for (name, value) in &bound.parts.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let (Some(body), Some(content_type)) = (&bound.body, &bound.content_type) {
            request = encode_body(request, body, content_type)?;
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) if err.is_builder() => {
                return Err(ToolError::internal(format!(
                    "API request failed. API Request Setup Error: {}",
                    err
                )));
            }
            Err(err) => {
                let code = transport_code(&err);
                return Err(ToolError::transport(format_network_error(code.as_deref()))
                    .with_details(serde_json::json!({ "code": code })));
            }
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await.map_err(|err| {
            ToolError::transport(format_network_error(transport_code(&err).as_deref()))
        })?;

        if status.is_success() {
            Ok(format_response(status.as_u16(), &content_type, &body))
        } else {
            Err(ToolError::upstream(format_http_error(
                status.as_u16(),
                status.canonical_reason().unwrap_or(""),
                &content_type,
                &body,
            ))
            .with_details(serde_json::json!({ "status": status.as_u16() })))
        }
    }
}

struct EndpointTool {
    def: Arc<EndpointDefinition>,
    executor: EndpointExecutor,
}

#[async_trait]
impl ToolHandler for EndpointTool {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        self.executor.execute(&self.def, &args).await
    }
}

pub fn register_endpoint_tools(
    registry: &mut ToolRegistry,
    catalog: &EndpointCatalog,
    executor: EndpointExecutor,
) -> Result<(), ToolError> {
    for def in &catalog.tools {
        registry.register(
            def.tool_def(),
            Arc::new(EndpointTool {
                def: Arc::new(def.clone()),
                executor: executor.clone(),
            }),
        )?;
    }
    Ok(())
}
