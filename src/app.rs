use reqwest::Client;
use std::sync::Arc;

use crate::config::{Settings, Toolset};
use crate::errors::ToolError;
use crate::managers;
use crate::managers::endpoint::EndpointExecutor;
use crate::mcp::catalog::{endpoint_catalog, EndpointCatalog, ToolRegistry};
use crate::mcp::server::McpServer;
use crate::services::credentials::{CredentialSource, EnvCredentials};
use crate::services::lawmatics::LawmaticsClient;
use crate::services::logger::Logger;
use crate::services::security::{SecurityResolver, TokenCache};
use crate::services::tool_executor::ToolExecutor;

/// Names every resource family must contribute when resource tools are enabled.
const RESOURCE_TOOLS: &[&str] = &[
    "get_prospect",
    "list_prospects_with_optional_filtering",
    "create_prospect",
    "update_prospect",
    "delete_prospect",
    "search_prospects",
    "find_prospect_by_name",
    "find_prospect_by_email",
    "find_prospect_by_phone",
    "find_prospects_by_case_title",
    "get_prospect_timeline",
    "get_timeline_activity",
    "get_stage",
    "list_stages",
    "list_practice_areas",
    "get_practice_area",
    "list_tasks",
    "get_task",
    "create_task",
    "update_task",
    "delete_task",
    "get_document",
    "list_documents",
    "download_document",
    "upload_file",
    "get_contact",
    "find_contact_by_email",
    "get_company",
    "create_contact",
    "create_company",
];

pub struct App {
    pub logger: Logger,
    pub settings: Settings,
    pub executor: ToolExecutor,
    pub client: Option<Arc<LawmaticsClient>>,
    pub token_cache: Arc<TokenCache>,
}

impl App {
    fn http_client(settings: &Settings) -> Result<Client, ToolError> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = settings.http_timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|err| ToolError::config(format!("Failed to build HTTP client: {}", err)))
    }

    fn validate_tool_wiring(
        registry: &ToolRegistry,
        catalog: &EndpointCatalog,
        resources: bool,
        endpoints: bool,
    ) -> Result<(), ToolError> {
        let mut missing: Vec<String> = Vec::new();
        if resources {
            missing.extend(
                RESOURCE_TOOLS
                    .iter()
                    .filter(|name| !registry.contains(name))
                    .map(|name| name.to_string()),
            );
        }
        if endpoints {
            missing.extend(
                catalog
                    .tools
                    .iter()
                    .filter(|def| !registry.contains(&def.name))
                    .map(|def| def.name.clone()),
            );
        }
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(ToolError::internal("Tool wiring is incomplete")
            .with_hint("Every enabled tool family must register all of its tools.")
            .with_details(serde_json::json!({ "missing_tools": missing })))
    }

    /// Wires every component from `settings`, reading endpoint credentials
    /// through `credentials` and endpoint tools from `catalog`.
    pub fn build(
        settings: Settings,
        credentials: Arc<dyn CredentialSource>,
        catalog: &EndpointCatalog,
    ) -> Result<Self, ToolError> {
        let logger = Logger::with_level("lawmatics", settings.log_level);
        let http = Self::http_client(&settings)?;
        let token_cache = Arc::new(TokenCache::new());
        let mut registry = ToolRegistry::new();

        let resources = match (settings.toolset, settings.api_token.as_deref()) {
            (Toolset::Endpoints, _) => false,
            (Toolset::Resources, None) => {
                return Err(ToolError::config(
                    "LAWMATICS_API_TOKEN is required for the resource tools",
                )
                .with_hint(
                    "Set LAWMATICS_API_TOKEN or pass LAWMATICS_API_TOKEN=<token> as an argument.",
                ))
            }
            (Toolset::All, None) => {
                logger.warn(
                    "LAWMATICS_API_TOKEN is not set; resource tools are disabled",
                    None,
                );
                false
            }
            (_, Some(_)) => true,
        };
        let endpoints = settings.toolset.includes_endpoints();

        let client = match settings.api_token.as_deref() {
            Some(token) if resources => {
                let client = Arc::new(LawmaticsClient::new(
                    logger.clone(),
                    http.clone(),
                    settings.api_base_url.clone(),
                    token,
                    settings.cache_ttl,
                ));
                managers::prospects::register_prospect_tools(&mut registry, &logger, client.clone())?;
                managers::stages::register_stage_tools(&mut registry, client.clone())?;
                managers::practice_areas::register_practice_area_tools(
                    &mut registry,
                    client.clone(),
                )?;
                managers::tasks::register_task_tools(&mut registry, client.clone())?;
                managers::documents::register_document_tools(&mut registry, client.clone())?;
                managers::files::register_file_tools(&mut registry, &logger, client.clone())?;
                managers::contacts::register_contact_tools(&mut registry, client.clone())?;
                Some(client)
            }
            _ => None,
        };

        if endpoints {
            let security = SecurityResolver::new(
                logger.clone(),
                credentials,
                catalog.security_schemes.clone(),
                token_cache.clone(),
                http.clone(),
            );
            let executor = EndpointExecutor::new(
                logger.clone(),
                http,
                settings.endpoint_base_url.clone(),
                security,
            );
            managers::endpoint::register_endpoint_tools(&mut registry, catalog, executor)?;
        }

        Self::validate_tool_wiring(&registry, catalog, resources, endpoints)?;
        logger.info(
            "Tools registered",
            Some(&serde_json::json!({
                "count": registry.len(),
                "toolset": format!("{:?}", settings.toolset).to_lowercase(),
                "resources": resources,
                "endpoints": endpoints,
            })),
        );

        let executor = ToolExecutor::new(logger.clone(), Arc::new(registry));
        Ok(Self {
            logger,
            settings,
            executor,
            client,
            token_cache,
        })
    }

    /// Production wiring: process environment and the compiled-in catalog.
    pub fn initialize(settings: Settings) -> Result<Self, ToolError> {
        Self::build(settings, Arc::new(EnvCredentials), endpoint_catalog())
    }

    pub fn server(&self) -> McpServer {
        McpServer::new(self.logger.clone(), self.executor.clone())
    }
}
