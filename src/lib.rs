pub mod app;
pub mod config;
pub mod errors;
pub mod managers;
pub mod mcp;
pub mod services;
pub mod utils;

use config::Settings;
use errors::ToolError;

/// Builds the application from `settings` and serves MCP over stdio until EOF.
pub async fn run(settings: Settings) -> Result<(), ToolError> {
    let app = app::App::initialize(settings)?;
    app.server().run_stdio().await
}
