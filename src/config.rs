use clap::{Parser, ValueEnum};
use std::ffi::OsString;
use std::time::Duration;

use crate::errors::ToolError;
use crate::services::cache::DEFAULT_CACHE_TTL;
use crate::services::logger::LogLevel;

pub const DEFAULT_API_BASE_URL: &str = "https://api.lawmatics.com/v1";
pub const DEFAULT_ENDPOINT_BASE_URL: &str = "https://api.lawmatics.com";
pub const API_TOKEN_VAR: &str = "LAWMATICS_API_TOKEN";

/// Which tool families are registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Toolset {
    /// Resource tools and declarative endpoint tools
    #[default]
    All,
    /// Hand-written resource tools backed by the caching client
    Resources,
    /// Declarative endpoint tools from the compiled-in catalog
    Endpoints,
}

impl Toolset {
    pub fn includes_resources(self) -> bool {
        matches!(self, Toolset::All | Toolset::Resources)
    }

    pub fn includes_endpoints(self) -> bool {
        matches!(self, Toolset::All | Toolset::Endpoints)
    }
}

#[derive(Parser, Debug)]
#[command(name = "lawmatics-mcp")]
#[command(version, about = "Lawmatics practice-management API as MCP tools over stdio")]
pub struct Cli {
    /// KEY=VALUE overrides; only LAWMATICS_API_TOKEN=<token> is accepted
    #[arg(value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Bearer token for the resource tools
    #[arg(long, env = "LAWMATICS_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Base URL used by the resource tools
    #[arg(long, env = "LAWMATICS_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,

    /// Base URL the endpoint catalog paths are appended to
    #[arg(long, env = "LAWMATICS_ENDPOINT_BASE_URL", default_value = DEFAULT_ENDPOINT_BASE_URL)]
    pub endpoint_base_url: String,

    /// Freshness window shared by every entity cache, in milliseconds
    #[arg(long, env = "LAWMATICS_CACHE_TTL_MS")]
    pub cache_ttl_ms: Option<u64>,

    #[arg(long, env = "LAWMATICS_TOOLSET", value_enum, default_value = "all")]
    pub toolset: Toolset,

    /// Per-request timeout; unset means no timeout
    #[arg(long, env = "LAWMATICS_HTTP_TIMEOUT_MS")]
    pub http_timeout_ms: Option<u64>,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_token: Option<String>,
    pub api_base_url: String,
    pub endpoint_base_url: String,
    pub cache_ttl: Duration,
    pub toolset: Toolset,
    pub http_timeout: Option<Duration>,
    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_token: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            endpoint_base_url: DEFAULT_ENDPOINT_BASE_URL.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            toolset: Toolset::All,
            http_timeout: None,
            log_level: LogLevel::Info,
        }
    }
}

fn check_base_url(name: &str, raw: &str) -> Result<String, ToolError> {
    let trimmed = raw.trim().trim_end_matches('/');
    url::Url::parse(trimmed).map_err(|err| {
        ToolError::config(format!("{} is not a valid URL: {} ({})", name, raw, err))
    })?;
    Ok(trimmed.to_string())
}

impl Settings {
    pub fn from_cli(cli: Cli) -> Result<Self, ToolError> {
        let mut api_token = cli.api_token.filter(|t| !t.trim().is_empty());
        for raw in &cli.overrides {
            match raw.split_once('=') {
                Some((key, value)) if key == API_TOKEN_VAR => {
                    api_token = Some(value.to_string()).filter(|v| !v.trim().is_empty());
                }
                _ => {
                    return Err(ToolError::invalid_params(format!(
                        "Unsupported argument: {}",
                        raw
                    ))
                    .with_hint("Usage: lawmatics-mcp [LAWMATICS_API_TOKEN=<token>] [OPTIONS]"))
                }
            }
        }

        Ok(Self {
            api_token,
            api_base_url: check_base_url("LAWMATICS_API_BASE_URL", &cli.api_base_url)?,
            endpoint_base_url: check_base_url(
                "LAWMATICS_ENDPOINT_BASE_URL",
                &cli.endpoint_base_url,
            )?,
            cache_ttl: cli
                .cache_ttl_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_CACHE_TTL),
            toolset: cli.toolset,
            http_timeout: cli
                .http_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            log_level: LogLevel::parse(&cli.log_level),
        })
    }

    /// Parses an explicit argument list (first item is the program name).
    pub fn from_args<I, T>(args: I) -> Result<Self, ToolError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|err| {
            ToolError::invalid_params(err.to_string().trim_end().to_string())
        })?;
        Self::from_cli(cli)
    }

    /// Resolves settings from the process environment and command line.
    /// `--help` and `--version` print and exit here.
    pub fn load() -> Result<Self, ToolError> {
        Self::from_cli(Cli::parse())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Settings, ToolError> {
        let mut args = vec![
            "lawmatics-mcp",
            "--api-base-url",
            "http://127.0.0.1:1/v1/",
            "--endpoint-base-url",
            "http://127.0.0.1:1",
            "--cache-ttl-ms",
            "250",
            "--log-level",
            "debug",
        ];
        args.extend_from_slice(extra);
        Settings::from_args(args)
    }

    #[test]
    fn positional_token_overrides_flag() {
        let settings = parse(&["--api-token", "from-flag", "LAWMATICS_API_TOKEN=from-arg"]).unwrap();
        assert_eq!(settings.api_token.as_deref(), Some("from-arg"));
        assert_eq!(settings.api_base_url, "http://127.0.0.1:1/v1");
        assert_eq!(settings.cache_ttl, Duration::from_millis(250));
        assert_eq!(settings.log_level, LogLevel::Debug);
    }

    #[test]
    fn unknown_positional_is_a_usage_error() {
        let err = parse(&["OTHER=1"]).unwrap_err();
        assert!(err.message.contains("Unsupported argument: OTHER=1"));
        assert!(err.hint.unwrap_or_default().starts_with("Usage:"));
    }

    #[test]
    fn toolset_and_timeout_are_parsed() {
        let settings = parse(&["--toolset", "endpoints", "--http-timeout-ms", "1500"]).unwrap();
        assert_eq!(settings.toolset, Toolset::Endpoints);
        assert!(!settings.toolset.includes_resources());
        assert_eq!(settings.http_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = Settings::from_args(["lawmatics-mcp", "--api-base-url", "not a url"]).unwrap_err();
        assert!(err.message.contains("LAWMATICS_API_BASE_URL is not a valid URL"));
    }
}
