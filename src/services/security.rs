use base64::Engine;
use reqwest::Client;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::services::credentials::CredentialSource;
use crate::services::logger::Logger;
use crate::utils::env_name::scheme_env_var;

const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthFlow {
    #[serde(rename = "tokenUrl", default)]
    pub token_url: Option<String>,
    #[serde(rename = "authorizationUrl", default)]
    pub authorization_url: Option<String>,
    #[serde(default)]
    pub scopes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthFlows {
    #[serde(rename = "clientCredentials", default)]
    pub client_credentials: Option<OAuthFlow>,
    #[serde(default)]
    pub password: Option<OAuthFlow>,
    #[serde(rename = "authorizationCode", default)]
    pub authorization_code: Option<OAuthFlow>,
    #[serde(default)]
    pub implicit: Option<OAuthFlow>,
}

impl OAuthFlows {
    /// Flow usable for a machine-to-machine token grant.
    fn grant_flow(&self) -> Option<&OAuthFlow> {
        self.client_credentials.as_ref().or(self.password.as_ref())
    }
}

/// How a credential is transmitted. Carries no secret material.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum SecurityScheme {
    #[serde(rename = "apiKey")]
    ApiKey {
        name: String,
        #[serde(rename = "in")]
        location: ApiKeyLocation,
    },
    #[serde(rename = "http")]
    Http {
        scheme: String,
        #[serde(rename = "bearerFormat", default)]
        bearer_format: Option<String>,
    },
    #[serde(rename = "oauth2")]
    OAuth2 {
        #[serde(default)]
        flows: OAuthFlows,
    },
    #[serde(rename = "openIdConnect")]
    OpenIdConnect {
        #[serde(rename = "openIdConnectUrl", default)]
        open_id_connect_url: Option<String>,
    },
}

/// One AND-group: every named scheme must be satisfiable.
/// Schemes are applied in the order the catalog declares them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityRequirement(Vec<(String, Vec<String>)>);

impl SecurityRequirement {
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.iter().map(|(name, _)| name)
    }
}

impl FromIterator<(String, Vec<String>)> for SecurityRequirement {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for SecurityRequirement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GroupVisitor;

        impl<'de> Visitor<'de> for GroupVisitor {
            type Value = SecurityRequirement;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of security scheme names to scopes")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut schemes = Vec::new();
                while let Some(entry) = map.next_entry::<String, Vec<String>>()? {
                    schemes.push(entry);
                }
                Ok(SecurityRequirement(schemes))
            }
        }

        deserializer.deserialize_map(GroupVisitor)
    }
}

/// Header and query state that authentication may add to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParts {
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityOutcome {
    NotRequired,
    Applied(Vec<String>),
    Unsatisfied,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// OAuth2 access tokens keyed by `<scheme>_<clientId>`. Entries are only
/// replaced lazily once they have expired.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: Mutex<HashMap<String, CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let guard = self.entries.lock().ok()?;
        let entry = guard.get(key)?;
        if entry.expires_at > Instant::now() {
            Some(entry.token.clone())
        } else {
            None
        }
    }

    /// Stores a token that the server says lives `expires_in`; it is kept one minute less.
    pub fn insert(&self, key: &str, token: &str, expires_in: Duration) {
        let expires_at = Instant::now() + expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN);
        if let Ok(mut guard) = self.entries.lock() {
            guard.insert(
                key.to_string(),
                CachedToken {
                    token: token.to_string(),
                    expires_at,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct SecurityResolver {
    logger: Logger,
    credentials: Arc<dyn CredentialSource>,
    schemes: Arc<BTreeMap<String, SecurityScheme>>,
    token_cache: Arc<TokenCache>,
    http: Client,
}

impl SecurityResolver {
    pub fn new(
        logger: Logger,
        credentials: Arc<dyn CredentialSource>,
        schemes: BTreeMap<String, SecurityScheme>,
        token_cache: Arc<TokenCache>,
        http: Client,
    ) -> Self {
        Self {
            logger: logger.child("security"),
            credentials,
            schemes: Arc::new(schemes),
            token_cache,
            http,
        }
    }

    fn credential(&self, prefix: &str, scheme_name: &str) -> Option<String> {
        self.credentials.get(&scheme_env_var(prefix, scheme_name))
    }

    /// Whether the credentials a scheme needs are present. Never performs I/O.
    pub fn is_satisfiable(&self, scheme_name: &str) -> bool {
        let Some(scheme) = self.schemes.get(scheme_name) else {
            return false;
        };
        match scheme {
            SecurityScheme::ApiKey { .. } => self.credential("API_KEY", scheme_name).is_some(),
            SecurityScheme::Http { scheme, .. } => match scheme.to_lowercase().as_str() {
                "bearer" => self.credential("BEARER_TOKEN", scheme_name).is_some(),
                "basic" => {
                    self.credential("BASIC_USERNAME", scheme_name).is_some()
                        && self.credential("BASIC_PASSWORD", scheme_name).is_some()
                }
                _ => false,
            },
            SecurityScheme::OAuth2 { flows } => {
                if self.credential("OAUTH_TOKEN", scheme_name).is_some() {
                    return true;
                }
                self.credential("OAUTH_CLIENT_ID", scheme_name).is_some()
                    && self.credential("OAUTH_CLIENT_SECRET", scheme_name).is_some()
                    && flows.grant_flow().is_some()
            }
            SecurityScheme::OpenIdConnect { .. } => {
                self.credential("OPENID_TOKEN", scheme_name).is_some()
            }
        }
    }

    /// Applies the first requirement group whose schemes are all satisfiable.
    pub async fn apply(
        &self,
        requirements: &[SecurityRequirement],
        parts: &mut RequestParts,
    ) -> SecurityOutcome {
        if requirements.is_empty() {
            return SecurityOutcome::NotRequired;
        }

        let Some(group) = requirements
            .iter()
            .find(|group| group.names().all(|name| self.is_satisfiable(name)))
        else {
            let described = requirements
                .iter()
                .map(|group| {
                    format!(
                        "[{}]",
                        group.names().cloned().collect::<Vec<_>>().join(" AND ")
                    )
                })
                .collect::<Vec<_>>()
                .join(" OR ");
            self.logger.warn(
                "No satisfiable security requirement; sending request unauthenticated",
                Some(&serde_json::json!({ "required": described })),
            );
            return SecurityOutcome::Unsatisfied;
        };

        let mut applied = Vec::new();
        for name in group.names() {
            if let Some(scheme) = self.schemes.get(name) {
                if self.apply_scheme(name, scheme, parts).await {
                    applied.push(name.clone());
                }
            }
        }
        self.logger.debug(
            "Applied security schemes",
            Some(&serde_json::json!({ "schemes": applied })),
        );
        SecurityOutcome::Applied(applied)
    }

    async fn apply_scheme(
        &self,
        name: &str,
        scheme: &SecurityScheme,
        parts: &mut RequestParts,
    ) -> bool {
        match scheme {
            SecurityScheme::ApiKey {
                name: key_name,
                location,
            } => {
                let Some(value) = self.credential("API_KEY", name) else {
                    return false;
                };
                match location {
                    ApiKeyLocation::Header => {
                        parts.headers.insert(key_name.to_lowercase(), value);
                    }
                    ApiKeyLocation::Query => {
                        parts.query.push((key_name.clone(), value));
                    }
                    ApiKeyLocation::Cookie => {
                        let cookie = format!("{}={}", key_name, value);
                        let merged = match parts.headers.get("cookie") {
                            Some(existing) if !existing.is_empty() => {
                                format!("{}; {}", cookie, existing)
                            }
                            _ => cookie,
                        };
                        parts.headers.insert("cookie".to_string(), merged);
                    }
                }
                true
            }
            SecurityScheme::Http { scheme, .. } => match scheme.to_lowercase().as_str() {
                "bearer" => match self.credential("BEARER_TOKEN", name) {
                    Some(token) => {
                        set_bearer(parts, &token);
                        true
                    }
                    None => false,
                },
                "basic" => {
                    let (Some(user), Some(pass)) = (
                        self.credential("BASIC_USERNAME", name),
                        self.credential("BASIC_PASSWORD", name),
                    ) else {
                        return false;
                    };
                    let encoded = base64::engine::general_purpose::STANDARD
                        .encode(format!("{}:{}", user, pass));
                    parts
                        .headers
                        .insert("authorization".to_string(), format!("Basic {}", encoded));
                    true
                }
                _ => false,
            },
            SecurityScheme::OAuth2 { flows } => {
                let token = match self.credential("OAUTH_TOKEN", name) {
                    Some(token) => Some(token),
                    None => self.acquire_oauth2_token(name, flows).await,
                };
                match token {
                    Some(token) => {
                        set_bearer(parts, &token);
                        true
                    }
                    None => {
                        self.logger.warn(
                            "OAuth2 token unavailable; scheme left unapplied",
                            Some(&serde_json::json!({ "scheme": name })),
                        );
                        false
                    }
                }
            }
            SecurityScheme::OpenIdConnect { .. } => match self.credential("OPENID_TOKEN", name) {
                Some(token) => {
                    set_bearer(parts, &token);
                    true
                }
                None => false,
            },
        }
    }

    /// Client-credentials grant with caching. Every failure yields `None`.
    pub async fn acquire_oauth2_token(&self, name: &str, flows: &OAuthFlows) -> Option<String> {
        let client_id = self.credential("OAUTH_CLIENT_ID", name)?;
        let client_secret = self.credential("OAUTH_CLIENT_SECRET", name)?;
        let cache_key = format!("{}_{}", name, client_id);
        if let Some(token) = self.token_cache.get(&cache_key) {
            self.logger.debug(
                "Using cached OAuth2 token",
                Some(&serde_json::json!({ "scheme": name })),
            );
            return Some(token);
        }

        let token_url = flows.grant_flow()?.token_url.clone()?;
        let mut form = vec![("grant_type", "client_credentials".to_string())];
        if let Some(scopes) = self.credential("OAUTH_SCOPES", name) {
            form.push(("scope", scopes));
        }
        let body = match serde_urlencoded::to_string(&form) {
            Ok(body) => body,
            Err(err) => {
                self.logger.error(
                    "Failed to encode OAuth2 token request",
                    Some(&serde_json::json!({ "scheme": name, "error": err.to_string() })),
                );
                return None;
            }
        };
        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", client_id, client_secret));

        self.logger.info(
            "Requesting OAuth2 token",
            Some(&serde_json::json!({ "scheme": name, "token_url": token_url })),
        );
        let response = self
            .http
            .post(&token_url)
            .header("content-type", "application/x-www-form-urlencoded")
            .header("authorization", format!("Basic {}", basic))
            .body(body)
            .send()
            .await;

        let payload = match response {
            Ok(resp) if resp.status().is_success() => resp.json::<Value>().await.ok(),
            Ok(resp) => {
                self.logger.error(
                    "OAuth2 token endpoint rejected the request",
                    Some(&serde_json::json!({ "scheme": name, "status": resp.status().as_u16() })),
                );
                None
            }
            Err(err) => {
                self.logger.error(
                    "OAuth2 token request failed",
                    Some(&serde_json::json!({ "scheme": name, "error": err.to_string() })),
                );
                None
            }
        }?;

        let Some(token) = payload.get("access_token").and_then(|v| v.as_str()) else {
            self.logger.error(
                "OAuth2 token response carried no access_token",
                Some(&serde_json::json!({ "scheme": name })),
            );
            return None;
        };
        let expires_in = payload
            .get("expires_in")
            .and_then(|v| v.as_u64())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        self.token_cache
            .insert(&cache_key, token, Duration::from_secs(expires_in));
        Some(token.to_string())
    }
}

fn set_bearer(parts: &mut RequestParts, token: &str) {
    parts
        .headers
        .insert("authorization".to_string(), format!("Bearer {}", token));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::credentials::StaticCredentials;
    use crate::services::logger::LogLevel;

    fn schemes() -> BTreeMap<String, SecurityScheme> {
        serde_json::from_value(serde_json::json!({
            "oauth2": {
                "type": "oauth2",
                "flows": { "clientCredentials": { "tokenUrl": "http://127.0.0.1:9/oauth/token", "scopes": {} } }
            },
            "bearerAuth": { "type": "http", "scheme": "bearer", "bearerFormat": "JWT" },
            "basic": { "type": "http", "scheme": "basic" },
            "key": { "type": "apiKey", "name": "X-Api-Key", "in": "header" },
            "cookieKey": { "type": "apiKey", "name": "session", "in": "cookie" }
        }))
        .expect("schemes")
    }

    fn resolver(creds: StaticCredentials) -> SecurityResolver {
        SecurityResolver::new(
            Logger::with_level("test", LogLevel::Error),
            Arc::new(creds),
            schemes(),
            Arc::new(TokenCache::new()),
            Client::new(),
        )
    }

    fn group(names: &[&str]) -> SecurityRequirement {
        names.iter().map(|n| (n.to_string(), Vec::new())).collect()
    }

    #[test]
    fn oauth2_needs_token_or_client_pair() {
        let r = resolver(StaticCredentials::new().with("OAUTH_CLIENT_ID_OAUTH2", "id"));
        assert!(!r.is_satisfiable("oauth2"));
        let r = resolver(
            StaticCredentials::new()
                .with("OAUTH_CLIENT_ID_OAUTH2", "id")
                .with("OAUTH_CLIENT_SECRET_OAUTH2", "secret"),
        );
        assert!(r.is_satisfiable("oauth2"));
        assert!(!r.is_satisfiable("unknown"));
    }

    #[tokio::test]
    async fn basic_and_api_key_headers() {
        let r = resolver(
            StaticCredentials::new()
                .with("BASIC_USERNAME_BASIC", "user")
                .with("BASIC_PASSWORD_BASIC", "pass")
                .with("API_KEY_KEY", "k-1"),
        );
        let mut parts = RequestParts::default();
        let outcome = r.apply(&[group(&["basic", "key"])], &mut parts).await;
        assert_eq!(
            outcome,
            SecurityOutcome::Applied(vec!["basic".to_string(), "key".to_string()])
        );
        assert_eq!(parts.headers["authorization"], "Basic dXNlcjpwYXNz");
        assert_eq!(parts.headers["x-api-key"], "k-1");
    }

    #[tokio::test]
    async fn cookie_api_key_prepends_to_existing_cookie() {
        let r = resolver(StaticCredentials::new().with("API_KEY_COOKIEKEY", "abc"));
        let mut parts = RequestParts::default();
        parts
            .headers
            .insert("cookie".to_string(), "theme=dark".to_string());
        r.apply(&[group(&["cookieKey"])], &mut parts).await;
        assert_eq!(parts.headers["cookie"], "session=abc; theme=dark");
    }

    #[tokio::test]
    async fn unsatisfiable_groups_leave_request_untouched() {
        let r = resolver(StaticCredentials::new());
        let mut parts = RequestParts::default();
        let outcome = r
            .apply(&[group(&["oauth2"]), group(&["bearerAuth"])], &mut parts)
            .await;
        assert_eq!(outcome, SecurityOutcome::Unsatisfied);
        assert!(parts.headers.is_empty());
        assert_eq!(
            r.apply(&[], &mut parts).await,
            SecurityOutcome::NotRequired
        );
    }

    #[tokio::test]
    async fn later_scheme_in_a_group_wins_a_shared_header() {
        let r = resolver(
            StaticCredentials::new()
                .with("BEARER_TOKEN_BEARERAUTH", "tok")
                .with("BASIC_USERNAME_BASIC", "user")
                .with("BASIC_PASSWORD_BASIC", "pass"),
        );
        let declared: Vec<SecurityRequirement> =
            serde_json::from_str(r#"[ { "bearerAuth": [], "basic": [] } ]"#).unwrap();
        assert_eq!(
            declared[0].names().cloned().collect::<Vec<_>>(),
            vec!["bearerAuth".to_string(), "basic".to_string()]
        );

        let mut parts = RequestParts::default();
        r.apply(&declared, &mut parts).await;
        assert_eq!(parts.headers["authorization"], "Basic dXNlcjpwYXNz");

        let reversed: Vec<SecurityRequirement> =
            serde_json::from_str(r#"[ { "basic": [], "bearerAuth": [] } ]"#).unwrap();
        let mut parts = RequestParts::default();
        r.apply(&reversed, &mut parts).await;
        assert_eq!(parts.headers["authorization"], "Bearer tok");
    }

    #[test]
    fn token_cache_honours_expiry_margin() {
        let cache = TokenCache::new();
        cache.insert("oauth2_id", "t1", Duration::from_secs(3600));
        assert_eq!(cache.get("oauth2_id").as_deref(), Some("t1"));
        cache.insert("oauth2_short", "t2", Duration::from_secs(60));
        assert!(cache.get("oauth2_short").is_none());
        assert_eq!(cache.len(), 2);
    }
}
