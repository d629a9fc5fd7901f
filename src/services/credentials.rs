use std::collections::HashMap;

/// Lookup of named credentials (environment variables in production).
///
/// Empty values are treated as absent.
pub trait CredentialSource: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;

    fn get(&self, key: &str) -> Option<String> {
        self.lookup(key).filter(|value| !value.is_empty())
    }

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory credentials, for embedding and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    values: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K, V> FromIterator<(K, V)> for StaticCredentials
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl CredentialSource for StaticCredentials {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_values_count_as_missing() {
        let creds = StaticCredentials::new()
            .with("BEARER_TOKEN_BEARERAUTH", "")
            .with("API_KEY_X", "k");
        assert!(!creds.has("BEARER_TOKEN_BEARERAUTH"));
        assert_eq!(creds.get("API_KEY_X").as_deref(), Some("k"));
        assert!(creds.get("NOPE").is_none());
    }
}
