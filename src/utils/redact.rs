use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const REDACTED: &str = "[REDACTED]";

static INLINE_CREDENTIALS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(Bearer|Basic)\s+[A-Za-z0-9._~+/=-]{6,}").expect("credential regex")
});

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "cookie" | "password" | "api_key" | "x-api-key"
    ) || normalized.contains("secret")
        || normalized.contains("token")
}

/// Masks `Bearer <token>` / `Basic <creds>` fragments inside free text.
pub fn redact_text(value: &str) -> String {
    INLINE_CREDENTIALS
        .replace_all(value, format!("$1 {}", REDACTED).as_str())
        .to_string()
}

/// Masks values stored under credential-looking keys, recursively.
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(redact_text(text)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, entry)| {
                    let masked = if is_sensitive_key(key) && !entry.is_null() {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_value(entry)
                    };
                    (key.clone(), masked)
                })
                .collect(),
        ),
        _ => value.clone(),
    }
}
