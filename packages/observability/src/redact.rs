//! Secret redaction for log output.
//!
//! Credentials must never reach a log sink in cleartext. Callers mask
//! tokens explicitly with [`mask_secret`] when they log them, and the JSON
//! file layer runs every structured field through [`sanitize_value`] as a
//! second line of protection.

use serde_json::{Map, Value};

/// Placeholder written in place of a redacted value.
pub const REDACTED: &str = "[REDACTED]";

/// Field-name fragments whose values are always redacted.
const DENYLIST_KEYS: &[&str] = &[
    "authorization",
    "token",
    "secret",
    "password",
    "api_key",
    "apikey",
    "cookie",
];

/// Number of leading characters kept visible by [`mask_secret`].
const VISIBLE_PREFIX: usize = 4;

/// Mask a credential for logging.
///
/// Keeps the first four characters so operators can tell two tokens apart,
/// and hides the rest. Values too short to keep a prefix are fully masked.
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(VISIBLE_PREFIX).collect();
    if secret.chars().count() <= VISIBLE_PREFIX * 2 {
        "***".to_string()
    } else {
        format!("{visible}***")
    }
}

/// Mask an `Authorization` header value, keeping the scheme.
pub fn mask_authorization(header_value: &str) -> String {
    match header_value.split_once(' ') {
        Some((scheme, credential)) => format!("{scheme} {}", mask_secret(credential)),
        None => mask_secret(header_value),
    }
}

/// Returns true if a field name should never be logged verbatim.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    DENYLIST_KEYS.iter().any(|entry| lower.contains(entry))
}

/// Sanitize a single structured log value.
pub fn sanitize_value(key: &str, value: &Value) -> Value {
    if is_sensitive_key(key) {
        return Value::String(REDACTED.to_string());
    }

    match value {
        Value::String(s) => sanitize_string(s),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), sanitize_value(k, v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_value(key, item))
                .collect::<Vec<_>>(),
        ),
        _ => value.clone(),
    }
}

fn sanitize_string(raw: &str) -> Value {
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("bearer ") {
        return Value::String(mask_authorization(raw));
    }
    Value::String(raw.to_string())
}
