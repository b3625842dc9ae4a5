//! Schema validation helpers for Glimpse JSON5 configuration.

use crate::ConfigError;
use serde_json::{Map, Value};

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    let allowed = [
        "$schema",
        "credentials",
        "generation",
        "embedding",
        "memory",
        "prompt",
        "display",
    ];
    ensure_allowed_keys(map, &allowed, layer, "")?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("credentials") {
        validate_credentials(value, layer, "credentials")?;
    }
    if let Some(value) = map.get("generation") {
        validate_generation(value, layer, "generation")?;
    }
    if let Some(value) = map.get("embedding") {
        validate_embedding(value, layer, "embedding")?;
    }
    if let Some(value) = map.get("memory") {
        validate_memory(value, layer, "memory")?;
    }
    if let Some(value) = map.get("prompt") {
        validate_prompt(value, layer, "prompt")?;
    }
    if let Some(value) = map.get("display") {
        validate_display(value, layer, "display")?;
    }
    Ok(())
}

/// Validate the "credentials" block.
fn validate_credentials(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["api_key", "api_key_env"], layer, path)?;
    if let Some(value) = map.get("api_key") {
        expect_optional_string(value, layer, &join_path(path, "api_key"))?;
    }
    if let Some(value) = map.get("api_key_env") {
        expect_optional_string(value, layer, &join_path(path, "api_key_env"))?;
    }
    Ok(())
}

/// Validate the "generation" block.
fn validate_generation(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "model",
            "base_url",
            "temperature",
            "max_output_tokens",
            "system_instruction",
            "request_timeout_secs",
        ],
        layer,
        path,
    )?;
    if let Some(value) = map.get("model") {
        expect_string(value, layer, &join_path(path, "model"))?;
    }
    if let Some(value) = map.get("base_url") {
        expect_string(value, layer, &join_path(path, "base_url"))?;
    }
    if let Some(value) = map.get("temperature") {
        expect_f64(value, layer, &join_path(path, "temperature"))?;
    }
    if let Some(value) = map.get("max_output_tokens") {
        expect_u64(value, layer, &join_path(path, "max_output_tokens"))?;
    }
    if let Some(value) = map.get("system_instruction") {
        expect_optional_string(value, layer, &join_path(path, "system_instruction"))?;
    }
    if let Some(value) = map.get("request_timeout_secs") {
        expect_u64(value, layer, &join_path(path, "request_timeout_secs"))?;
    }
    Ok(())
}

/// Validate the "embedding" block.
fn validate_embedding(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &["model", "base_url", "request_timeout_secs"],
        layer,
        path,
    )?;
    if let Some(value) = map.get("model") {
        expect_string(value, layer, &join_path(path, "model"))?;
    }
    if let Some(value) = map.get("base_url") {
        expect_string(value, layer, &join_path(path, "base_url"))?;
    }
    if let Some(value) = map.get("request_timeout_secs") {
        expect_u64(value, layer, &join_path(path, "request_timeout_secs"))?;
    }
    Ok(())
}

/// Validate the "memory" block.
fn validate_memory(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &["enabled", "path", "recall_k", "min_score"],
        layer,
        path,
    )?;
    if let Some(value) = map.get("enabled") {
        expect_bool(value, layer, &join_path(path, "enabled"))?;
    }
    if let Some(value) = map.get("path") {
        expect_optional_string(value, layer, &join_path(path, "path"))?;
    }
    if let Some(value) = map.get("recall_k") {
        expect_u64(value, layer, &join_path(path, "recall_k"))?;
    }
    if let Some(value) = map.get("min_score") {
        expect_f64(value, layer, &join_path(path, "min_score"))?;
    }
    Ok(())
}

/// Validate the "prompt" block.
fn validate_prompt(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["context_chars"], layer, path)?;
    if let Some(value) = map.get("context_chars") {
        expect_u64(value, layer, &join_path(path, "context_chars"))?;
    }
    Ok(())
}

/// Validate the "display" block.
fn validate_display(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "bg_color",
            "text_color",
            "transparency",
            "window_width",
            "window_height",
        ],
        layer,
        path,
    )?;
    if let Some(value) = map.get("bg_color") {
        expect_string(value, layer, &join_path(path, "bg_color"))?;
    }
    if let Some(value) = map.get("text_color") {
        expect_string(value, layer, &join_path(path, "text_color"))?;
    }
    if let Some(value) = map.get("transparency") {
        expect_f64(value, layer, &join_path(path, "transparency"))?;
    }
    if let Some(value) = map.get("window_width") {
        expect_u64(value, layer, &join_path(path, "window_width"))?;
    }
    if let Some(value) = map.get("window_height") {
        expect_u64(value, layer, &join_path(path, "window_height"))?;
    }
    Ok(())
}

/// Expect a JSON object or return a typed error.
fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

/// Expect a JSON string or return a typed error.
fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.as_str().is_some() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string"))
    }
}

/// Expect a JSON string or null.
fn expect_optional_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_null() || value.as_str().is_some() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string or null"))
    }
}

/// Expect a JSON boolean or return a typed error.
fn expect_bool(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if matches!(value, Value::Bool(_)) {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected bool"))
    }
}

/// Expect a non-negative JSON integer or return a typed error.
fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

/// Expect a JSON number or return a typed error.
fn expect_f64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_number() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected number"))
    }
}

/// Ensure an object contains only allowed keys.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(ConfigError::UnknownKey {
                layer: layer.to_string(),
                path: join_path(path, key),
            });
        }
    }
    Ok(())
}

/// Join nested paths for better error messages.
fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Build a structured invalid-field error.
fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{normalized_path}"),
        message: message.to_string(),
    }
}
