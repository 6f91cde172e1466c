//! Key validation for Evolution JSON5 configuration layers.

use crate::ConfigError;
use serde_json::{Map, Value};

/// Allowed keys per top-level section. `None` marks a non-object section.
const SECTIONS: &[(&str, Option<&[&str]>)] = &[
    ("$schema", None),
    (
        "agent",
        Some(&[
            "name",
            "model",
            "instructions",
            "reasoning_effort",
            "reasoning_summary",
            "max_tool_rounds",
            "web_search",
        ]),
    ),
    ("sub_agents", None),
    ("sessions", Some(&["id"])),
    (
        "memory",
        Some(&[
            "enabled",
            "provider",
            "path",
            "qdrant_url",
            "collection",
            "embedding_model",
            "embedding_dimension",
            "recall_limit",
            "score_threshold",
            "capture",
        ]),
    ),
    (
        "background",
        Some(&[
            "enabled",
            "queue_capacity",
            "timeout_secs",
            "shutdown_grace_secs",
            "extractor",
            "extraction_model",
        ]),
    ),
    (
        "tools",
        Some(&[
            "shell",
            "sql",
            "shell_timeout_secs",
            "sql_row_limit",
            "max_tool_log_chars",
        ]),
    ),
    ("openai", Some(&["base_url", "request_timeout_secs"])),
];

const CAPTURE_KEYS: &[&str] = &[
    "deny_patterns",
    "redact_patterns",
    "max_chars",
    "detect_secrets",
    "secret_entropy_threshold",
    "redaction_replacement",
];

const SUB_AGENT_KEYS: &[&str] = &[
    "name",
    "description",
    "model",
    "instructions",
    "tools",
    "web_search",
];

/// Validate a single config layer against the known keys.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    let allowed: Vec<&str> = SECTIONS.iter().map(|(key, _)| *key).collect();
    ensure_allowed_keys(map, &allowed, layer, "")?;

    for (section, keys) in SECTIONS {
        let (Some(value), Some(keys)) = (map.get(*section), keys) else {
            continue;
        };
        let section_map = expect_object(value, layer, section)?;
        ensure_allowed_keys(section_map, keys, layer, section)?;
    }

    if let Some(capture) = map
        .get("memory")
        .and_then(|memory| memory.get("capture"))
    {
        let capture = expect_object(capture, layer, "memory.capture")?;
        ensure_allowed_keys(capture, CAPTURE_KEYS, layer, "memory.capture")?;
    }

    if let Some(list) = map.get("sub_agents") {
        let Value::Array(entries) = list else {
            return Err(invalid(layer, "sub_agents", "expected array"));
        };
        for (idx, entry) in entries.iter().enumerate() {
            let path = format!("sub_agents[{idx}]");
            let entry = expect_object(entry, layer, &path)?;
            ensure_allowed_keys(entry, SUB_AGENT_KEYS, layer, &path)?;
        }
    }

    Ok(())
}

fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    value
        .as_object()
        .ok_or_else(|| invalid(layer, path, "expected object"))
}

fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            let field = if path.is_empty() {
                key.clone()
            } else {
                format!("{path}.{key}")
            };
            return Err(invalid(layer, &field, "unknown key"));
        }
    }
    Ok(())
}

fn invalid(layer: &str, path: &str, message: &str) -> ConfigError {
    let path = if path.is_empty() { "<root>" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{path}"),
        message: message.to_string(),
    }
}
