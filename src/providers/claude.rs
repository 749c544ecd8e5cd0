//! Anthropic messages wire format and catalog rules

use serde_json::{json, Value};
use std::time::Duration;

use crate::core::config::{ProviderConfig, CLAUDE_API_VERSION, CLAUDE_MODELS_ENDPOINT};
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{ModelInfo, TranslationRequest};
use crate::core::prompt::{build_system_prompt, strip_enclosing_quotes};
use crate::core::transport::HttpRequest;
use crate::providers::catalog_entries;

const MAX_TOKENS: u32 = 1024;

pub fn build_request(
    config: &ProviderConfig,
    request: &TranslationRequest,
    prompt: &str,
) -> Result<HttpRequest> {
    let body = json!({
        "model": config.model,
        "max_tokens": MAX_TOKENS,
        "system": build_system_prompt(request),
        "messages": [{
            "role": "user",
            "content": [{ "type": "text", "text": prompt }]
        }]
    });

    Ok(HttpRequest::post(config.endpoint.as_str(), body, config.timeout())
        .header("x-api-key", config.api_key.as_str())
        .header("anthropic-version", CLAUDE_API_VERSION))
}

/// Concatenated `text` of every content block
pub fn parse_response(json: &Value) -> Result<String> {
    let blocks = json["content"]
        .as_array()
        .filter(|blocks| !blocks.is_empty())
        .ok_or_else(|| TranslationError::EmptyResponse {
            message: "Claude response did not include content".to_string(),
        })?;

    let text: String = blocks
        .iter()
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();

    let translation = strip_enclosing_quotes(&text);
    if translation.is_empty() {
        return Err(TranslationError::EmptyResponse {
            message: "Claude response was empty".to_string(),
        });
    }
    Ok(translation)
}

pub fn models_request(api_key: &str, timeout: Duration) -> HttpRequest {
    HttpRequest::get(CLAUDE_MODELS_ENDPOINT, timeout)
        .header("x-api-key", api_key.trim())
        .header("anthropic-version", CLAUDE_API_VERSION)
}

pub fn parse_models(json: &Value) -> Vec<ModelInfo> {
    catalog_entries(json, &["data"])
        .iter()
        .filter_map(|entry| {
            let id = entry["id"].as_str()?;
            if !id.starts_with("claude") {
                return None;
            }
            Some(ModelInfo::new(
                id,
                format_name(id),
                entry["display_name"].as_str().unwrap_or("Anthropic Claude"),
                id.contains("sonnet-4") || id.contains("haiku-4"),
                priority(id),
            ))
        })
        .collect()
}

/// Rank and display name, most specific family first
fn family(id: &str) -> Option<(i32, &'static str)> {
    let contains: &[(&str, i32, &str)] = &[
        ("sonnet-4-5", 130, "Claude Sonnet 4.5 (Recommended)"),
        ("haiku-4-5", 120, "Claude Haiku 4.5"),
        ("opus-4", 110, "Claude Opus 4"),
        ("sonnet-4", 100, "Claude Sonnet 4"),
    ];
    let prefixes: &[(&str, i32, &str)] = &[
        ("claude-3-5-sonnet", 90, "Claude 3.5 Sonnet"),
        ("claude-3-5-haiku", 80, "Claude 3.5 Haiku"),
        ("claude-3-opus", 70, "Claude 3 Opus"),
        ("claude-3-sonnet", 60, "Claude 3 Sonnet"),
        ("claude-3-haiku", 50, "Claude 3 Haiku"),
    ];

    contains
        .iter()
        .find(|(needle, _, _)| id.contains(needle))
        .or_else(|| prefixes.iter().find(|(prefix, _, _)| id.starts_with(prefix)))
        .map(|(_, rank, name)| (*rank, *name))
}

fn priority(id: &str) -> i32 {
    family(id).map(|(rank, _)| rank).unwrap_or(10)
}

fn format_name(id: &str) -> String {
    family(id)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ProviderKind;
    use assert_json_diff::assert_json_eq;

    #[test]
    fn test_build_request() {
        let config = ProviderConfig::new(ProviderKind::Claude, "sk-ant-test");
        let request = TranslationRequest::new("Hello", "auto", "de");
        let http = build_request(&config, &request, "PROMPT").unwrap();

        assert_eq!(http.url, "https://api.anthropic.com/v1/messages");
        assert_eq!(http.header_value("x-api-key"), Some("sk-ant-test"));
        assert_eq!(http.header_value("anthropic-version"), Some("2023-06-01"));

        let mut body = http.body.unwrap();
        assert!(body["system"].as_str().unwrap().contains("to German"));
        body.as_object_mut().unwrap().remove("system");
        assert_json_eq!(
            body,
            json!({
                "model": "claude-3-5-sonnet-20241022",
                "max_tokens": 1024,
                "messages": [{"role": "user", "content": [{"type": "text", "text": "PROMPT"}]}]
            })
        );
    }

    #[test]
    fn test_parse_response_concatenates_blocks() {
        let body = json!({"content": [
            {"type": "text", "text": "Hal"},
            {"type": "tool_use", "id": "x"},
            {"type": "text", "text": "lo"}
        ]});
        assert_eq!(parse_response(&body).unwrap(), "Hallo");
    }

    #[test]
    fn test_parse_response_empty() {
        let err = parse_response(&json!({"content": []})).unwrap_err();
        assert!(matches!(err, TranslationError::EmptyResponse { .. }));

        let err = parse_response(&json!({"content": [{"type": "text", "text": "  "}]})).unwrap_err();
        assert_eq!(err.to_string(), "Claude response was empty");
    }

    #[test]
    fn test_parse_models() {
        let body = json!({"data": [
            {"id": "claude-sonnet-4-5-20250929", "display_name": "Claude Sonnet 4.5"},
            {"id": "claude-3-haiku-20240307"},
            {"id": "not-claude"}
        ]});
        let models = parse_models(&body);

        assert_eq!(models.len(), 2);
        assert_eq!(models[0].display_name, "Claude Sonnet 4.5 (Recommended)");
        assert_eq!(models[0].detail, "Claude Sonnet 4.5");
        assert_eq!(models[0].priority, 130);
        assert!(models[0].recommended);
        assert_eq!(models[1].detail, "Anthropic Claude");
        assert_eq!(models[1].priority, 50);
        assert!(!models[1].recommended);
    }
}
