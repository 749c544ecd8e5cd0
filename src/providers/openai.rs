//! OpenAI chat-completions wire format and catalog rules

use serde_json::{json, Value};
use std::time::Duration;

use crate::core::config::{ProviderConfig, OPENAI_MODELS_ENDPOINT};
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{ModelInfo, TranslationRequest};
use crate::core::prompt::{build_system_prompt, strip_enclosing_quotes};
use crate::core::transport::HttpRequest;
use crate::providers::{catalog_entries, collect_text, TEMPERATURE};

const MAX_TOKENS: u32 = 2048;

pub fn build_request(
    config: &ProviderConfig,
    request: &TranslationRequest,
    prompt: &str,
) -> Result<HttpRequest> {
    let body = json!({
        "model": config.model,
        "messages": [
            { "role": "system", "content": build_system_prompt(request) },
            { "role": "user", "content": prompt }
        ],
        "temperature": TEMPERATURE,
        "max_tokens": MAX_TOKENS
    });

    Ok(HttpRequest::post(config.endpoint.as_str(), body, config.timeout())
        .header("Authorization", format!("Bearer {}", config.api_key)))
}

/// `choices[0].message.content`, as a string or an array of parts
pub fn parse_response(json: &Value) -> Result<String> {
    let choice = json["choices"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| TranslationError::EmptyResponse {
            message: "OpenAI response did not include choices".to_string(),
        })?;

    let message = choice
        .get("message")
        .filter(|m| m.is_object())
        .ok_or_else(|| TranslationError::Parse {
            provider: "openai",
            message: "response missing message payload".to_string(),
        })?;

    let translation = strip_enclosing_quotes(&collect_text(&message["content"]));
    if translation.is_empty() {
        return Err(TranslationError::EmptyResponse {
            message: "OpenAI response was empty".to_string(),
        });
    }
    Ok(translation)
}

pub fn models_request(api_key: &str, timeout: Duration) -> HttpRequest {
    HttpRequest::get(OPENAI_MODELS_ENDPOINT, timeout)
        .header("Authorization", format!("Bearer {}", api_key.trim()))
}

pub fn parse_models(json: &Value) -> Vec<ModelInfo> {
    catalog_entries(json, &["data"])
        .iter()
        .filter_map(|entry| {
            let id = entry["id"].as_str()?;
            if !is_chat_model(id) {
                return None;
            }
            Some(ModelInfo::new(
                id,
                format_name(id),
                entry["owned_by"].as_str().unwrap_or("OpenAI"),
                is_recommended(id),
                priority(id),
            ))
        })
        .collect()
}

fn is_chat_model(id: &str) -> bool {
    let lower = id.to_ascii_lowercase();
    if lower.is_empty() || lower.contains("audio") || lower.contains("embedding") {
        return false;
    }
    ["gpt-4", "gpt-3.5", "gpt-5", "o3", "o4"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

fn is_recommended(id: &str) -> bool {
    id.starts_with("gpt-4.1") || id == "gpt-4o"
}

fn priority(id: &str) -> i32 {
    const RANKS: &[(&str, i32)] = &[
        ("gpt-4.1-mini", 120),
        ("gpt-4.1", 110),
        ("gpt-5", 100),
        ("gpt-4o", 90),
        ("o4-mini", 85),
        ("o3", 80),
        ("gpt-4-turbo", 70),
        ("gpt-3.5", 40),
    ];
    RANKS
        .iter()
        .find(|(prefix, _)| id.starts_with(prefix))
        .map(|(_, rank)| *rank)
        .unwrap_or(10)
}

fn format_name(id: &str) -> String {
    let name = if id.starts_with("gpt-4.1-mini") {
        "GPT-4.1 Mini (Recommended)"
    } else if id.starts_with("gpt-4.1") {
        "GPT-4.1"
    } else if id == "gpt-4o" {
        "GPT-4o"
    } else if id.starts_with("gpt-4o-mini") {
        "GPT-4o Mini"
    } else if id.starts_with("gpt-5") {
        "GPT-5"
    } else if id.starts_with("o4-mini") {
        "o4-mini Reasoning"
    } else if id.starts_with("o3") {
        "o3 Reasoning"
    } else if id.starts_with("gpt-4-turbo") {
        "GPT-4 Turbo"
    } else if id.starts_with("gpt-3.5") {
        "GPT-3.5 Turbo"
    } else {
        return id.split('-').next().unwrap_or(id).to_uppercase();
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ProviderKind;
    use assert_json_diff::assert_json_include;

    #[test]
    fn test_build_request() {
        let config = ProviderConfig::new(ProviderKind::OpenAi, "sk-test");
        let request = TranslationRequest::new("Hello", "en", "es");
        let http = build_request(&config, &request, "PROMPT").unwrap();

        assert_eq!(http.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(http.header_value("authorization"), Some("Bearer sk-test"));

        let body = http.body.unwrap();
        assert_json_include!(
            actual: body.clone(),
            expected: json!({
                "model": "gpt-4o",
                "temperature": 0.1,
                "max_tokens": 2048,
                "messages": [{"role": "system"}, {"role": "user", "content": "PROMPT"}]
            })
        );
        assert!(body["messages"][0]["content"]
            .as_str()
            .unwrap()
            .contains("Translate from English to Spanish"));
    }

    #[test]
    fn test_parse_response_string_and_parts() {
        let body = json!({"choices": [{"message": {"content": " Hola "}}]});
        assert_eq!(parse_response(&body).unwrap(), "Hola");

        let body = json!({"choices": [{"message": {"content": [{"type": "text", "text": "Bon"}, {"type": "text", "text": "jour"}]}}]});
        assert_eq!(parse_response(&body).unwrap(), "Bonjour");
    }

    #[test]
    fn test_parse_response_errors() {
        let err = parse_response(&json!({"choices": []})).unwrap_err();
        assert!(err.is_retryable());

        let err = parse_response(&json!({"choices": [{"finish_reason": "stop"}]})).unwrap_err();
        assert!(matches!(err, TranslationError::Parse { .. }));

        let err = parse_response(&json!({"choices": [{"message": {"content": ""}}]})).unwrap_err();
        assert_eq!(err.to_string(), "OpenAI response was empty");
    }

    #[test]
    fn test_parse_models() {
        let body = json!({"data": [
            {"id": "gpt-4o", "owned_by": "openai"},
            {"id": "text-embedding-3-small"},
            {"id": "gpt-4o-audio-preview"},
            {"id": "o3-mini"},
            {"id": "dall-e-3"}
        ]});
        let models = parse_models(&body);
        let ids: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();

        assert_eq!(ids, vec!["gpt-4o", "o3-mini"]);
        assert_eq!(models[0].display_name, "GPT-4o");
        assert!(models[0].recommended);
        assert_eq!(models[1].display_name, "o3 Reasoning");
        assert_eq!(models[1].priority, 80);
    }
}
