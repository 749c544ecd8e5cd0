//! Gemini `generateContent` wire format and catalog rules

use reqwest::Url;
use serde_json::{json, Value};
use std::time::Duration;

use crate::core::config::{ProviderConfig, GEMINI_API_BASE_URL};
use crate::core::errors::{Result, TranslationError};
use crate::core::models::ModelInfo;
use crate::core::prompt::strip_enclosing_quotes;
use crate::core::transport::HttpRequest;
use crate::providers::{catalog_entries, TEMPERATURE};

const MAX_OUTPUT_TOKENS: u32 = 2048;

/// POST `{endpoint}/{model}:generateContent?key={key}`
pub fn build_request(config: &ProviderConfig, prompt: &str) -> Result<HttpRequest> {
    let base = format!(
        "{}/{}:generateContent",
        config.endpoint.trim_end_matches('/'),
        config.model
    );
    let url = Url::parse_with_params(&base, &[("key", config.api_key.as_str())])
        .map_err(|e| TranslationError::config(format!("Invalid Gemini endpoint {}: {}", base, e)))?;

    let body = json!({
        "contents": [{
            "parts": [{ "text": prompt }]
        }],
        "generationConfig": {
            "temperature": TEMPERATURE,
            "maxOutputTokens": MAX_OUTPUT_TOKENS,
            "topP": 0.8,
            "topK": 10
        }
    });

    Ok(HttpRequest::post(url.to_string(), body, config.timeout()))
}

/// `candidates[0].content.parts[0].text`
pub fn parse_response(json: &Value) -> Result<String> {
    let candidate = json["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| TranslationError::EmptyResponse {
            message: "No translation returned from API".to_string(),
        })?;

    let part = candidate["content"]["parts"]
        .as_array()
        .and_then(|p| p.first())
        .ok_or_else(|| TranslationError::EmptyResponse {
            message: "Empty translation response".to_string(),
        })?;

    let text = part["text"].as_str().ok_or_else(|| TranslationError::Parse {
        provider: "gemini",
        message: "candidate part has no text".to_string(),
    })?;

    let translation = strip_enclosing_quotes(text);
    if translation.is_empty() {
        return Err(TranslationError::EmptyResponse {
            message: "Empty translation response".to_string(),
        });
    }
    Ok(translation)
}

/// GET the model listing; the key travels as a query parameter when present
pub fn models_request(api_key: &str, timeout: Duration) -> Result<HttpRequest> {
    let url = if api_key.trim().is_empty() {
        GEMINI_API_BASE_URL.to_string()
    } else {
        Url::parse_with_params(GEMINI_API_BASE_URL, &[("key", api_key.trim())])
            .map_err(|e| TranslationError::config(e.to_string()))?
            .to_string()
    };
    Ok(HttpRequest::get(url, timeout))
}

pub fn parse_models(json: &Value) -> Vec<ModelInfo> {
    catalog_entries(json, &["models", "data"])
        .iter()
        .filter_map(|entry| {
            let name = entry["name"].as_str()?;
            let id = name.strip_prefix("models/").unwrap_or(name);
            if !is_eligible(id) {
                return None;
            }
            Some(ModelInfo::new(
                id,
                entry["displayName"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| format_name(id)),
                entry["description"].as_str().unwrap_or("Google Gemini"),
                is_recommended(id),
                priority(id),
            ))
        })
        .collect()
}

fn is_eligible(id: &str) -> bool {
    let lower = id.to_ascii_lowercase();
    lower.starts_with("gemini")
        && !lower.contains("-exp")
        && (lower.contains("flash") || lower.contains("pro"))
}

fn is_recommended(id: &str) -> bool {
    id.contains("2.5-flash") && !id.contains("lite")
}

fn priority(id: &str) -> i32 {
    if id.contains("2.5-flash") && !id.contains("lite") {
        130
    } else if id.contains("2.5-flash-lite") {
        120
    } else if id.contains("2.5-pro") {
        110
    } else if id.contains("gemini-3") && id.contains("flash") {
        105
    } else if id.contains("gemini-3") && id.contains("pro") {
        100
    } else if id.contains("2.0-flash") {
        80
    } else {
        10
    }
}

fn format_name(id: &str) -> String {
    id.replace('-', " ").to_uppercase()
}
