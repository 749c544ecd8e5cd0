//! Provider request builders, response parsers and catalog rules
//!
//! Each provider module exposes the same four functions; this module selects
//! the implementation once per call from [`ProviderKind`].

pub mod claude;
pub mod gemini;
pub mod openai;

use serde_json::Value;
use std::time::Duration;

use crate::core::config::ProviderConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{ModelInfo, ProviderKind, TranslationRequest};
use crate::core::transport::{HttpRequest, HttpResponse};

/// Sampling temperature shared by every provider
pub const TEMPERATURE: f64 = 0.1;

/// Build the provider-specific HTTP request for `prompt`
pub fn build_request(
    config: &ProviderConfig,
    request: &TranslationRequest,
    prompt: &str,
) -> Result<HttpRequest> {
    match config.provider {
        ProviderKind::Gemini => gemini::build_request(config, prompt),
        ProviderKind::OpenAi => openai::build_request(config, request, prompt),
        ProviderKind::Claude => claude::build_request(config, request, prompt),
    }
}

/// Extract the translated text, or the provider's structured error
pub fn parse_response(provider: ProviderKind, response: &HttpResponse) -> Result<String> {
    let json = decode_body(provider, response)?;
    if let Some(err) = extract_error(provider, response.status, &json) {
        return Err(err);
    }
    if !response.is_success() {
        return Err(TranslationError::api(response.status, None, &response.text()));
    }

    match provider {
        ProviderKind::Gemini => gemini::parse_response(&json),
        ProviderKind::OpenAi => openai::parse_response(&json),
        ProviderKind::Claude => claude::parse_response(&json),
    }
}

/// Catalog listing request for `provider`
pub fn models_request(
    provider: ProviderKind,
    api_key: &str,
    timeout: Duration,
) -> Result<HttpRequest> {
    match provider {
        ProviderKind::Gemini => gemini::models_request(api_key, timeout),
        ProviderKind::OpenAi => Ok(openai::models_request(api_key, timeout)),
        ProviderKind::Claude => Ok(claude::models_request(api_key, timeout)),
    }
}

/// Filter and rank a catalog listing. The result is unsorted.
pub fn parse_models(provider: ProviderKind, response: &HttpResponse) -> Result<Vec<ModelInfo>> {
    let json = decode_body(provider, response)?;
    if let Some(err) = extract_error(provider, response.status, &json) {
        return Err(err);
    }
    if !response.is_success() {
        return Err(TranslationError::api(response.status, None, &response.text()));
    }

    Ok(match provider {
        ProviderKind::Gemini => gemini::parse_models(&json),
        ProviderKind::OpenAi => openai::parse_models(&json),
        ProviderKind::Claude => claude::parse_models(&json),
    })
}

/// Decode a response body as JSON.
///
/// A non-JSON body on an error status is reported as an API error rather
/// than a parse failure.
fn decode_body(provider: ProviderKind, response: &HttpResponse) -> Result<Value> {
    match serde_json::from_slice::<Value>(&response.body) {
        Ok(json) => Ok(json),
        Err(_) if !response.is_success() => Err(TranslationError::api(
            response.status,
            None,
            response.text().trim(),
        )),
        Err(e) => Err(TranslationError::Parse {
            provider: provider.id(),
            message: e.to_string(),
        }),
    }
}

/// Turn an embedded `error` object into a structured error.
///
/// Gemini reports `error.{code,message,status}`; OpenAI and Claude report
/// `error.{type,message}` alongside the HTTP status. Only Claude reports a
/// missing model as [`TranslationError::ModelNotFound`]; other providers keep
/// the plain 404, which is retried.
pub(crate) fn extract_error(
    provider: ProviderKind,
    http_status: u16,
    json: &Value,
) -> Option<TranslationError> {
    let error = json.get("error")?;
    if !error.is_object() {
        let message = error.as_str().unwrap_or("Unknown error");
        return Some(TranslationError::api(http_status, None, message));
    }

    let code = error
        .get("code")
        .and_then(Value::as_u64)
        .map(|c| c as u16)
        .unwrap_or(http_status);
    let error_type = error
        .get("type")
        .or_else(|| error.get("status"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .to_string();

    let status = if code >= 400 { code } else { http_status };
    let not_found_type = error_type.as_deref() == Some("not_found_error");
    if provider == ProviderKind::Claude
        && (status == 404 || not_found_type)
        && (not_found_type || message.to_ascii_lowercase().contains("model"))
    {
        return Some(TranslationError::ModelNotFound {
            error_type,
            message,
        });
    }

    Some(TranslationError::api(status, error_type, &message))
}

/// Concatenate text from a string or an array of `{text}` parts
pub(crate) fn collect_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.as_str()),
                Value::Object(_) => item.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<String>()
            .trim()
            .to_string(),
        Value::Null => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

/// Entries of a catalog listing under `data` (or `models` for Gemini)
pub(crate) fn catalog_entries<'a>(json: &'a Value, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .find_map(|key| json.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
