//! Error types for translation dispatch

use thiserror::Error;

/// Prefix used for every formatted provider error
pub const API_ERROR_PREFIX: &str = "API Error";

/// Whether repeating the identical request can possibly succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient failure, worth another attempt
    Retryable,
    /// Repeating the request cannot help (bad key, bad request, ...)
    NonRetryable,
}

/// Translation-related errors
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Missing or invalid configuration (API key, endpoint, ...)
    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },

    /// Provider answered with an error payload or a non-success status.
    ///
    /// `message` is already formatted as `API Error (<code>): <detail>`.
    #[error("{message}")]
    Api {
        status: u16,
        error_type: Option<String>,
        message: String,
    },

    /// Connection failure or timeout before a response arrived
    #[error("Network error: {message}")]
    Transport {
        message: String,
        timeout: bool,
    },

    /// Response body was not the JSON shape the provider documents
    #[error("Failed to parse {provider} response: {message}")]
    Parse {
        provider: &'static str,
        message: String,
    },

    /// Response parsed but carried no translated text
    #[error("{message}")]
    EmptyResponse {
        message: String,
    },

    /// The configured model does not exist for this account (HTTP 404)
    #[error("API Error (404): Model not found - {message}")]
    ModelNotFound {
        error_type: Option<String>,
        message: String,
    },

    /// The model is still missing after an automatic switch
    #[error("Model '{model}' is unavailable even after automatic fallback ({message}). Check the model setting for this provider.")]
    ModelUnavailable {
        model: String,
        message: String,
    },

    /// Cancelled while waiting between attempts
    #[error("Translation interrupted")]
    Interrupted,

    /// Preference store read/write failure
    #[error("Storage error: {message}")]
    Storage {
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranslationError {
    /// Build an [`TranslationError::Api`] with the standard message layout
    pub fn api(status: u16, error_type: Option<String>, detail: &str) -> Self {
        TranslationError::Api {
            status,
            error_type,
            message: format_api_error(status, detail),
        }
    }

    /// Shorthand for configuration errors
    pub fn config(message: impl Into<String>) -> Self {
        TranslationError::Config {
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            TranslationError::Api { status, .. } => Some(*status),
            TranslationError::ModelNotFound { .. } => Some(404),
            _ => None,
        }
    }

    /// Retry classification, derived from the structured fields only
    pub fn class(&self) -> ErrorClass {
        match self {
            TranslationError::Api { status, .. } => match status {
                400 | 401 | 403 => ErrorClass::NonRetryable,
                _ => ErrorClass::Retryable,
            },
            TranslationError::Transport { .. } | TranslationError::EmptyResponse { .. } => {
                ErrorClass::Retryable
            }
            TranslationError::Config { .. }
            | TranslationError::Parse { .. }
            | TranslationError::ModelNotFound { .. }
            | TranslationError::ModelUnavailable { .. }
            | TranslationError::Interrupted
            | TranslationError::Storage { .. }
            | TranslationError::Io(_) => ErrorClass::NonRetryable,
        }
    }

    /// Convenience wrapper over [`TranslationError::class`]
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }
}

impl From<reqwest::Error> for TranslationError {
    fn from(err: reqwest::Error) -> Self {
        TranslationError::Transport {
            timeout: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(err: serde_json::Error) -> Self {
        TranslationError::Storage {
            message: err.to_string(),
        }
    }
}

/// Format a provider error as `API Error (<code>): <message>`
pub fn format_api_error(code: u16, message: &str) -> String {
    match code {
        400 => format!("{} (400): Invalid request - {}", API_ERROR_PREFIX, message),
        401 | 403 => format!("{} (401/403): Invalid API key or access denied", API_ERROR_PREFIX),
        429 => format!(
            "{} (429): Rate limit exceeded - {}",
            API_ERROR_PREFIX, message
        ),
        500 | 503 => format!(
            "{} ({}): Server error - Please retry later",
            API_ERROR_PREFIX, code
        ),
        _ => format!("{} ({}): {}", API_ERROR_PREFIX, code, message),
    }
}

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, TranslationError>;
