//! Configuration management

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::core::errors::{Result, TranslationError};
use crate::core::models::ProviderKind;
use crate::core::store::PreferenceStore;

// Preference keys
pub const PREF_DEFAULT_ENGINE: &str = "ai_default_engine";
pub const PREF_GEMINI_API_KEY: &str = "gemini_api_key";
pub const PREF_GEMINI_MODEL: &str = "gemini_model_name";
pub const PREF_TIMEOUT: &str = "gemini_request_timeout";
pub const PREF_MAX_RETRIES: &str = "gemini_max_retries";
pub const PREF_ENABLE_DEBUG: &str = "ai_enable_debug_logging";
pub const PREF_CONTEXT_APP_NAME: &str = "ai_context_app_name";
pub const PREF_CONTEXT_APP_TYPE: &str = "ai_context_app_type";
pub const PREF_CONTEXT_AUDIENCE: &str = "ai_context_target_audience";
pub const PREF_CONTEXT_TONE: &str = "ai_context_tone";
pub const PREF_CONTEXT_NOTES: &str = "ai_context_custom_notes";
pub const PREF_OPENAI_API_KEY: &str = "openai_api_key";
pub const PREF_OPENAI_MODEL: &str = "openai_model_name";
pub const PREF_OPENAI_ENDPOINT: &str = "openai_api_endpoint";
pub const PREF_CLAUDE_API_KEY: &str = "claude_api_key";
pub const PREF_CLAUDE_MODEL: &str = "claude_model_name";
pub const PREF_CLAUDE_ENDPOINT: &str = "claude_api_endpoint";
pub const PREF_CACHE_GEMINI_MODELS: &str = "cache_gemini_models";
pub const PREF_CACHE_OPENAI_MODELS: &str = "cache_openai_models";
pub const PREF_CACHE_CLAUDE_MODELS: &str = "cache_claude_models";
pub const PREF_DEBUG_DISABLE_MODEL_CACHE: &str = "debug_disable_model_cache";

// Defaults
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const OPENAI_MODELS_ENDPOINT: &str = "https://api.openai.com/v1/models";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_CLAUDE_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const CLAUDE_MODELS_ENDPOINT: &str = "https://api.anthropic.com/v1/models";
pub const CLAUDE_API_VERSION: &str = "2023-06-01";
pub const CLAUDE_MODEL_FALLBACK: &str = "claude-3-sonnet-20240229";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_CONTEXT_TONE: &str = "Clear and instructional";
/// Catalog entries older than this are treated as missing
pub const MODEL_CACHE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

const GEMINI_API_KEY_PATTERN: &str = r"^AIzaSy[A-Za-z0-9_-]{33}$";
const OPENAI_API_KEY_PATTERN: &str = r"^sk-[A-Za-z0-9_-]{16,}$";
const CLAUDE_API_KEY_PATTERN: &str = r"^sk-ant-[A-Za-z0-9_-]{16,}$";

impl ProviderKind {
    /// Preference key holding this provider's API key
    pub fn api_key_pref(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => PREF_GEMINI_API_KEY,
            ProviderKind::OpenAi => PREF_OPENAI_API_KEY,
            ProviderKind::Claude => PREF_CLAUDE_API_KEY,
        }
    }

    /// Preference key holding this provider's model id
    pub fn model_pref(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => PREF_GEMINI_MODEL,
            ProviderKind::OpenAi => PREF_OPENAI_MODEL,
            ProviderKind::Claude => PREF_CLAUDE_MODEL,
        }
    }

    /// Preference key holding the serialized model catalog
    pub fn cache_pref(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => PREF_CACHE_GEMINI_MODELS,
            ProviderKind::OpenAi => PREF_CACHE_OPENAI_MODELS,
            ProviderKind::Claude => PREF_CACHE_CLAUDE_MODELS,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => DEFAULT_GEMINI_MODEL,
            ProviderKind::OpenAi => DEFAULT_OPENAI_MODEL,
            ProviderKind::Claude => DEFAULT_CLAUDE_MODEL,
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => GEMINI_API_BASE_URL,
            ProviderKind::OpenAi => DEFAULT_OPENAI_ENDPOINT,
            ProviderKind::Claude => DEFAULT_CLAUDE_ENDPOINT,
        }
    }

    /// Environment variable consulted by [`EngineSettings::apply_env`]
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Claude => "CLAUDE_API_KEY",
        }
    }

    /// Whether `key` looks like a key this provider issues
    pub fn key_format_matches(&self, key: &str) -> bool {
        let pattern = match self {
            ProviderKind::Gemini => GEMINI_API_KEY_PATTERN,
            ProviderKind::OpenAi => OPENAI_API_KEY_PATTERN,
            ProviderKind::Claude => CLAUDE_API_KEY_PATTERN,
        };
        Regex::new(pattern).map(|re| re.is_match(key)).unwrap_or(true)
    }
}

/// Connection settings for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderKind,
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
}

impl ProviderConfig {
    /// Config with the provider's default endpoint and model
    pub fn new(provider: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            endpoint: provider.default_endpoint().to_string(),
            model: provider.default_model().to_string(),
            api_key: api_key.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// User-supplied hints appended to every prompt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFields {
    pub app_name: String,
    pub app_type: String,
    pub audience: String,
    pub tone: String,
    pub notes: String,
}

/// Everything the engine reads from preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub active_provider: ProviderKind,
    pub gemini: ProviderConfig,
    pub openai: ProviderConfig,
    pub claude: ProviderConfig,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub context: ContextFields,
    pub debug_logging: bool,
    pub disable_model_cache: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            active_provider: ProviderKind::Gemini,
            gemini: ProviderConfig::new(ProviderKind::Gemini, ""),
            openai: ProviderConfig::new(ProviderKind::OpenAi, ""),
            claude: ProviderConfig::new(ProviderKind::Claude, ""),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            context: ContextFields {
                tone: DEFAULT_CONTEXT_TONE.to_string(),
                ..Default::default()
            },
            debug_logging: false,
            disable_model_cache: false,
        }
    }
}

impl EngineSettings {
    /// Load settings from a preference store
    pub fn load(store: &dyn PreferenceStore) -> Self {
        let timeout_ms = store.get_u64(PREF_TIMEOUT, DEFAULT_TIMEOUT_MS);
        let max_retries = store
            .get_u64(PREF_MAX_RETRIES, DEFAULT_MAX_RETRIES as u64)
            .min(u32::MAX as u64) as u32;

        let read_provider = |provider: ProviderKind| {
            let endpoint = match provider {
                ProviderKind::Gemini => GEMINI_API_BASE_URL.to_string(),
                ProviderKind::OpenAi => {
                    store.get_string(PREF_OPENAI_ENDPOINT, DEFAULT_OPENAI_ENDPOINT)
                }
                ProviderKind::Claude => {
                    store.get_string(PREF_CLAUDE_ENDPOINT, DEFAULT_CLAUDE_ENDPOINT)
                }
            };
            ProviderConfig {
                provider,
                endpoint,
                model: store.get_string(provider.model_pref(), provider.default_model()),
                api_key: store.get_string(provider.api_key_pref(), "").trim().to_string(),
                timeout_ms,
                max_retries,
            }
        };

        Self {
            active_provider: ProviderKind::from_id(
                &store.get_string(PREF_DEFAULT_ENGINE, ProviderKind::Gemini.id()),
            ),
            gemini: read_provider(ProviderKind::Gemini),
            openai: read_provider(ProviderKind::OpenAi),
            claude: read_provider(ProviderKind::Claude),
            timeout_ms,
            max_retries,
            context: ContextFields {
                app_name: store.get_string(PREF_CONTEXT_APP_NAME, ""),
                app_type: store.get_string(PREF_CONTEXT_APP_TYPE, ""),
                audience: store.get_string(PREF_CONTEXT_AUDIENCE, ""),
                tone: store.get_string(PREF_CONTEXT_TONE, DEFAULT_CONTEXT_TONE),
                notes: store.get_string(PREF_CONTEXT_NOTES, ""),
            },
            debug_logging: store.get_bool(PREF_ENABLE_DEBUG, false),
            disable_model_cache: store.get_bool(PREF_DEBUG_DISABLE_MODEL_CACHE, false),
        }
    }

    /// Override values from environment variables, when set
    pub fn apply_env(&mut self) -> Result<()> {
        for provider in ProviderKind::ALL {
            if let Ok(key) = std::env::var(provider.api_key_env()) {
                self.provider_mut(provider).api_key = key.trim().to_string();
            }
        }

        if let Ok(engine) = std::env::var("AI_DEFAULT_ENGINE") {
            self.active_provider = ProviderKind::from_id(&engine);
        }

        if let Ok(value) = std::env::var("REQUEST_TIMEOUT_MS") {
            self.timeout_ms = value.trim().parse::<u64>().map_err(|e| {
                TranslationError::config(format!("REQUEST_TIMEOUT_MS: {}", e))
            })?;
        }

        if let Ok(value) = std::env::var("MAX_RETRIES") {
            self.max_retries = value
                .trim()
                .parse::<u32>()
                .map_err(|e| TranslationError::config(format!("MAX_RETRIES: {}", e)))?;
        }

        for provider in ProviderKind::ALL {
            let (timeout_ms, max_retries) = (self.timeout_ms, self.max_retries);
            let config = self.provider_mut(provider);
            config.timeout_ms = timeout_ms;
            config.max_retries = max_retries;
        }

        Ok(())
    }

    /// Load from the store, then let the environment override it
    pub fn from_env(store: &dyn PreferenceStore) -> Result<Self> {
        let mut settings = Self::load(store);
        settings.apply_env()?;
        info!(
            "Loaded settings: engine={} timeout={}ms retries={}",
            settings.active_provider, settings.timeout_ms, settings.max_retries
        );
        Ok(settings)
    }

    /// Write every setting back to the store
    pub fn save(&self, store: &dyn PreferenceStore) -> Result<()> {
        store.put(PREF_DEFAULT_ENGINE, self.active_provider.id())?;
        for provider in ProviderKind::ALL {
            let config = self.provider(provider);
            store.put(provider.api_key_pref(), &config.api_key)?;
            store.put(provider.model_pref(), &config.model)?;
        }
        store.put(PREF_OPENAI_ENDPOINT, &self.openai.endpoint)?;
        store.put(PREF_CLAUDE_ENDPOINT, &self.claude.endpoint)?;
        store.put(PREF_TIMEOUT, &self.timeout_ms.to_string())?;
        store.put(PREF_MAX_RETRIES, &self.max_retries.to_string())?;
        store.put(PREF_CONTEXT_APP_NAME, &self.context.app_name)?;
        store.put(PREF_CONTEXT_APP_TYPE, &self.context.app_type)?;
        store.put(PREF_CONTEXT_AUDIENCE, &self.context.audience)?;
        store.put(PREF_CONTEXT_TONE, &self.context.tone)?;
        store.put(PREF_CONTEXT_NOTES, &self.context.notes)?;
        store.put(PREF_ENABLE_DEBUG, &self.debug_logging.to_string())?;
        store.put(
            PREF_DEBUG_DISABLE_MODEL_CACHE,
            &self.disable_model_cache.to_string(),
        )?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(TranslationError::config("timeout must be greater than 0"));
        }

        for provider in ProviderKind::ALL {
            let config = self.provider(provider);
            if config.endpoint.trim().is_empty() {
                return Err(TranslationError::config(format!(
                    "{} endpoint is required",
                    provider
                )));
            }
            if config.model.trim().is_empty() {
                return Err(TranslationError::config(format!(
                    "{} model is required",
                    provider
                )));
            }
        }

        if !self.provider(self.active_provider).has_api_key() {
            warn!("No API key configured for {}", self.active_provider);
        }

        Ok(())
    }

    pub fn provider(&self, provider: ProviderKind) -> &ProviderConfig {
        match provider {
            ProviderKind::Gemini => &self.gemini,
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Claude => &self.claude,
        }
    }

    pub fn provider_mut(&mut self, provider: ProviderKind) -> &mut ProviderConfig {
        match provider {
            ProviderKind::Gemini => &mut self.gemini,
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Claude => &mut self.claude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;

    #[test]
    fn test_load_defaults_from_empty_store() {
        let settings = EngineSettings::load(&MemoryStore::new());

        assert_eq!(settings.active_provider, ProviderKind::Gemini);
        assert_eq!(settings.gemini.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(settings.claude.endpoint, DEFAULT_CLAUDE_ENDPOINT);
        assert_eq!(settings.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(settings.context.tone, DEFAULT_CONTEXT_TONE);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_reads_store_values() {
        let store = MemoryStore::with_values([
            (PREF_DEFAULT_ENGINE, "claude"),
            (PREF_CLAUDE_API_KEY, "  sk-ant-abc  "),
            (PREF_CLAUDE_MODEL, "claude-sonnet-4-5"),
            (PREF_TIMEOUT, "12000"),
            (PREF_MAX_RETRIES, "not-a-number"),
            (PREF_ENABLE_DEBUG, "true"),
        ]);
        let settings = EngineSettings::load(&store);

        assert_eq!(settings.active_provider, ProviderKind::Claude);
        assert_eq!(settings.claude.api_key, "sk-ant-abc");
        assert_eq!(settings.claude.model, "claude-sonnet-4-5");
        assert_eq!(settings.claude.timeout_ms, 12_000);
        assert_eq!(settings.claude.max_retries, DEFAULT_MAX_RETRIES);
        assert!(settings.debug_logging);
    }

    #[test]
    fn test_save_round_trip() {
        let store = MemoryStore::new();
        let mut settings = EngineSettings::default();
        settings.active_provider = ProviderKind::OpenAi;
        settings.openai.api_key = "sk-test".to_string();
        settings.context.notes = "Keep it short".to_string();
        settings.save(&store).unwrap();

        let loaded = EngineSettings::load(&store);
        assert_eq!(loaded.active_provider, ProviderKind::OpenAi);
        assert_eq!(loaded.openai.api_key, "sk-test");
        assert_eq!(loaded.context.notes, "Keep it short");
    }

    #[test]
    fn test_validation_rejects_empty_endpoint() {
        let mut settings = EngineSettings::default();
        settings.openai.endpoint = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_key_format() {
        assert!(ProviderKind::OpenAi.key_format_matches("sk-abcdefghijklmnop1234"));
        assert!(!ProviderKind::OpenAi.key_format_matches("abc"));
        assert!(ProviderKind::Claude.key_format_matches("sk-ant-REDACTED"));
        assert!(!ProviderKind::Gemini.key_format_matches("sk-ant-REDACTED"));
    }
}
