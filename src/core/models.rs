//! Core data models for translation dispatch

use serde::{Deserialize, Serialize};
use std::fmt;

/// Translation provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gemini (`generateContent`)
    #[default]
    Gemini,
    /// OpenAI chat completions
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic Claude messages API
    Claude,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl ProviderKind {
    /// Every provider, in display order
    pub const ALL: [ProviderKind; 3] = [ProviderKind::Gemini, ProviderKind::OpenAi, ProviderKind::Claude];

    /// Stable identifier stored in preferences
    pub fn id(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Claude => "claude",
        }
    }

    /// Parse a stored identifier. Unknown values resolve to Gemini.
    pub fn from_id(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => ProviderKind::OpenAi,
            "claude" => ProviderKind::Claude,
            _ => ProviderKind::Gemini,
        }
    }

    /// Hard-coded catalog used when no fresh cache is available
    pub fn default_models(&self) -> Vec<ModelInfo> {
        let entries: &[(&str, &str, &str, bool, i32)] = match self {
            ProviderKind::Gemini => &[
                ("gemini-2.5-flash", "Gemini 2.5 Flash", "Best speed/quality balance", true, 130),
                ("gemini-2.5-flash-lite", "Gemini 2.5 Flash Lite", "High-volume translation", false, 120),
                ("gemini-2.5-pro", "Gemini 2.5 Pro", "Highest quality, strict limits", false, 110),
                ("gemini-2.0-flash", "Gemini 2.0 Flash", "Legacy fallback", false, 80),
            ],
            ProviderKind::OpenAi => &[
                ("gpt-4o", "GPT-4o", "OpenAI", true, 90),
                ("gpt-4o-mini", "GPT-4o Mini", "OpenAI", false, 90),
                ("o3-mini", "o3 Reasoning", "OpenAI", false, 80),
            ],
            ProviderKind::Claude => &[
                ("claude-3-5-sonnet-20241022", "Claude 3.5 Sonnet", "Anthropic Claude", true, 90),
                ("claude-3-5-haiku-20241022", "Claude 3.5 Haiku", "Anthropic Claude", false, 80),
                ("claude-3-sonnet-20240229", "Claude 3 Sonnet", "Anthropic Claude", false, 60),
            ],
        };

        entries
            .iter()
            .map(|(id, name, detail, recommended, priority)| {
                ModelInfo::new(*id, *name, *detail, *recommended, *priority)
            })
            .collect()
    }
}

/// Translation request, immutable for the duration of a call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub context: String,
}

impl TranslationRequest {
    pub fn new(
        text: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            context: String::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Whether the source language is left to the model
    pub fn is_auto_source(&self) -> bool {
        self.source_lang.is_empty() || self.source_lang.eq_ignore_ascii_case("auto")
    }
}

/// One model offered by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub recommended: bool,
    #[serde(default)]
    pub priority: i32,
}

impl ModelInfo {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        detail: impl Into<String>,
        recommended: bool,
        priority: i32,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            detail: detail.into(),
            recommended,
            priority,
        }
    }

    /// Label shown in model pickers
    pub fn label(&self) -> String {
        if self.recommended && !self.display_name.contains("Recommended") {
            format!("{} (Recommended)", self.display_name)
        } else {
            self.display_name.clone()
        }
    }
}

/// Serialized catalog record, one per provider cache key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCacheEntry {
    /// Fetch time in epoch milliseconds
    pub fetched_at: i64,
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

/// Read-only view of a cache slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDiagnostics {
    pub key: String,
    pub model_count: usize,
    pub fetched_at: i64,
    pub has_data: bool,
    pub expired: bool,
    /// Age in milliseconds, -1 when never fetched
    pub age_ms: i64,
}

impl CacheDiagnostics {
    pub(crate) fn empty(key: &str) -> Self {
        Self {
            key: key.to_string(),
            model_count: 0,
            fetched_at: 0,
            has_data: false,
            expired: false,
            age_ms: -1,
        }
    }
}

impl fmt::Display for CacheDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_data {
            return write!(f, "{}: empty", self.key);
        }
        let fetched = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(self.fetched_at)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        write!(
            f,
            "{}: {} models, fetched {} ({} min ago){}",
            self.key,
            self.model_count,
            fetched,
            self.age_ms / 60_000,
            if self.expired { ", expired" } else { "" }
        )
    }
}
