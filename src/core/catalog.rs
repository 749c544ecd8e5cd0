//! Model catalog: fetch, rank and cache the models each provider offers

use std::cmp::Reverse;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::config::{DEFAULT_TIMEOUT_MS, PREF_DEBUG_DISABLE_MODEL_CACHE};
use crate::core::errors::{Result, TranslationError};
use crate::core::lock_utils::lock_recover;
use crate::core::models::{CacheDiagnostics, ModelCacheEntry, ModelInfo, ProviderKind};
use crate::core::store::PreferenceStore;
use crate::core::transport::Transport;
use crate::providers;

/// Priority descending, then display name ascending
pub fn sort_models(models: &mut [ModelInfo]) {
    models.sort_by(|a, b| {
        Reverse(a.priority)
            .cmp(&Reverse(b.priority))
            .then_with(|| a.display_name.cmp(&b.display_name))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// First recommended model, else the first model, else `default`
pub fn select_best_model(models: &[ModelInfo], default: &str) -> String {
    models
        .iter()
        .find(|m| m.recommended)
        .or_else(|| models.first())
        .map(|m| m.id.clone())
        .unwrap_or_else(|| default.to_string())
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Catalog manager bound to a preference store and a transport
pub struct ModelCatalog {
    store: Arc<dyn PreferenceStore>,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    bypass_cache: bool,
    locks: [Mutex<()>; 3],
}

impl ModelCatalog {
    pub fn new(store: Arc<dyn PreferenceStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            bypass_cache: false,
            locks: Default::default(),
        }
    }

    /// Timeout applied to catalog listing requests
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ignore cached catalogs regardless of the stored bypass flag
    pub fn with_cache_bypass(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    fn lock(&self, provider: ProviderKind) -> std::sync::MutexGuard<'_, ()> {
        let index = match provider {
            ProviderKind::Gemini => 0,
            ProviderKind::OpenAi => 1,
            ProviderKind::Claude => 2,
        };
        lock_recover(&self.locks[index], provider.cache_pref())
    }

    /// Fetch, filter and rank the provider's live model list
    pub async fn fetch_models(&self, provider: ProviderKind, api_key: &str) -> Result<Vec<ModelInfo>> {
        if api_key.trim().is_empty() && provider != ProviderKind::Gemini {
            return Err(TranslationError::config(format!(
                "{} API key required to fetch models",
                provider
            )));
        }

        let request = providers::models_request(provider, api_key, self.timeout)?;
        let response = self.transport.send(request).await?;
        let mut models = providers::parse_models(provider, &response)?;
        sort_models(&mut models);

        info!("Fetched {} {} models", models.len(), provider);
        Ok(models)
    }

    /// Fetch and store the result in the provider's cache slot
    pub async fn refresh_models(&self, provider: ProviderKind, api_key: &str) -> Result<Vec<ModelInfo>> {
        let models = self.fetch_models(provider, api_key).await?;
        self.save_cache(provider, &models)?;
        Ok(models)
    }

    pub fn save_cache(&self, provider: ProviderKind, models: &[ModelInfo]) -> Result<()> {
        let entry = ModelCacheEntry {
            fetched_at: now_millis(),
            models: models.to_vec(),
        };
        let payload = serde_json::to_string(&entry)?;

        let _guard = self.lock(provider);
        self.store.put(provider.cache_pref(), &payload)?;
        debug!("Cached {} models under {}", models.len(), provider.cache_pref());
        Ok(())
    }

    /// Cached models younger than `ttl`; `None` when missing, stale,
    /// unreadable, or when the cache is bypassed (by the catalog's own flag
    /// or the stored `debug_disable_model_cache`)
    pub fn load_cache(&self, provider: ProviderKind, ttl: Duration) -> Option<Vec<ModelInfo>> {
        if self.bypass_cache || self.store.get_bool(PREF_DEBUG_DISABLE_MODEL_CACHE, false) {
            debug!("Model cache bypassed for {}", provider);
            return None;
        }

        let raw = {
            let _guard = self.lock(provider);
            self.store.get(provider.cache_pref())?
        };

        let entry: ModelCacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Ignoring unreadable model cache {}: {}", provider.cache_pref(), e);
                return None;
            }
        };

        if entry.fetched_at <= 0 || entry.models.is_empty() {
            return None;
        }
        let age_ms = now_millis() - entry.fetched_at;
        if age_ms > ttl.as_millis() as i64 {
            debug!("Model cache {} expired ({} ms old)", provider.cache_pref(), age_ms);
            return None;
        }

        Some(entry.models)
    }

    /// Describe the cache slot without modifying it
    pub fn inspect_cache(&self, provider: ProviderKind) -> CacheDiagnostics {
        let key = provider.cache_pref();
        let raw = {
            let _guard = self.lock(provider);
            self.store.get(key)
        };

        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            return CacheDiagnostics::empty(key);
        };
        let Ok(entry) = serde_json::from_str::<ModelCacheEntry>(&raw) else {
            return CacheDiagnostics::empty(key);
        };

        let age_ms = if entry.fetched_at > 0 {
            now_millis() - entry.fetched_at
        } else {
            -1
        };
        CacheDiagnostics {
            key: key.to_string(),
            model_count: entry.models.len(),
            fetched_at: entry.fetched_at,
            has_data: !entry.models.is_empty(),
            expired: entry.fetched_at > 0
                && age_ms > crate::core::config::MODEL_CACHE_TTL.as_millis() as i64,
            age_ms,
        }
    }

    pub fn clear_cache(&self, provider: ProviderKind) -> Result<()> {
        let _guard = self.lock(provider);
        self.store.remove(provider.cache_pref())?;
        info!("Cleared model cache {}", provider.cache_pref());
        Ok(())
    }

    pub fn clear_all_caches(&self) -> Result<()> {
        for provider in ProviderKind::ALL {
            self.clear_cache(provider)?;
        }
        Ok(())
    }

    /// Fresh cache if present, otherwise the built-in list
    pub fn available_models(&self, provider: ProviderKind, ttl: Duration) -> Vec<ModelInfo> {
        let mut models = self
            .load_cache(provider, ttl)
            .unwrap_or_else(|| provider.default_models());
        sort_models(&mut models);
        models
    }
}
