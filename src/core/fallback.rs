//! Automatic Claude model switch when the configured model is gone

use std::sync::Arc;
use tracing::warn;

use crate::core::catalog::{select_best_model, ModelCatalog};
use crate::core::config::{ProviderConfig, CLAUDE_MODEL_FALLBACK, PREF_CLAUDE_MODEL};
use crate::core::errors::TranslationError;
use crate::core::models::ProviderKind;
use crate::core::notify::Notifier;
use crate::core::store::PreferenceStore;

/// Picks and persists a replacement model after a "model not found" error
pub struct FallbackSwitcher {
    catalog: Arc<ModelCatalog>,
    store: Arc<dyn PreferenceStore>,
    notifier: Arc<dyn Notifier>,
}

impl FallbackSwitcher {
    pub fn new(
        catalog: Arc<ModelCatalog>,
        store: Arc<dyn PreferenceStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            catalog,
            store,
            notifier,
        }
    }

    /// Whether `error` on `config` is something this switcher handles
    pub fn applies(config: &ProviderConfig, error: &TranslationError) -> bool {
        config.provider == ProviderKind::Claude
            && matches!(error, TranslationError::ModelNotFound { .. })
    }

    /// Best model from the live Claude catalog, or the fixed fallback id
    pub async fn resolve_replacement(&self, api_key: &str) -> String {
        match self.catalog.fetch_models(ProviderKind::Claude, api_key).await {
            Ok(models) => select_best_model(&models, CLAUDE_MODEL_FALLBACK),
            Err(e) => {
                warn!("Unable to fetch Claude models: {}", e);
                CLAUDE_MODEL_FALLBACK.to_string()
            }
        }
    }

    /// Returns the new model id when a switch happened. The choice is
    /// persisted under `claude_model_name`; the key and endpoint are untouched.
    pub async fn try_switch(&self, config: &ProviderConfig, error: &TranslationError) -> Option<String> {
        if !Self::applies(config, error) {
            return None;
        }

        let replacement = self.resolve_replacement(&config.api_key).await;
        if replacement == config.model {
            warn!("Claude model {} not found and no alternative available", config.model);
            return None;
        }

        if let Err(e) = self.store.put(PREF_CLAUDE_MODEL, &replacement) {
            warn!("Failed to persist Claude model {}: {}", replacement, e);
        }
        self.notifier
            .notify(&format!("Claude model auto-selected: {}", replacement));
        warn!(
            "Claude model {} unavailable; auto-selected {}",
            config.model, replacement
        );

        Some(replacement)
    }
}
