//! Async dispatch engine with retry and model fallback logic

use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::batch::{build_batch_prompt, chunk_ranges, parse_batch_response};
use crate::core::catalog::ModelCatalog;
use crate::core::config::{EngineSettings, ProviderConfig};
use crate::core::debug_log::{sanitize_preview, DebugLogger, SpanFields};
use crate::core::errors::{Result, TranslationError};
use crate::core::fallback::FallbackSwitcher;
use crate::core::lock_utils::{lock_recover, read_recover, write_recover};
use crate::core::models::{ProviderKind, TranslationRequest};
use crate::core::notify::{Notifier, TracingNotifier};
use crate::core::prompt::{
    build_translation_prompt, build_user_context_directive, is_non_translatable,
    restore_placeholders, tokenize_placeholders, validate_placeholders, Tokenized,
};
use crate::core::retry::{execute_with_retry, CancelToken, RetryPolicy};
use crate::core::store::PreferenceStore;
use crate::core::transport::{ReqwestTransport, Transport};
use crate::providers;

/// Per-session dispatch state resolved from [`EngineSettings`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchContext {
    /// The one provider config every call of this session uses
    pub config: ProviderConfig,
    /// Provider the settings asked for, when the session fell back to Gemini
    pub fallback_from: Option<ProviderKind>,
    /// User context directive appended to prompts
    pub directive: String,
}

impl DispatchContext {
    /// Pick the active provider.
    ///
    /// OpenAI or Claude without a key falls back to Gemini with one notice;
    /// Gemini without a key is a configuration error.
    pub fn resolve(settings: &EngineSettings, notifier: &dyn Notifier) -> Result<Self> {
        let requested = settings.active_provider;
        let mut config = settings.provider(requested).clone();
        let mut fallback_from = None;

        if requested != ProviderKind::Gemini && !config.has_api_key() {
            notifier.notify(&format!(
                "{} API key is not configured; falling back to Gemini",
                requested
            ));
            warn!("Falling back to Gemini: missing {} API key", requested);
            config = settings.gemini.clone();
            fallback_from = Some(requested);
        }

        if !config.has_api_key() {
            return Err(TranslationError::config("Gemini API key not configured"));
        }

        if !config.provider.key_format_matches(&config.api_key) {
            warn!(
                "{} API key does not match the expected format; continuing anyway",
                config.provider
            );
        }

        Ok(Self {
            config,
            fallback_from,
            directive: build_user_context_directive(&settings.context),
        })
    }
}

/// Assembles a [`DispatchEngine`] from settings and collaborators
pub struct EngineBuilder {
    settings: EngineSettings,
    store: Arc<dyn PreferenceStore>,
    transport: Option<Arc<dyn Transport>>,
    notifier: Arc<dyn Notifier>,
    logger: Option<DebugLogger>,
}

impl EngineBuilder {
    /// Use `transport` instead of the default `reqwest` client
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Override the debug logger derived from `debug_logging`
    pub fn logger(mut self, logger: DebugLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<DispatchEngine> {
        self.settings.validate()?;
        let context = DispatchContext::resolve(&self.settings, self.notifier.as_ref())?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let logger = self
            .logger
            .unwrap_or_else(|| DebugLogger::new(self.settings.debug_logging));
        let catalog = Arc::new(
            ModelCatalog::new(self.store.clone(), transport.clone())
                .with_timeout(context.config.timeout())
                .with_cache_bypass(self.settings.disable_model_cache),
        );
        let fallback = FallbackSwitcher::new(
            catalog.clone(),
            self.store.clone(),
            self.notifier.clone(),
        );

        info!(
            "Dispatch engine ready: provider={} model={} retries={}",
            context.config.provider, context.config.model, context.config.max_retries
        );
        logger.log_line(&format!(
            "engine_ready provider={} model={}",
            context.config.provider, context.config.model
        ));

        Ok(DispatchEngine {
            inner: Arc::new(EngineInner {
                context: RwLock::new(context),
                transport,
                catalog,
                fallback,
                logger,
                cancel: Mutex::new(CancelToken::new()),
            }),
        })
    }
}

struct EngineInner {
    context: RwLock<DispatchContext>,
    transport: Arc<dyn Transport>,
    catalog: Arc<ModelCatalog>,
    fallback: FallbackSwitcher,
    logger: DebugLogger,
    cancel: Mutex<CancelToken>,
}

/// Turns translation requests into provider calls.
///
/// Cheap to clone; clones share the session context, the cancel token and
/// the model cache.
#[derive(Clone)]
pub struct DispatchEngine {
    inner: Arc<EngineInner>,
}

impl DispatchEngine {
    /// Start building an engine for `settings`
    pub fn builder(settings: EngineSettings, store: Arc<dyn PreferenceStore>) -> EngineBuilder {
        EngineBuilder {
            settings,
            store,
            transport: None,
            notifier: Arc::new(TracingNotifier),
            logger: None,
        }
    }

    /// Engine with the default transport and notifier
    pub fn new(settings: EngineSettings, store: Arc<dyn PreferenceStore>) -> Result<Self> {
        Self::builder(settings, store).build()
    }

    /// Load settings from `store` plus the environment
    pub fn from_store(store: Arc<dyn PreferenceStore>) -> Result<Self> {
        let settings = EngineSettings::from_env(store.as_ref())?;
        Self::new(settings, store)
    }

    /// Snapshot of the session context
    pub fn context(&self) -> DispatchContext {
        read_recover(&self.inner.context, "dispatch_context").clone()
    }

    pub fn active_config(&self) -> ProviderConfig {
        read_recover(&self.inner.context, "dispatch_context").config.clone()
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.inner.catalog
    }

    pub fn logger(&self) -> &DebugLogger {
        &self.inner.logger
    }

    /// Token shared by the calls currently in flight
    pub fn cancel_token(&self) -> CancelToken {
        lock_recover(&self.inner.cancel, "cancel_token").clone()
    }

    /// Interrupt every call in flight. Calls started afterwards get a fresh
    /// token and run normally.
    pub fn cancel(&self) {
        let fired = std::mem::take(&mut *lock_recover(&self.inner.cancel, "cancel_token"));
        fired.cancel();
    }

    /// Translate one string using the session's context directive
    pub async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        let request = self.request(text, source_lang, target_lang);
        self.translate_request(&request).await
    }

    /// Run [`DispatchEngine::translate`] on its own task
    pub fn spawn_translate(
        &self,
        text: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> JoinHandle<Result<String>> {
        let engine = self.clone();
        let (text, source_lang, target_lang) = (text.into(), source_lang.into(), target_lang.into());
        tokio::spawn(async move { engine.translate(&text, &source_lang, &target_lang).await })
    }

    /// Translate a fully specified request
    pub async fn translate_request(&self, request: &TranslationRequest) -> Result<String> {
        let cancel = self.cancel_token();
        self.translate_with_cancel(request, &cancel).await
    }

    /// Translate with a caller-owned cancel token
    pub async fn translate_with_cancel(
        &self,
        request: &TranslationRequest,
        cancel: &CancelToken,
    ) -> Result<String> {
        let text = request.text.as_str();
        if text.trim().is_empty() || is_non_translatable(text) {
            debug!("Skipping non-translatable input ({} chars)", text.len());
            return Ok(text.to_string());
        }

        let tokenized = tokenize_placeholders(text);
        let prompt = build_translation_prompt(request, &tokenized.text);

        let raw = self
            .dispatch(
                request,
                &prompt,
                text.chars().count(),
                sanitize_preview(text),
                cancel,
            )
            .await?;

        Ok(restore_checked(text, &raw, &tokenized))
    }

    /// Translate many strings, batching them into numbered prompts.
    ///
    /// The output always has one entry per input. Items that cannot be
    /// translated keep their original text. An interruption ends the whole
    /// batch with [`TranslationError::Interrupted`].
    pub async fn translate_batch(
        &self,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<String>> {
        let cancel = self.cancel_token();

        if texts.len() == 1 {
            let request = self.request(&texts[0], source_lang, target_lang);
            return match self.translate_with_cancel(&request, &cancel).await {
                Ok(translated) => Ok(vec![translated]),
                Err(TranslationError::Interrupted) => Err(TranslationError::Interrupted),
                Err(e) => {
                    warn!("Translation failed, keeping original: {}", e);
                    Ok(texts.to_vec())
                }
            };
        }

        let mut results = texts.to_vec();
        let pending: Vec<(usize, Tokenized)> = texts
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty() && !is_non_translatable(text))
            .map(|(i, text)| (i, tokenize_placeholders(text)))
            .collect();

        if pending.is_empty() {
            debug!("All {} strings are non-translatable", texts.len());
            return Ok(results);
        }

        let request = self.request("", source_lang, target_lang);
        let lengths: Vec<usize> = pending.iter().map(|(_, t)| t.text.chars().count()).collect();

        for range in chunk_ranges(&lengths) {
            let chunk = &pending[range];
            match self.translate_chunk(&request, texts, chunk, &cancel).await {
                Ok(translated) => {
                    for ((index, _), value) in chunk.iter().zip(translated) {
                        results[*index] = value;
                    }
                }
                Err(TranslationError::Interrupted) => return Err(TranslationError::Interrupted),
                Err(e) => {
                    warn!(
                        "Batch translation failed ({}), falling back to individual translation",
                        e
                    );
                    for (index, _) in chunk {
                        let item = self.request(&texts[*index], source_lang, target_lang);
                        match self.translate_with_cancel(&item, &cancel).await {
                            Ok(value) => results[*index] = value,
                            Err(TranslationError::Interrupted) => {
                                return Err(TranslationError::Interrupted)
                            }
                            Err(single) => {
                                warn!("Individual fallback failed for item {}: {}", index + 1, single)
                            }
                        }
                    }
                }
            }
        }

        Ok(results)
    }

    async fn translate_chunk(
        &self,
        request: &TranslationRequest,
        originals: &[String],
        chunk: &[(usize, Tokenized)],
        cancel: &CancelToken,
    ) -> Result<Vec<String>> {
        let tokenized: Vec<String> = chunk.iter().map(|(_, t)| t.text.clone()).collect();
        let total_chars: usize = tokenized.iter().map(|t| t.chars().count()).sum();
        let prompt = build_batch_prompt(request, &tokenized);

        info!(
            "Batch translate | count={} | {} -> {} | chars={}",
            chunk.len(),
            request.source_lang,
            request.target_lang,
            total_chars
        );

        let raw = self
            .dispatch(
                request,
                &prompt,
                total_chars,
                format!("[batch:{}] {} chars", chunk.len(), total_chars),
                cancel,
            )
            .await?;
        let parsed = parse_batch_response(&raw, &tokenized)?;

        Ok(chunk
            .iter()
            .zip(parsed)
            .map(|((index, tokens), value)| restore_checked(&originals[*index], &value, tokens))
            .collect())
    }

    fn request(&self, text: &str, source_lang: &str, target_lang: &str) -> TranslationRequest {
        let directive = read_recover(&self.inner.context, "dispatch_context")
            .directive
            .clone();
        TranslationRequest::new(text, source_lang, target_lang).with_context(directive)
    }

    /// Send `prompt` through the retry controller, switching the Claude model
    /// once if it no longer exists
    async fn dispatch(
        &self,
        request: &TranslationRequest,
        prompt: &str,
        input_chars: usize,
        preview: String,
        cancel: &CancelToken,
    ) -> Result<String> {
        let config = self.active_config();
        let template = SpanFields {
            engine: config.provider.id().to_string(),
            model: config.model.clone(),
            source_lang: request.source_lang.clone(),
            target_lang: request.target_lang.clone(),
            attempt: 0,
            total_attempts: 0,
            input_chars,
            preview,
        };

        let error = match self.send_with_retry(&config, request, prompt, &template, cancel).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        if !FallbackSwitcher::applies(&config, &error) {
            return Err(error);
        }
        let Some(model) = self.inner.fallback.try_switch(&config, &error).await else {
            return Err(error);
        };

        self.set_model(&model);
        let switched = config.with_model(model);
        let template = SpanFields {
            model: switched.model.clone(),
            ..template
        };

        match self.send_with_retry(&switched, request, prompt, &template, cancel).await {
            Err(TranslationError::ModelNotFound { message, .. }) => {
                Err(TranslationError::ModelUnavailable {
                    model: switched.model,
                    message,
                })
            }
            other => other,
        }
    }

    async fn send_with_retry(
        &self,
        config: &ProviderConfig,
        request: &TranslationRequest,
        prompt: &str,
        template: &SpanFields,
        cancel: &CancelToken,
    ) -> Result<String> {
        let policy = RetryPolicy::new(config.max_retries);
        execute_with_retry(policy, cancel, &self.inner.logger, template, |_| {
            self.send_request(config, request, prompt)
        })
        .await
    }

    /// Send one provider request and parse the reply
    async fn send_request(
        &self,
        config: &ProviderConfig,
        request: &TranslationRequest,
        prompt: &str,
    ) -> Result<String> {
        let http = providers::build_request(config, request, prompt)?;
        let response = self.inner.transport.send(http).await?;
        debug!("{} responded with HTTP {}", config.provider, response.status);
        providers::parse_response(config.provider, &response)
    }

    fn set_model(&self, model: &str) {
        let mut context = write_recover(&self.inner.context, "dispatch_context");
        context.config.model = model.to_string();
    }
}

/// Restore placeholders, falling back to `original` if any went missing
fn restore_checked(original: &str, translated: &str, tokens: &Tokenized) -> String {
    if !tokens.has_placeholders() {
        return translated.to_string();
    }
    let restored = restore_placeholders(translated, &tokens.placeholders);
    if validate_placeholders(original, &restored) {
        restored
    } else {
        warn!("Placeholder validation failed, keeping original text");
        original.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notify::testing::RecordingNotifier;
    use crate::core::store::MemoryStore;
    use crate::core::transport::{HttpRequest, HttpResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned responses and records every request
    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<HttpResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<(u16, String)>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|(status, body)| HttpResponse::new(status, body))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| TranslationError::Transport {
                    message: "no scripted reply".to_string(),
                    timeout: false,
                })
        }
    }

    fn gemini_reply(text: &str) -> String {
        serde_json::json!({"candidates": [{"content": {"parts": [{"text": text}]}}]}).to_string()
    }

    fn gemini_settings() -> EngineSettings {
        let mut settings = EngineSettings::default();
        settings.gemini.api_key = "AIzaSyTestKey".to_string();
        settings
    }

    fn engine(settings: EngineSettings, transport: Arc<ScriptedTransport>) -> DispatchEngine {
        DispatchEngine::builder(settings, Arc::new(MemoryStore::new()))
            .transport(transport)
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_falls_back_to_gemini_once() {
        let mut settings = gemini_settings();
        settings.active_provider = ProviderKind::OpenAi;
        let notifier = RecordingNotifier::default();

        let context = DispatchContext::resolve(&settings, &notifier).unwrap();

        assert_eq!(context.config.provider, ProviderKind::Gemini);
        assert_eq!(context.fallback_from, Some(ProviderKind::OpenAi));
        assert_eq!(notifier.messages.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_resolve_without_gemini_key_is_fatal() {
        let mut settings = EngineSettings::default();
        settings.active_provider = ProviderKind::Claude;
        let err = DispatchContext::resolve(&settings, &TracingNotifier).unwrap_err();
        assert!(matches!(err, TranslationError::Config { .. }));
    }

    #[test]
    fn test_resolve_builds_directive() {
        let mut settings = gemini_settings();
        settings.context.app_name = "Notes".to_string();
        let context = DispatchContext::resolve(&settings, &TracingNotifier).unwrap();
        assert_eq!(context.directive, "App: Notes. Tone: Clear and instructional.");
    }

    #[tokio::test]
    async fn test_translate_restores_placeholders() {
        let transport = ScriptedTransport::new(vec![(200, gemini_reply("Hola __PH0__"))]);
        let engine = engine(gemini_settings(), transport.clone());

        let result = engine.translate("Hello %s", "en", "es").await.unwrap();

        assert_eq!(result, "Hola %s");
        let requests = transport.requests.lock().unwrap();
        let prompt = requests[0].body.as_ref().unwrap()["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(prompt.ends_with("Text to translate:\nHello __PH0__"));
        assert!(prompt.contains("Tone: Clear and instructional."));
    }

    #[tokio::test]
    async fn test_translate_keeps_original_when_placeholder_dropped() {
        let transport = ScriptedTransport::new(vec![(200, gemini_reply("Hola"))]);
        let engine = engine(gemini_settings(), transport);

        assert_eq!(engine.translate("Hello {name}", "en", "es").await.unwrap(), "Hello {name}");
    }

    #[tokio::test]
    async fn test_non_translatable_skips_network() {
        let transport = ScriptedTransport::new(vec![]);
        let engine = engine(gemini_settings(), transport.clone());

        assert_eq!(engine.translate("", "auto", "es").await.unwrap(), "");
        assert_eq!(engine.translate("  ", "auto", "es").await.unwrap(), "  ");
        assert_eq!(engine.translate("42%", "auto", "es").await.unwrap(), "42%");
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_single_prompt() {
        let reply = gemini_reply("[1] Guardar\n[2] Cancelar __PH0__");
        let transport = ScriptedTransport::new(vec![(200, reply)]);
        let engine = engine(gemini_settings(), transport.clone());

        let texts: Vec<String> = ["Save", "123", "Cancel {n}"].iter().map(|s| s.to_string()).collect();
        let results = engine.translate_batch(&texts, "en", "es").await.unwrap();

        assert_eq!(results, vec!["Guardar", "123", "Cancelar {n}"]);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_failure_falls_back_per_item() {
        let mut settings = gemini_settings();
        settings.gemini.max_retries = 0;
        let bad_request = r#"{"error": {"code": 400, "message": "bad"}}"#;
        let transport = ScriptedTransport::new(vec![
            (400, bad_request.to_string()),
            (200, gemini_reply("Uno")),
            (400, bad_request.to_string()),
        ]);
        let engine = engine(settings, transport.clone());

        let texts: Vec<String> = vec!["One".to_string(), "Two".to_string()];
        let results = engine.translate_batch(&texts, "en", "es").await.unwrap();

        assert_eq!(results, vec!["Uno", "Two"]);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_interrupted_during_backoff() {
        let overloaded = r#"{"error": {"code": 503, "message": "overloaded"}}"#;
        let transport = ScriptedTransport::new(vec![(503, overloaded.to_string()); 4]);
        let engine = engine(gemini_settings(), transport.clone());

        let worker = engine.clone();
        let handle = tokio::spawn(async move {
            let texts = vec!["One".to_string(), "Two".to_string()];
            worker.translate_batch(&texts, "en", "es").await
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        engine.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, TranslationError::Interrupted));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancel_only_affects_calls_in_flight() {
        let transport = ScriptedTransport::new(vec![(200, gemini_reply("Hola"))]);
        let engine = engine(gemini_settings(), transport.clone());

        let before = engine.cancel_token();
        engine.cancel();

        assert!(before.is_cancelled());
        assert!(!engine.cancel_token().is_cancelled());
        assert_eq!(engine.translate("Hello", "en", "es").await.unwrap(), "Hola");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_spawn_translate() {
        let transport = ScriptedTransport::new(vec![(200, gemini_reply("Bonjour"))]);
        let engine = engine(gemini_settings(), transport);

        let handle = engine.spawn_translate("Hello", "auto", "fr");
        assert_eq!(handle.await.unwrap().unwrap(), "Bonjour");
    }

    #[test]
    fn test_restore_checked() {
        let tokens = tokenize_placeholders("Hi <b>you</b>");
        assert_eq!(restore_checked("Hi <b>you</b>", "Hola __PH0__tú__PH1__", &tokens), "Hola <b>tú</b>");
        assert_eq!(restore_checked("Hi", "Hola", &tokenize_placeholders("Hi")), "Hola");
    }
}
