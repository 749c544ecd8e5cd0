//! Per-attempt debug events
//!
//! When enabled, every provider attempt produces one `translate_start` line and
//! exactly one terminal line (`translate_success` or `translate_error`). All
//! lines carry the session id so a shared log can be filtered to one run.

use std::sync::Arc;
use std::time::Instant;
use tracing::info;

const PREVIEW_LIMIT: usize = 60;

type Sink = Arc<dyn Fn(&str) + Send + Sync>;

/// Session-scoped debug logger; inert when disabled
#[derive(Clone)]
pub struct DebugLogger {
    enabled: bool,
    session_id: String,
    sink: Sink,
}

impl std::fmt::Debug for DebugLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugLogger")
            .field("enabled", &self.enabled)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl DebugLogger {
    /// Logger writing through `tracing` at info level
    pub fn new(enabled: bool) -> Self {
        Self::with_sink(enabled, Arc::new(|line: &str| info!(target: "lingua_dispatch::debug", "{}", line)))
    }

    /// Logger writing every line to `sink`
    pub fn with_sink(enabled: bool, sink: Sink) -> Self {
        let session_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            enabled,
            session_id,
            sink,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Open a span for one attempt and emit its start event
    pub fn new_span(&self, fields: SpanFields) -> Span {
        if !self.enabled {
            return Span { inner: None };
        }

        self.emit(&format!(
            "translate_start engine={} model={} src={} tgt={} attempt={}/{} chars_in={} preview=\"{}\"",
            fields.engine,
            fields.model,
            fields.source_lang,
            fields.target_lang,
            fields.attempt,
            fields.total_attempts,
            fields.input_chars,
            fields.preview
        ));

        Span {
            inner: Some(SpanInner {
                logger: self.clone(),
                fields,
                started: Instant::now(),
            }),
        }
    }

    /// Free-form line, skipped when disabled or empty
    pub fn log_line(&self, message: &str) {
        if self.enabled && !message.is_empty() {
            self.emit(message);
        }
    }

    fn emit(&self, line: &str) {
        (self.sink)(&format!("[lingua-dispatch] {} | session={}", line, self.session_id));
    }
}

/// What a span records about its attempt
#[derive(Debug, Clone)]
pub struct SpanFields {
    pub engine: String,
    pub model: String,
    pub source_lang: String,
    pub target_lang: String,
    /// 1-based attempt number
    pub attempt: u32,
    pub total_attempts: u32,
    pub input_chars: usize,
    pub preview: String,
}

#[derive(Debug)]
struct SpanInner {
    logger: DebugLogger,
    fields: SpanFields,
    started: Instant,
}

/// One attempt; consumed by its terminal event
#[derive(Debug)]
#[must_use = "a span must end with mark_success or mark_failure"]
pub struct Span {
    inner: Option<SpanInner>,
}

impl Span {
    pub fn is_active(&self) -> bool {
        self.inner.is_some()
    }

    pub fn mark_success(self, output_chars: usize) {
        if let Some(inner) = self.inner {
            let f = &inner.fields;
            inner.logger.emit(&format!(
                "translate_success engine={} model={} latency={}ms chars_out={} attempt={}/{}",
                f.engine,
                f.model,
                inner.started.elapsed().as_millis(),
                output_chars,
                f.attempt,
                f.total_attempts
            ));
        }
    }

    pub fn mark_failure(self, error: &str, will_retry: bool) {
        if let Some(inner) = self.inner {
            let f = &inner.fields;
            inner.logger.emit(&format!(
                "translate_error engine={} model={} latency={}ms attempt={}/{} retry={} error=\"{}\"",
                f.engine,
                f.model,
                inner.started.elapsed().as_millis(),
                f.attempt,
                f.total_attempts,
                if will_retry { "yes" } else { "no" },
                flatten(error)
            ));
        }
    }
}

fn flatten(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}

/// Single-line preview of at most 60 characters
pub fn sanitize_preview(text: &str) -> String {
    let single_line = flatten(text);
    let single_line = single_line.trim();
    if single_line.chars().count() <= PREVIEW_LIMIT {
        return single_line.to_string();
    }
    let mut preview: String = single_line.chars().take(PREVIEW_LIMIT - 3).collect();
    preview.push_str("...");
    preview
}
