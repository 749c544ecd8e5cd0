//! Bounded retries with exponential backoff and cancellation

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::core::debug_log::{DebugLogger, SpanFields};
use crate::core::errors::{Result, TranslationError};

/// Attempt budget and backoff base for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy with a one-second backoff base
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait after failed attempt `attempt` (0-based): `base * 2^attempt`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt.min(31)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::core::config::DEFAULT_MAX_RETRIES)
    }
}

/// Cooperative cancellation shared between a caller and an in-flight call
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Fire the token; every clone observes it
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the token has been fired
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `operation` until it succeeds, fails non-retryably, or the attempt
/// budget is spent. Each attempt is wrapped in a debug span built from
/// `span_template`.
pub async fn execute_with_retry<F, Fut>(
    policy: RetryPolicy,
    cancel: &CancelToken,
    logger: &DebugLogger,
    span_template: &SpanFields,
    mut operation: F,
) -> Result<String>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let total = policy.max_attempts();
    let mut last_error = None;

    for attempt in 0..total {
        if cancel.is_cancelled() {
            return Err(TranslationError::Interrupted);
        }

        let span = logger.new_span(SpanFields {
            attempt: attempt + 1,
            total_attempts: total,
            ..span_template.clone()
        });

        match operation(attempt).await {
            Ok(text) => {
                span.mark_success(text.chars().count());
                if attempt > 0 {
                    info!("Successfully translated after {} retries", attempt);
                }
                return Ok(text);
            }
            Err(e) => {
                let is_last = attempt + 1 == total;
                let will_retry = e.is_retryable() && !is_last;
                span.mark_failure(&e.to_string(), will_retry);

                if !will_retry {
                    if e.is_retryable() {
                        warn!("Giving up after {} attempts: {}", total, e);
                    } else {
                        debug!("Not retrying: {}", e);
                    }
                    return Err(e);
                }

                let delay = policy.backoff_delay(attempt);
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt + 1,
                    total,
                    e,
                    delay
                );
                last_error = Some(e);

                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        info!("Translation interrupted during backoff");
                        return Err(TranslationError::Interrupted);
                    }
                }
            }
        }
    }

    Err(last_error.unwrap_or(TranslationError::Interrupted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn template() -> SpanFields {
        SpanFields {
            engine: "gemini".to_string(),
            model: "m".to_string(),
            source_lang: "auto".to_string(),
            target_lang: "es".to_string(),
            attempt: 0,
            total_attempts: 0,
            input_chars: 5,
            preview: "Hello".to_string(),
        }
    }

    fn server_error() -> TranslationError {
        TranslationError::api(503, None, "unavailable")
    }

    #[test]
    fn test_backoff_delay_doubles() {
        let policy = RetryPolicy::new(3);
        assert_eq!(policy.max_attempts(), 4);
        let delays: Vec<u64> = (0..4).map(|k| policy.backoff_delay(k).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8]);
        assert!(policy.backoff_delay(40) >= policy.backoff_delay(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_uses_every_attempt() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = execute_with_retry(
            RetryPolicy::new(2),
            &CancelToken::new(),
            &DebugLogger::disabled(),
            &template(),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(server_error()) }
            },
        )
        .await;

        assert_eq!(result.unwrap_err().status(), Some(503));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff, none after the last attempt
        assert_eq!(started.elapsed().as_secs(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_failure_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(
            RetryPolicy::new(5),
            &CancelToken::new(),
            &DebugLogger::disabled(),
            &template(),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TranslationError::api(401, None, "bad key")) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry() {
        let result = execute_with_retry(
            RetryPolicy::new(2),
            &CancelToken::new(),
            &DebugLogger::disabled(),
            &template(),
            |attempt| async move {
                if attempt == 0 {
                    Err(server_error())
                } else {
                    Ok("Hola".to_string())
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "Hola");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_interrupts() {
        let cancel = CancelToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let task = {
            let cancel = cancel.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                execute_with_retry(
                    RetryPolicy::new(3),
                    &cancel,
                    &DebugLogger::disabled(),
                    &template(),
                    |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async { Err(server_error()) }
                    },
                )
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(TranslationError::Interrupted)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_token_resolves() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.clone().cancel();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }
}
