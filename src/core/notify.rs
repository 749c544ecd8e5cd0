//! User-facing notices raised by the engine

use tracing::warn;

/// Receives one-line notices meant for the end user (misconfiguration
/// fallbacks, automatic model switches).
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Forwards notices to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str) {
        warn!("{}", message);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Notifier;
    use std::sync::Mutex;

    /// Records every notice for assertions
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        pub messages: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }
}
