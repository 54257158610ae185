//! Outbound event notifications.
//!
//! Sessions and engines report human-readable summaries (login, disconnect,
//! harvest proceeds, nuisance actions) through this seam. Delivery is
//! best-effort: implementations swallow their own failures and must never
//! influence engine behavior.

use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str);
}

/// Notifier that writes through the log. Default when no external channel
/// is wired up.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) {
        info!(target: "furrow::notify", "{text}");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Captures notifications for assertions.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, text: &str) {
            self.messages.lock().unwrap().push(text.to_string());
        }
    }
}
