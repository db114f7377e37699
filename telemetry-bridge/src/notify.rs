//! Outbound chat notifications.
//!
//! [`WebhookNotifier`] posts `{"text": ...}` to an incoming-webhook URL
//! (Slack style). Dispatch is fire-and-forget: each message is sent from its
//! own task, failures are logged and the message is lost. No retry.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sink for alert and digest text. Implementations must not block the caller.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, text: String);
}

pub type SharedNotifier = Arc<dyn Notifier>;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
}

#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookNotifier {
    /// `url = None` yields a notifier whose sends are no-ops.
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Performs one POST and waits for the response.
    pub async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let Some(url) = &self.url else {
            debug!("webhook url not configured, dropping notification");
            return Ok(());
        };
        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(NotifyError::HttpStatus { status: status.as_u16(), body });
        }
        info!(status = status.as_u16(), %body, "webhook delivered");
        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, text: String) {
        if !self.is_enabled() {
            debug!("webhook url not configured, dropping notification");
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.send(&text).await {
                warn!(error = %e, "webhook delivery failed, notification lost");
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Notifier;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Captures notifications in memory.
    #[derive(Default, Clone)]
    pub struct RecordingNotifier {
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingNotifier {
        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, text: String) {
            self.sent.lock().push(text);
        }
    }
}
