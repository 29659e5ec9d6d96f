//! Notification sinks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

use super::notification::Notification;

/// Delivers notifications somewhere.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns an error if delivery fails.
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        tracing::error!(
            kind = notification.kind.as_str(),
            container = %notification.container,
            key = %notification.key,
            date = %notification.date,
            message = %notification.message,
            "{}",
            notification.subject()
        );
        Ok(())
    }
}

/// Forwards notifications into an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<Notification>) -> Self {
        Self { tx }
    }

    /// Creates a notifier and the receiver it feeds.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.tx
            .send(notification.clone())
            .await
            .map_err(|_| anyhow::anyhow!("Notification channel closed"))
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: String,
    body: String,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// POSTs notifications as JSON to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: url::Url,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: url::Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(1)
            .build()
            .context("Failed to create webhook client")?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &url::Url {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let payload = WebhookPayload {
            subject: notification.subject(),
            body: notification.body(),
            notification,
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to POST notification to {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Webhook {} responded with {status}", self.url);
        }
        Ok(())
    }
}

/// Sends each notification to every inner notifier.
///
/// Delivery continues past individual failures; the first error is returned.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    notifiers: Vec<std::sync::Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<std::sync::Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let mut first_error = None;
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(notification).await {
                tracing::warn!(error = %e, "Notifier failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::NotificationKind;
    use crate::object::ObjectRef;
    use chrono::Utc;
    use std::sync::Arc;

    fn notification() -> Notification {
        Notification::new(
            NotificationKind::ChecksumFailure,
            &ObjectRef::new("bucket", "k").unwrap(),
            Utc::now(),
            "boom",
        )
    }

    struct Failing;

    #[async_trait]
    impl Notifier for Failing {
        async fn notify(&self, _notification: &Notification) -> Result<()> {
            anyhow::bail!("smtp down")
        }
    }

    #[tokio::test]
    async fn test_channel_notifier() {
        let (notifier, mut rx) = ChannelNotifier::channel(4);
        notifier.notify(&notification()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().message, "boom");

        drop(rx);
        assert!(notifier.notify(&notification()).await.is_err());
    }

    #[tokio::test]
    async fn test_fanout_continues_past_failures() {
        let (channel, mut rx) = ChannelNotifier::channel(4);
        let fanout = FanoutNotifier::new(vec![
            Arc::new(Failing),
            Arc::new(LogNotifier),
            Arc::new(channel),
        ]);

        let err = fanout.notify(&notification()).await.unwrap_err();
        assert!(err.to_string().contains("smtp down"));
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn test_webhook_payload_is_flat() {
        let n = notification();
        let payload = WebhookPayload {
            subject: n.subject(),
            body: n.body(),
            notification: &n,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["subject"], "Checksum Verification Failure: bucket/k");
        assert_eq!(json["container"], "bucket");
        assert_eq!(json["message"], "boom");
    }
}
