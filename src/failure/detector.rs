//! Failure detector over the ledger change feed.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, info, warn};

use super::notification::{Notification, NotificationKind};
use super::notifier::Notifier;
use crate::ledger::{ChecksumRecord, Ledger, LedgerCursor, RecordChange};
use crate::metrics;

/// Records read per page when rescanning the ledger after feed lag.
const RESCAN_PAGE_SIZE: usize = 256;

/// Emits a [`NotificationKind::ChecksumFailure`] for every ledger write whose
/// new image is a failure.
///
/// Repeated failures are reported each time; there is no deduplication.
/// With a ledger attached, changes skipped by a lagging subscriber are
/// recovered by rescanning the ledger for failed records.
#[derive(Clone)]
pub struct FailureDetector {
    notifier: Arc<dyn Notifier>,
    deployment: Option<String>,
    ledger: Option<Ledger>,
}

impl FailureDetector {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            deployment: None,
            ledger: None,
        }
    }

    #[must_use]
    pub fn with_ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    #[must_use]
    pub fn with_deployment(mut self, deployment: Option<String>) -> Self {
        self.deployment = deployment;
        self
    }

    /// The notification a change calls for, if any.
    pub fn evaluate(&self, change: &RecordChange) -> Option<Notification> {
        let after = change.after.as_ref()?;
        if after.is_ok() {
            return None;
        }
        Some(
            Notification::new(
                NotificationKind::ChecksumFailure,
                after.object(),
                after.last_checksum_date,
                after.message(),
            )
            .with_deployment(self.deployment.clone()),
        )
    }

    /// Notifies for one change. Returns whether a notification was delivered.
    pub async fn handle(&self, change: &RecordChange) -> bool {
        let Some(notification) = self.evaluate(change) else {
            return false;
        };

        let delivered = match self.notifier.notify(&notification).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    container = %notification.container,
                    key = %notification.key,
                    error = %e,
                    "Failed to deliver checksum failure notification"
                );
                false
            },
        };
        metrics::record_notification(notification.kind.as_str(), delivered);
        delivered
    }

    /// Notifies for every failed record currently in the ledger.
    ///
    /// Returns the number of notifications delivered. Without an attached
    /// ledger this does nothing.
    pub async fn rescan(&self) -> usize {
        let Some(ledger) = &self.ledger else {
            warn!("No ledger attached, skipped changes cannot be recovered");
            return 0;
        };

        let mut delivered = 0;
        let mut cursor: Option<LedgerCursor> = None;
        loop {
            let page = match ledger.scan(cursor.as_ref(), RESCAN_PAGE_SIZE).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, "Ledger rescan failed");
                    break;
                }
            };
            for record in page.records.into_iter().filter(|r| !r.is_ok()) {
                if self.handle(&failed_change(record)).await {
                    delivered += 1;
                }
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        info!(delivered, "Ledger rescan finished");
        delivered
    }

    async fn on_lag(&self, skipped: u64) {
        warn!(skipped, "Failure detector lagged behind the ledger change feed, rescanning");
        metrics::record_feed_lag(skipped);
        self.rescan().await;
    }

    /// Consumes the change feed until it closes or `shutdown` fires.
    ///
    /// On shutdown, changes already buffered in the feed are still handled.
    pub async fn run(
        self,
        mut changes: broadcast::Receiver<RecordChange>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Failure detector started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    debug!("Failure detector received shutdown signal");
                    self.drain(&mut changes).await;
                    break;
                }
                change = changes.recv() => match change {
                    Ok(change) => {
                        self.handle(&change).await;
                    }
                    Err(RecvError::Lagged(skipped)) => self.on_lag(skipped).await,
                    Err(RecvError::Closed) => {
                        debug!("Ledger change feed closed");
                        break;
                    }
                },
            }
        }
        info!("Failure detector stopped");
    }

    async fn drain(&self, changes: &mut broadcast::Receiver<RecordChange>) {
        loop {
            match changes.try_recv() {
                Ok(change) => {
                    self.handle(&change).await;
                }
                Err(TryRecvError::Lagged(skipped)) => self.on_lag(skipped).await,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}

/// A change presenting `record` as freshly written.
fn failed_change(record: ChecksumRecord) -> RecordChange {
    RecordChange {
        object: record.object().clone(),
        at: record.last_checksum_date,
        before: None,
        after: Some(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::ChannelNotifier;
    use crate::ledger::{ChecksumRecord, Ledger};
    use crate::object::ObjectRef;
    use chrono::{Duration, Utc};
    use std::time::Duration as StdDuration;

    fn obj() -> ObjectRef {
        ObjectRef::new("bucket", "a.txt").unwrap()
    }

    fn record(ok: bool) -> ChecksumRecord {
        let now = Utc::now();
        let mut rec = ChecksumRecord::new(obj(), "abc", now, now + Duration::days(1));
        if !ok {
            rec.mark_failed("Checksum mismatch: calculated=def, stored=abc");
        }
        rec
    }

    fn change(before: Option<bool>, after: Option<bool>) -> RecordChange {
        RecordChange {
            object: obj(),
            before: before.map(record),
            after: after.map(record),
            at: Utc::now(),
        }
    }

    fn detector() -> (FailureDetector, tokio::sync::mpsc::Receiver<Notification>) {
        let (notifier, rx) = ChannelNotifier::channel(16);
        (FailureDetector::new(Arc::new(notifier)), rx)
    }

    #[test]
    fn test_evaluate_transitions() {
        let (detector, _rx) = detector();
        assert!(detector.evaluate(&change(Some(true), Some(false))).is_some());
        assert!(detector.evaluate(&change(Some(false), Some(false))).is_some());
        assert!(detector.evaluate(&change(None, Some(false))).is_some());
        assert!(detector.evaluate(&change(Some(false), Some(true))).is_none());
        assert!(detector.evaluate(&change(Some(true), Some(true))).is_none());
        assert!(detector.evaluate(&change(Some(false), None)).is_none());
    }

    #[tokio::test]
    async fn test_notification_fields() {
        let (detector, mut rx) = detector();
        let detector = detector.with_deployment(Some("staging".to_string()));
        let change = change(Some(true), Some(false));

        assert!(detector.handle(&change).await);
        let n = rx.recv().await.unwrap();
        assert_eq!(n.kind, NotificationKind::ChecksumFailure);
        assert_eq!(n.container, "bucket");
        assert_eq!(n.key, "a.txt");
        assert_eq!(n.date, change.after.as_ref().unwrap().last_checksum_date);
        assert!(n.message.contains("mismatch"));
        assert_eq!(n.deployment.as_deref(), Some("staging"));
    }

    #[tokio::test]
    async fn test_one_notification_per_failed_write() {
        let ledger = Ledger::memory();
        let (detector, mut rx) = detector();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(detector.run(ledger.subscribe(), shutdown_rx));

        ledger.put(&record(true)).await.unwrap();
        ledger.put(&record(false)).await.unwrap();
        ledger.put(&record(false)).await.unwrap();
        ledger.put(&record(true)).await.unwrap();

        for _ in 0..2 {
            tokio::time::timeout(StdDuration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
        }
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_lag_rescans_ledger_for_failures() {
        let ledger = Ledger::memory();
        ledger.put(&record(false)).await.unwrap();
        let healthy = ChecksumRecord::new(
            ObjectRef::new("bucket", "b.txt").unwrap(),
            "abc",
            Utc::now(),
            Utc::now() + Duration::days(1),
        );
        ledger.put(&healthy).await.unwrap();

        // A feed too small to hold every change forces a lag
        let (feed_tx, feed_rx) = broadcast::channel(1);
        for _ in 0..3 {
            feed_tx.send(change(Some(true), Some(true))).unwrap();
        }

        let (detector, mut rx) = detector();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        shutdown_tx.send(()).unwrap();
        detector.with_ledger(ledger).run(feed_rx, shutdown_rx).await;

        let n = rx.try_recv().unwrap();
        assert_eq!(n.kind, NotificationKind::ChecksumFailure);
        assert_eq!(n.key, "a.txt");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rescan_without_ledger_is_a_no_op() {
        let (detector, mut rx) = detector();
        assert_eq!(detector.rescan().await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_changes_buffered_at_shutdown_are_notified() {
        let ledger = Ledger::memory();
        let (detector, mut rx) = detector();
        let changes = ledger.subscribe();

        ledger.put(&record(false)).await.unwrap();
        ledger.put(&record(true)).await.unwrap();
        ledger.put(&record(false)).await.unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        shutdown_tx.send(()).unwrap();
        detector.run(changes, shutdown_rx).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
