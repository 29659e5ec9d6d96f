//! Expiry watcher.
//!
//! Polls a [`ScheduleStore`] and turns expired entries into "verification
//! due" signals on a channel.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::entry::ScheduleEntry;
use super::store::ScheduleStore;

/// Polls for expired schedule entries until shut down.
pub struct ExpiryWatcher {
    store: Arc<dyn ScheduleStore>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    batch_size: usize,
}

impl ExpiryWatcher {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            clock,
            poll_interval,
            batch_size: batch_size.max(1),
        }
    }

    /// Takes every currently expired entry, a batch at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if the schedule store fails. Entries already taken
    /// by earlier batches of the same poll are put back before returning.
    pub async fn poll_once(&self) -> anyhow::Result<Vec<ScheduleEntry>> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        loop {
            let batch = match self.store.take_expired(now, self.batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    if !expired.is_empty() {
                        warn!(count = expired.len(), "Restoring entries taken before poll failure");
                        self.restore(expired.into_iter()).await;
                    }
                    return Err(e);
                }
            };
            let done = batch.len() < self.batch_size;
            expired.extend(batch);
            if done {
                return Ok(expired);
            }
        }
    }

    /// Runs the poll loop, sending each expired entry on `due`.
    ///
    /// Stops when `shutdown` fires or the receiving side of `due` is dropped.
    /// Entries that could not be delivered are put back into the store.
    pub async fn run(self, due: mpsc::Sender<ScheduleEntry>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            batch_size = self.batch_size,
            "Expiry watcher started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let expired = match self.poll_once().await {
                        Ok(expired) => expired,
                        Err(e) => {
                            warn!(error = %e, "Failed to poll schedule store");
                            continue;
                        }
                    };
                    if !expired.is_empty() {
                        debug!(count = expired.len(), "Schedule entries expired");
                    }

                    let mut pending = expired.into_iter();
                    while let Some(entry) = pending.next() {
                        if let Err(mpsc::error::SendError(entry)) = due.send(entry).await {
                            self.restore(std::iter::once(entry).chain(pending)).await;
                            info!("Verification channel closed, stopping expiry watcher");
                            return;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Expiry watcher received shutdown signal");
                    break;
                }
            }
        }

        info!("Expiry watcher stopped");
    }

    async fn restore(&self, entries: impl Iterator<Item = ScheduleEntry>) {
        for entry in entries {
            let object = entry.object().clone();
            if let Err(e) = self.store.put(entry).await {
                warn!(
                    container = object.container(),
                    key = object.key(),
                    error = %e,
                    "Failed to restore undelivered schedule entry"
                );
            }
        }
    }
}
