//! The long-running fixity service.
//!
//! One process hosts the whole pipeline:
//!
//! - **HTTP API** ([`http`]) accepts deposit, verification and delete triggers
//! - **Dispatcher** ([`dispatcher`]) applies triggers with bounded concurrency
//!   and re-delivers transient failures
//! - **Expiry watcher** turns expired schedule entries into verification triggers
//! - **Failure detector** follows the ledger change feed and sends notifications
//!
//! Shutdown is cooperative and ordered: Ctrl+C stops the HTTP server, then
//! the watcher and dispatcher stop and in-flight triggers are drained. The
//! failure detector is stopped last so it sees every change the drain wrote.

pub mod dispatcher;
pub mod http;
pub mod trigger;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::FixityConfig;
use crate::engine::Engine;
use crate::metrics;
use crate::schedule::{ExpiryWatcher, ScheduleEntry, ScheduleStore};
use crate::sweep::DEFAULT_SWEEP_PAGE_SIZE;

pub use dispatcher::Dispatcher;
pub use trigger::{Disposition, Trigger};

/// Wires the engine into the background tasks and HTTP API.
pub struct Daemon {
    config: FixityConfig,
    engine: Engine,
}

impl Daemon {
    pub fn new(config: FixityConfig, engine: Engine) -> Self {
        Self { config, engine }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.engine.verifier().clone(),
            self.engine.notifier().clone(),
            self.engine.clock().clone(),
        )
        .with_retry(self.config.retry_config())
        .with_container_prefix(self.config.daemon.container_prefix.clone())
        .with_deployment(self.engine.deployment().map(str::to_string))
    }

    /// Runs until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind, the metrics exporter
    /// cannot be installed, or the server fails.
    pub async fn serve(self) -> Result<()> {
        let daemon = &self.config.daemon;

        if let Some(addr) = daemon.metrics_listen {
            metrics::install_prometheus(addr)?;
        }

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let (detector_shutdown_tx, _) = broadcast::channel::<()>(1);
        let (trigger_tx, trigger_rx) = mpsc::channel::<Trigger>(daemon.queue_capacity.max(1));
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        // Subscribe before anything can write to the ledger
        let detector = tokio::spawn(self.engine.failure_detector().run(
            self.engine.verifier().ledger().subscribe(),
            detector_shutdown_tx.subscribe(),
        ));

        tasks.push(tokio::spawn(Arc::new(self.dispatcher()).run(
            trigger_rx,
            daemon.max_concurrency,
            shutdown_tx.subscribe(),
        )));

        if daemon.watch_schedule {
            let schedule = &self.config.schedule;
            let watcher = ExpiryWatcher::new(
                self.engine.verifier().schedule().clone(),
                self.engine.clock().clone(),
                Duration::from_secs(schedule.poll_interval_secs.max(1)),
                schedule.batch_size.max(1),
            );
            let (due_tx, due_rx) = mpsc::channel::<ScheduleEntry>(schedule.batch_size.max(1));
            tasks.push(tokio::spawn(watcher.run(due_tx, shutdown_tx.subscribe())));
            tasks.push(tokio::spawn(forward_due(
                due_rx,
                trigger_tx.clone(),
                self.engine.verifier().schedule().clone(),
            )));
        }

        let state = Arc::new(http::AppState::new(
            self.engine.clone(),
            trigger_tx,
            DEFAULT_SWEEP_PAGE_SIZE,
        ));
        let app = http::router(state);

        let listener = tokio::net::TcpListener::bind(daemon.listen)
            .await
            .with_context(|| format!("Failed to bind {}", daemon.listen))?;
        info!(listen = %daemon.listen, "Fixity daemon listening");

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                }
                info!("Shutdown requested");
            })
            .await
            .context("HTTP server failed");

        // Receivers may already be gone
        let _ = shutdown_tx.send(());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task panicked");
            }
        }
        let _ = detector_shutdown_tx.send(());
        if let Err(e) = detector.await {
            warn!(error = %e, "Failure detector panicked");
        }
        info!("Fixity daemon stopped");
        served
    }
}

/// Turns expired schedule entries into verification triggers.
///
/// Ends when the watcher drops its sender or the dispatcher queue closes.
/// Entries that cannot be handed to the dispatcher are put back into
/// `schedule`.
async fn forward_due(
    mut due: mpsc::Receiver<ScheduleEntry>,
    triggers: mpsc::Sender<Trigger>,
    schedule: Arc<dyn ScheduleStore>,
) {
    while let Some(entry) = due.recv().await {
        let trigger = Trigger::VerificationDue {
            object: entry.object().clone(),
        };
        if triggers.send(trigger).await.is_err() {
            debug!("Trigger queue closed, stopping schedule forwarder");
            due.close();
            restore(schedule.as_ref(), entry).await;
            while let Ok(entry) = due.try_recv() {
                restore(schedule.as_ref(), entry).await;
            }
            break;
        }
    }
}

async fn restore(schedule: &dyn ScheduleStore, entry: ScheduleEntry) {
    let object = entry.object().clone();
    if let Err(e) = schedule.put(entry).await {
        warn!(
            container = object.container(),
            key = object.key(),
            error = %e,
            "Failed to restore undelivered schedule entry"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::object::ObjectRef;
    use crate::schedule::{MemoryScheduleStore, SystemClock};
    use crate::store::MemoryObjectStore;
    use chrono::Utc;

    #[tokio::test]
    async fn test_forward_due_emits_verification_triggers() {
        let (due_tx, due_rx) = mpsc::channel(4);
        let (trigger_tx, mut trigger_rx) = mpsc::channel(4);
        let schedule = Arc::new(MemoryScheduleStore::new());
        let handle = tokio::spawn(forward_due(due_rx, trigger_tx, schedule.clone()));

        let object = ObjectRef::new("bucket", "k").unwrap();
        due_tx
            .send(ScheduleEntry::new(object.clone(), Utc::now()))
            .await
            .unwrap();
        drop(due_tx);

        assert_eq!(
            trigger_rx.recv().await.unwrap(),
            Trigger::VerificationDue { object }
        );
        handle.await.unwrap();
        assert_eq!(schedule.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_forward_due_restores_entries_when_queue_closed() {
        let schedule = Arc::new(MemoryScheduleStore::new());
        let (due_tx, due_rx) = mpsc::channel(4);
        let (trigger_tx, trigger_rx) = mpsc::channel::<Trigger>(4);
        drop(trigger_rx);

        let first = ObjectRef::new("bucket", "first").unwrap();
        let second = ObjectRef::new("bucket", "second").unwrap();
        let due_at = Utc::now();
        due_tx
            .send(ScheduleEntry::new(first.clone(), due_at))
            .await
            .unwrap();
        due_tx
            .send(ScheduleEntry::new(second.clone(), due_at))
            .await
            .unwrap();

        forward_due(due_rx, trigger_tx, schedule.clone()).await;

        let entry = schedule.get(&first).await.unwrap().unwrap();
        assert_eq!(entry.next_checksum_date(), due_at);
        assert!(schedule.get(&second).await.unwrap().is_some());
        // The watcher sees a closed channel and restores on its own
        assert!(due_tx.is_closed());
    }

    #[tokio::test]
    async fn test_watcher_entry_survives_closed_trigger_queue() {
        let schedule = Arc::new(MemoryScheduleStore::new());
        let object = ObjectRef::new("bucket", "k").unwrap();
        let due_at = Utc::now() - chrono::Duration::minutes(1);
        schedule
            .put(ScheduleEntry::new(object.clone(), due_at))
            .await
            .unwrap();

        let (trigger_tx, trigger_rx) = mpsc::channel::<Trigger>(4);
        drop(trigger_rx);
        let (due_tx, due_rx) = mpsc::channel(4);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let watcher = ExpiryWatcher::new(
            schedule.clone(),
            Arc::new(SystemClock),
            Duration::from_millis(5),
            8,
        );
        let watcher_task = tokio::spawn(watcher.run(due_tx, shutdown_tx.subscribe()));
        forward_due(due_rx, trigger_tx, schedule.clone()).await;

        let _ = shutdown_tx.send(());
        watcher_task.await.unwrap();
        let entry = schedule.get(&object).await.unwrap().unwrap();
        assert_eq!(entry.next_checksum_date(), due_at);
    }

    #[tokio::test]
    async fn test_dispatcher_takes_prefix_from_config() {
        let mut config = FixityConfig::default();
        config.daemon.container_prefix = Some("keep-".to_string());
        let engine = Engine::new(
            Arc::new(MemoryObjectStore::new()),
            Ledger::memory(),
            Arc::new(MemoryScheduleStore::new()),
            &config,
        );
        let daemon = Daemon::new(config, engine);

        let disposition = daemon
            .dispatcher()
            .dispatch(Trigger::Deposited {
                object: ObjectRef::new("other", "k").unwrap(),
                tag: None,
            })
            .await;
        assert!(matches!(disposition, Disposition::Ignored(_)));
    }
}
