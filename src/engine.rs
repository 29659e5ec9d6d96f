//! Assembles the verification pipeline from a [`FixityConfig`].

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::checksum::DigestCalculator;
use crate::config::{FixityConfig, ObjectBackend, StateBackend};
use crate::failure::{FailureDetector, FanoutNotifier, LogNotifier, Notifier, WebhookNotifier};
use crate::ledger::Ledger;
use crate::schedule::{
    Clock, MemoryScheduleStore, RedbScheduleStore, ScheduleStore, SystemClock,
};
use crate::store::{FilesystemObjectStore, MemoryObjectStore, ObjectStore};
use crate::sweep::Sweeper;
use crate::verifier::Verifier;

/// The wired-up components shared by the CLI and the daemon.
#[derive(Clone)]
pub struct Engine {
    verifier: Verifier,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    deployment: Option<String>,
}

impl Engine {
    /// Opens the configured stores and builds the verifier.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be opened or the webhook client
    /// cannot be built.
    pub fn from_config(config: &FixityConfig) -> Result<Self> {
        let objects: Arc<dyn ObjectStore> = match config.storage.backend {
            ObjectBackend::Filesystem => Arc::new(
                FilesystemObjectStore::open(&config.storage.root).with_context(|| {
                    format!(
                        "Failed to open object store at {}",
                        config.storage.root.display()
                    )
                })?,
            ),
            ObjectBackend::Memory => Arc::new(MemoryObjectStore::new()),
        };

        let ledger = match config.ledger.backend {
            StateBackend::Redb => Ledger::open(&config.ledger.path)?,
            StateBackend::Memory => Ledger::memory(),
        };

        let schedule: Arc<dyn ScheduleStore> = match config.schedule.backend {
            StateBackend::Redb => Arc::new(RedbScheduleStore::open(&config.schedule.path)?),
            StateBackend::Memory => Arc::new(MemoryScheduleStore::new()),
        };

        let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
        if let Some(url) = config.webhook_url()? {
            let timeout = Duration::from_secs(config.notifications.timeout_secs);
            notifiers.push(Arc::new(WebhookNotifier::new(url, timeout)?));
        }

        Ok(Self::new(objects, ledger, schedule, config)
            .with_notifier(Arc::new(FanoutNotifier::new(notifiers))))
    }

    /// Builds an engine over explicit stores, taking tuning from `config`.
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        ledger: Ledger,
        schedule: Arc<dyn ScheduleStore>,
        config: &FixityConfig,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let calculator = DigestCalculator::new(objects)
            .with_algorithm(config.checksum.algorithm)
            .with_max_object_size(config.checksum.max_object_size);
        let verifier = Verifier::new(calculator, ledger, schedule)
            .with_scheduler(config.scheduler())
            .with_clock(clock.clone())
            .with_failure_policy(config.verification.failure_policy);

        Self {
            verifier,
            clock,
            notifier: Arc::new(LogNotifier),
            deployment: config.notifications.deployment.clone(),
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.verifier = self.verifier.with_clock(clock.clone());
        self.clock = clock;
        self
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn deployment(&self) -> Option<&str> {
        self.deployment.as_deref()
    }

    pub fn sweeper(&self, page_size: usize) -> Sweeper {
        Sweeper::new(self.verifier.clone(), self.clock.clone()).with_page_size(page_size)
    }

    pub fn failure_detector(&self) -> FailureDetector {
        FailureDetector::new(self.notifier.clone())
            .with_deployment(self.deployment.clone())
            .with_ledger(self.verifier.ledger().clone())
    }
}
