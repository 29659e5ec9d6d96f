//! Trigger dispatch with re-delivery.
//!
//! The verifier never retries. The dispatcher plays the transport's part:
//! transient failures are re-delivered with backoff, deposits only while
//! the object still exists, and verifications that still fail are reported
//! as processing failures.

use std::fmt;
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::trigger::{Disposition, Trigger};
use crate::error::Error;
use crate::failure::{Notification, NotificationKind, Notifier};
use crate::metrics;
use crate::object::ObjectRef;
use crate::reliability::{RetryConfig, retry_async};
use crate::schedule::{Clock, ScheduleEntry, ScheduleStore};
use crate::verifier::Verifier;

/// Deposit failure classified for re-delivery.
#[derive(Debug)]
enum DepositAttempt {
    Retry(Error),
    /// The object is gone; re-delivering cannot succeed.
    Vanished(Error),
}

impl DepositAttempt {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Retry(e) if e.is_transient())
    }
}

impl fmt::Display for DepositAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry(e) | Self::Vanished(e) => e.fmt(f),
        }
    }
}

/// Routes triggers to the verifier.
pub struct Dispatcher {
    verifier: Verifier,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    container_prefix: Option<String>,
    deployment: Option<String>,
}

impl Dispatcher {
    pub fn new(verifier: Verifier, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            verifier,
            notifier,
            clock,
            retry: RetryConfig::default(),
            container_prefix: None,
            deployment: None,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_container_prefix(mut self, prefix: Option<String>) -> Self {
        self.container_prefix = prefix.filter(|p| !p.is_empty());
        self
    }

    #[must_use]
    pub fn with_deployment(mut self, deployment: Option<String>) -> Self {
        self.deployment = deployment;
        self
    }

    /// Handles one trigger to completion.
    pub async fn dispatch(&self, trigger: Trigger) -> Disposition {
        let kind = trigger.kind();
        let disposition = match trigger {
            Trigger::Deposited { object, tag } => self.deposit(&object, tag.as_deref()).await,
            Trigger::VerificationDue { object } => self.verify(&object).await,
            Trigger::Deleted { object } => self.forget(&object).await,
        };
        metrics::record_trigger(kind, disposition.as_str());
        disposition
    }

    async fn deposit(&self, object: &ObjectRef, tag: Option<&str>) -> Disposition {
        if let Some(prefix) = &self.container_prefix
            && !object.container().starts_with(prefix.as_str())
        {
            debug!(
                container = object.container(),
                key = object.key(),
                prefix = %prefix,
                "Ignoring deposit outside container prefix"
            );
            return Disposition::Ignored(format!("container does not start with '{prefix}'"));
        }

        let result = retry_async(
            self.retry.clone(),
            "deposit",
            || async move {
                match self.verifier.deposit(object, tag).await {
                    Ok(record) => Ok(record),
                    Err(e) if e.is_transient() && !self.object_exists(object).await => {
                        Err(DepositAttempt::Vanished(e))
                    },
                    Err(e) => Err(DepositAttempt::Retry(e)),
                }
            },
            DepositAttempt::is_retryable,
        )
        .await;

        match result {
            Ok(_) => Disposition::Processed,
            Err(DepositAttempt::Vanished(e)) => {
                info!(
                    container = object.container(),
                    key = object.key(),
                    error = %e,
                    "Object no longer exists, dropping deposit"
                );
                Disposition::Dropped(e.to_string())
            },
            Err(DepositAttempt::Retry(e)) => {
                error!(
                    container = object.container(),
                    key = object.key(),
                    error = %e,
                    "Deposit failed"
                );
                Disposition::Failed(e.to_string())
            },
        }
    }

    async fn verify(&self, object: &ObjectRef) -> Disposition {
        let result = retry_async(
            self.retry.clone(),
            "verify",
            || self.verifier.verify(object),
            Error::is_transient,
        )
        .await;

        match result {
            Ok(_) => Disposition::Processed,
            Err(e) => {
                error!(
                    container = object.container(),
                    key = object.key(),
                    error = %e,
                    "Verification could not be processed"
                );
                self.report_processing_failure(object, &e).await;
                Disposition::Failed(e.to_string())
            },
        }
    }

    async fn forget(&self, object: &ObjectRef) -> Disposition {
        let result = retry_async(
            self.retry.clone(),
            "forget",
            || self.verifier.forget(object),
            Error::is_transient,
        )
        .await;

        match result {
            Ok(()) => Disposition::Processed,
            Err(e) => {
                error!(
                    container = object.container(),
                    key = object.key(),
                    error = %e,
                    "Failed to stop tracking deleted object"
                );
                Disposition::Failed(e.to_string())
            },
        }
    }

    async fn object_exists(&self, object: &ObjectRef) -> bool {
        match self.verifier.calculator().store().head(object).await {
            Ok(head) => head.is_some(),
            // Unknown; keep re-delivering
            Err(_) => true,
        }
    }

    async fn report_processing_failure(&self, object: &ObjectRef, error: &Error) {
        let notification = Notification::new(
            NotificationKind::ProcessingFailure,
            object,
            self.clock.now(),
            error.to_string(),
        )
        .with_deployment(self.deployment.clone());

        let delivered = match self.notifier.notify(&notification).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to deliver processing failure notification");
                false
            },
        };
        metrics::record_notification(notification.kind.as_str(), delivered);
    }

    /// Hands back a trigger that was queued but never dispatched.
    async fn requeue(&self, trigger: Trigger) {
        let kind = trigger.kind();
        match trigger {
            Trigger::VerificationDue { object } => {
                let entry = ScheduleEntry::new(object.clone(), self.clock.now());
                match self.verifier.schedule().put(entry).await {
                    Ok(()) => {
                        debug!(
                            container = object.container(),
                            key = object.key(),
                            "Returned queued verification to the schedule"
                        );
                        metrics::record_trigger(kind, "requeued");
                    },
                    Err(e) => {
                        error!(
                            container = object.container(),
                            key = object.key(),
                            error = %e,
                            "Failed to return queued verification to the schedule"
                        );
                        metrics::record_trigger(kind, "abandoned");
                    },
                }
            },
            Trigger::Deposited { object, .. } | Trigger::Deleted { object } => {
                warn!(
                    kind,
                    container = object.container(),
                    key = object.key(),
                    "Dropping queued trigger at shutdown"
                );
                metrics::record_trigger(kind, "abandoned");
            },
        }
    }

    /// Consumes triggers with at most `max_concurrency` in flight.
    ///
    /// On shutdown or when the channel closes, stops accepting and waits for
    /// in-flight triggers to finish. Verification triggers still queued at
    /// shutdown are put back into the schedule as due now.
    pub async fn run(
        self: Arc<Self>,
        mut triggers: mpsc::Receiver<Trigger>,
        max_concurrency: usize,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let mut in_flight = JoinSet::new();

        info!(max_concurrency, "Trigger dispatcher started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    debug!("Dispatcher received shutdown signal");
                    break;
                }
                trigger = triggers.recv() => {
                    let Some(trigger) = trigger else {
                        debug!("Trigger channel closed");
                        break;
                    };
                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                        break;
                    };
                    let this = self.clone();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        this.dispatch(trigger).await
                    });
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Trigger task panicked");
                    }
                }
            }
        }

        triggers.close();
        while let Ok(trigger) = triggers.try_recv() {
            self.requeue(trigger).await;
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Trigger task panicked");
            }
        }
        info!("Trigger dispatcher stopped");
    }
}
