//! Deposit and re-verification state machine.
//!
//! Per object: `NEW` (no record) → `VERIFIED_OK` ↔ `VERIFIED_FAILED`, observable
//! through the ledger's [`ChecksumRecord`]. Digest failures and checksum
//! mismatches are recorded outcomes. Only ledger and schedule I/O failures
//! (and a verification with no prior record) are returned as errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::checksum::{DigestAlgorithm, DigestCalculator};
use crate::error::{Error, Result, StorageResultExt as _};
use crate::ledger::{ChecksumRecord, Ledger};
use crate::metrics;
use crate::object::ObjectRef;
use crate::schedule::{Clock, JitteredScheduler, ScheduleEntry, ScheduleStore, SystemClock};

/// What happens to the schedule after a failed verification.
///
/// Failed deposits are never rescheduled under either policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// No new schedule entry; the object waits for operator action.
    #[default]
    Hold,
    /// Schedule the next check as if the verification had passed.
    Reschedule,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hold => "hold",
            Self::Reschedule => "reschedule",
        })
    }
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hold" => Ok(Self::Hold),
            "reschedule" => Ok(Self::Reschedule),
            other => Err(Error::Config(format!(
                "unknown failure policy '{other}' (expected hold or reschedule)"
            ))),
        }
    }
}

/// Result of [`Verifier::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub passed: bool,
    pub record: ChecksumRecord,
}

/// Normalizes a store-supplied integrity tag.
///
/// Strips surrounding quotes and whitespace and lowercases. Returns `None` for
/// an empty tag and for multi-part tags (containing `-`), which are not
/// comparable to a whole-object digest.
pub fn comparable_tag(tag: &str) -> Option<String> {
    let tag = tag.trim().trim_matches('"').trim();
    if tag.is_empty() || tag.contains('-') {
        None
    } else {
        Some(tag.to_ascii_lowercase())
    }
}

/// Orchestrates the digest calculator, ledger and schedule store.
#[derive(Clone)]
pub struct Verifier {
    calculator: DigestCalculator,
    ledger: Ledger,
    schedule: Arc<dyn ScheduleStore>,
    scheduler: JitteredScheduler,
    clock: Arc<dyn Clock>,
    failure_policy: FailurePolicy,
}

impl Verifier {
    pub fn new(calculator: DigestCalculator, ledger: Ledger, schedule: Arc<dyn ScheduleStore>) -> Self {
        Self {
            calculator,
            ledger,
            schedule,
            scheduler: JitteredScheduler::default(),
            clock: Arc::new(SystemClock),
            failure_policy: FailurePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_scheduler(mut self, scheduler: JitteredScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn schedule(&self) -> &Arc<dyn ScheduleStore> {
        &self.schedule
    }

    pub fn calculator(&self) -> &DigestCalculator {
        &self.calculator
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Records the initial checksum of a newly ingested object.
    ///
    /// Always writes a ledger record, even when the digest cannot be computed.
    /// If `tag` is a single-part store-supplied digest it must match the
    /// computed one. Without a `tag`, an MD5 calculator checks against the
    /// etag the object store reports instead. Only a successful deposit is
    /// scheduled for re-verification.
    ///
    /// Safe to repeat: a second deposit recomputes and overwrites.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageIo`] if the ledger or schedule write fails.
    pub async fn deposit(&self, object: &ObjectRef, tag: Option<&str>) -> Result<ChecksumRecord> {
        let now = self.clock.now();
        let next_due = self.scheduler.next_due_date(now);

        let record = match self.calculator.compute_digest(object).await {
            Ok(checksum) => {
                let mut record = ChecksumRecord::new(object.clone(), checksum, now, next_due);
                if let Some(expected) = self.expected_tag(object, tag).await
                    && expected != record.checksum
                {
                    let message = format!(
                        "checksum does not match etag: calculated={} etag={expected}",
                        record.checksum
                    );
                    record.mark_failed(message);
                }
                record
            },
            Err(e) => {
                let mut record = ChecksumRecord::new(object.clone(), "", now, next_due);
                record.mark_failed(e.to_string());
                record
            },
        };

        self.ledger.put(&record).await?;

        if record.is_ok() {
            self.reschedule(&record).await?;
            info!(
                container = object.container(),
                key = object.key(),
                checksum = %record.checksum,
                next_checksum_date = %record.next_checksum_date,
                "Deposited object"
            );
        } else {
            warn!(
                container = object.container(),
                key = object.key(),
                message = record.message(),
                "Deposit recorded a failure"
            );
        }

        metrics::record_deposit(metrics::outcome(record.is_ok()));
        Ok(record)
    }

    /// Recomputes an object's digest and compares it with the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordNotFound`] if the object was never deposited and
    /// [`Error::StorageIo`] if a ledger or schedule operation fails.
    pub async fn verify(&self, object: &ObjectRef) -> Result<Verification> {
        let mut record = self.ledger.get(object).await?;
        let stored = std::mem::take(&mut record.checksum);

        let now = self.clock.now();
        record.last_checksum_date = now;
        record.next_checksum_date = self.scheduler.next_due_date(now);

        match self.calculator.compute_digest(object).await {
            Ok(calculated) if calculated == stored => {
                record.checksum = calculated;
                record.mark_ok();
            },
            Ok(calculated) => {
                record.mark_failed(format!(
                    "Checksum mismatch: calculated={calculated}, stored={stored}"
                ));
                // The stored value is the known-good reference; keep it
                record.checksum = stored;
            },
            Err(e) => {
                record.checksum = stored;
                record.mark_failed(e.to_string());
            },
        }

        let passed = record.is_ok();
        if let Err(e) = self.ledger.put(&record).await {
            let outcome = if passed { "passed" } else { "failed" };
            warn!(
                container = object.container(),
                key = object.key(),
                outcome,
                message = record.message(),
                error = %e,
                "Verification outcome could not be recorded"
            );
            return Err(match e {
                Error::StorageIo { context, source } => Error::StorageIo {
                    context: format!("{context} (verification {outcome})"),
                    source,
                },
                other => other,
            });
        }

        if passed || self.failure_policy == FailurePolicy::Reschedule {
            self.reschedule(&record).await?;
        }

        if passed {
            info!(
                container = object.container(),
                key = object.key(),
                next_checksum_date = %record.next_checksum_date,
                "Verified object"
            );
        } else {
            warn!(
                container = object.container(),
                key = object.key(),
                message = record.message(),
                policy = %self.failure_policy,
                "Verification failed"
            );
        }

        metrics::record_verification(metrics::outcome(passed));
        Ok(Verification { passed, record })
    }

    /// Stops tracking a deleted object: removes its ledger record and any
    /// pending schedule entry. Both removals are idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageIo`] if either removal fails.
    pub async fn forget(&self, object: &ObjectRef) -> Result<()> {
        self.ledger.delete(object).await?;
        self.schedule
            .delete(object)
            .await
            .storage_context(format!("schedule delete {object}"))?;
        info!(
            container = object.container(),
            key = object.key(),
            "Stopped tracking object"
        );
        Ok(())
    }

    /// The digest a deposit must match, if one is known.
    async fn expected_tag(&self, object: &ObjectRef, tag: Option<&str>) -> Option<String> {
        if let Some(tag) = tag {
            return comparable_tag(tag);
        }
        // Store etags are MD5 digests
        if self.calculator.algorithm() != DigestAlgorithm::Md5 {
            return None;
        }
        match self.calculator.store().head(object).await {
            Ok(head) => head?.etag.as_deref().and_then(comparable_tag),
            Err(e) => {
                debug!(
                    container = object.container(),
                    key = object.key(),
                    error = %e,
                    "Could not read etag, depositing without a check"
                );
                None
            },
        }
    }

    async fn reschedule(&self, record: &ChecksumRecord) -> Result<()> {
        let entry = ScheduleEntry::new(record.object().clone(), record.next_checksum_date);
        self.schedule
            .put(entry)
            .await
            .storage_context(format!("schedule put {}", record.object()))
    }
}
