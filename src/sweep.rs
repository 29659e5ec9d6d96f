//! Batch re-verification.
//!
//! A [`Sweeper`] pages through the whole ledger with a continuation cursor
//! and re-verifies the records a [`SweepFilter`] selects. Each record is
//! processed on its own; an error is logged and counted and the sweep moves
//! on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::ledger::{ChecksumRecord, LedgerCursor};
use crate::metrics;
use crate::schedule::Clock;
use crate::verifier::Verifier;

/// Default ledger page size.
pub const DEFAULT_SWEEP_PAGE_SIZE: usize = 100;

/// Which records a sweep re-verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepFilter {
    /// `next_checksum_date <= now`.
    #[default]
    Overdue,
    /// Records whose last check failed.
    Failed,
    All,
}

impl SweepFilter {
    pub fn matches(&self, record: &ChecksumRecord, now: chrono::DateTime<chrono::Utc>) -> bool {
        match self {
            Self::Overdue => record.is_due(now),
            Self::Failed => !record.is_ok(),
            Self::All => true,
        }
    }
}

impl fmt::Display for SweepFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Overdue => "overdue",
            Self::Failed => "failed",
            Self::All => "all",
        })
    }
}

impl FromStr for SweepFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "overdue" => Ok(Self::Overdue),
            "failed" => Ok(Self::Failed),
            "all" => Ok(Self::All),
            other => Err(Error::Config(format!(
                "unknown sweep filter '{other}' (expected overdue, failed or all)"
            ))),
        }
    }
}

/// Outcome counts of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub pages: u64,
    pub scanned: u64,
    pub selected: u64,
    pub passed: u64,
    pub failed: u64,
    /// Records re-deposited because they had no checksum to compare against.
    pub redeposited: u64,
    /// Records that could not be processed (I/O errors, undecodable values).
    pub errors: u64,
}

impl SweepReport {
    pub fn processed(&self) -> u64 {
        self.passed + self.failed
    }
}

/// Pages through the ledger and re-verifies matching records.
pub struct Sweeper {
    verifier: Verifier,
    clock: Arc<dyn Clock>,
    page_size: usize,
}

impl Sweeper {
    pub fn new(verifier: Verifier, clock: Arc<dyn Clock>) -> Self {
        Self {
            verifier,
            clock,
            page_size: DEFAULT_SWEEP_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Runs one full pass over the ledger.
    ///
    /// # Errors
    ///
    /// Returns an error only if a ledger page cannot be read; per-record
    /// failures are counted in the report.
    pub async fn run(&self, filter: SweepFilter) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();
        let mut cursor: Option<LedgerCursor> = None;

        info!(filter = %filter, page_size = self.page_size, "Starting sweep");

        loop {
            let page = self
                .verifier
                .ledger()
                .scan(cursor.as_ref(), self.page_size)
                .await?;
            report.pages += 1;
            report.scanned += (page.records.len() + page.corrupt.len()) as u64;
            report.errors += page.corrupt.len() as u64;

            for record in page.records {
                if !filter.matches(&record, now) {
                    continue;
                }
                report.selected += 1;
                self.process(&record, &mut report).await;
            }

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        metrics::record_sweep(report.processed(), report.failed, report.errors);
        info!(
            filter = %filter,
            scanned = report.scanned,
            selected = report.selected,
            passed = report.passed,
            failed = report.failed,
            redeposited = report.redeposited,
            errors = report.errors,
            "Sweep finished"
        );
        Ok(report)
    }

    async fn process(&self, record: &ChecksumRecord, report: &mut SweepReport) {
        let object = record.object();

        // A deposit that never produced a digest has nothing to verify against
        let outcome = if record.checksum.is_empty() {
            report.redeposited += 1;
            self.verifier
                .deposit(object, None)
                .await
                .map(|record| record.is_ok())
        } else {
            self.verifier
                .verify(object)
                .await
                .map(|verification| verification.passed)
        };

        match outcome {
            Ok(true) => report.passed += 1,
            Ok(false) => report.failed += 1,
            Err(e) => {
                report.errors += 1;
                warn!(
                    container = object.container(),
                    key = object.key(),
                    error = %e,
                    "Sweep could not process record"
                );
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::DigestCalculator;
    use crate::kv::{KvBackend, MemoryBackend};
    use crate::ledger::Ledger;
    use crate::object::ObjectRef;
    use crate::schedule::{FixedClock, MemoryScheduleStore};
    use crate::store::MemoryObjectStore;
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        objects: Arc<MemoryObjectStore>,
        backend: Arc<MemoryBackend>,
        clock: Arc<FixedClock>,
        verifier: Verifier,
    }

    fn fixture() -> Fixture {
        let objects = Arc::new(MemoryObjectStore::new());
        let backend = Arc::new(MemoryBackend::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let verifier = Verifier::new(
            DigestCalculator::new(objects.clone()),
            Ledger::new(backend.clone()),
            Arc::new(MemoryScheduleStore::new()),
        )
        .with_clock(clock.clone());
        Fixture {
            objects,
            backend,
            clock,
            verifier,
        }
    }

    fn obj(key: &str) -> ObjectRef {
        ObjectRef::new("bucket", key).unwrap()
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!("overdue".parse::<SweepFilter>().unwrap(), SweepFilter::Overdue);
        assert_eq!("FAILED".parse::<SweepFilter>().unwrap(), SweepFilter::Failed);
        assert_eq!("all".parse::<SweepFilter>().unwrap(), SweepFilter::All);
        assert!("some".parse::<SweepFilter>().is_err());
    }

    #[tokio::test]
    async fn test_sweep_overdue_across_pages() {
        let fx = fixture();
        for i in 0..7 {
            let object = obj(&format!("k{i}"));
            fx.objects.put(&object, format!("content {i}"));
            fx.verifier.deposit(&object, None).await.unwrap();
        }

        let sweeper = Sweeper::new(fx.verifier.clone(), fx.clock.clone()).with_page_size(3);

        // Nothing is due yet
        let report = sweeper.run(SweepFilter::Overdue).await.unwrap();
        assert_eq!(report.scanned, 7);
        assert_eq!(report.selected, 0);
        assert_eq!(report.pages, 3);

        fx.clock.advance(Duration::days(365));
        fx.objects.put(&obj("k4"), "rotted");
        let report = sweeper.run(SweepFilter::Overdue).await.unwrap();
        assert_eq!(report.selected, 7);
        assert_eq!(report.passed, 6);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors, 0);

        // Only the failed record is picked up by a failed-only sweep
        let report = sweeper.run(SweepFilter::Failed).await.unwrap();
        assert_eq!(report.selected, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_sweep_redeposits_records_without_checksum() {
        let fx = fixture();
        let object = obj("late-arrival");
        let record = fx.verifier.deposit(&object, None).await.unwrap();
        assert!(record.checksum.is_empty());

        fx.objects.put(&object, "finally here");
        let sweeper = Sweeper::new(fx.verifier.clone(), fx.clock.clone());
        let report = sweeper.run(SweepFilter::Failed).await.unwrap();
        assert_eq!(report.redeposited, 1);
        assert_eq!(report.passed, 1);
        assert!(fx.verifier.ledger().get(&object).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_sweep_tolerates_bad_records() {
        let fx = fixture();
        let good = obj("good");
        fx.objects.put(&good, "fine");
        fx.verifier.deposit(&good, None).await.unwrap();
        fx.backend
            .put("bucket/garbage", b"{not a record".to_vec())
            .await
            .unwrap();

        let sweeper = Sweeper::new(fx.verifier.clone(), fx.clock.clone()).with_page_size(1);
        let report = sweeper.run(SweepFilter::All).await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.passed, 1);
    }
}
