//! Verification ledger.
//!
//! Durable per-object checksum state over a [`KvBackend`], keyed by
//! `container/key`. Writes are last-writer-wins full overwrites. Every `put`
//! and `delete` publishes a [`RecordChange`] on a broadcast feed that the
//! failure detector consumes.

mod record;

pub use record::{ChecksumRecord, OK_MESSAGE};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::{Error, Result, StorageResultExt as _};
use crate::kv::{KvBackend, MemoryBackend, RedbBackend};
use crate::object::ObjectRef;

/// Buffered changes per subscriber before the slowest one starts lagging.
pub const CHANGE_FEED_CAPACITY: usize = 1024;

/// A before/after image pair for one ledger write.
///
/// `before` is read just ahead of the write, so under concurrent writers to
/// the same key it may be stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordChange {
    pub object: ObjectRef,
    pub before: Option<ChecksumRecord>,
    /// `None` for deletions.
    pub after: Option<ChecksumRecord>,
    pub at: DateTime<Utc>,
}

/// Opaque continuation cursor for [`Ledger::scan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerCursor(String);

impl LedgerCursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LedgerCursor {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for LedgerCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of ledger records.
#[derive(Debug, Clone, Default)]
pub struct LedgerPage {
    pub records: Vec<ChecksumRecord>,
    /// Storage keys whose value could not be decoded.
    pub corrupt: Vec<String>,
    pub next: Option<LedgerCursor>,
}

/// The verification ledger.
#[derive(Clone)]
pub struct Ledger {
    backend: Arc<dyn KvBackend>,
    changes: broadcast::Sender<RecordChange>,
}

impl Ledger {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { backend, changes }
    }

    /// In-memory ledger.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Persistent ledger stored in a redb file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(RedbBackend::open(path)?)))
    }

    /// Subscribes to the change feed.
    pub fn subscribe(&self) -> broadcast::Receiver<RecordChange> {
        self.changes.subscribe()
    }

    /// Loads the record for `object`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordNotFound`] if there is no record and
    /// [`Error::StorageIo`] if the backend fails or the stored value is corrupt.
    pub async fn get(&self, object: &ObjectRef) -> Result<ChecksumRecord> {
        self.find(object)
            .await?
            .ok_or_else(|| Error::record_not_found(object))
    }

    /// Loads the record for `object`, `Ok(None)` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageIo`] if the backend fails or the stored value is corrupt.
    pub async fn find(&self, object: &ObjectRef) -> Result<Option<ChecksumRecord>> {
        let key = object.storage_key();
        let raw = self
            .backend
            .get(&key)
            .await
            .storage_context(format!("ledger get {key}"))?;
        raw.map(|bytes| decode(&key, &bytes)).transpose()
    }

    /// Overwrites the record keyed by its object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageIo`] if the backend fails.
    pub async fn put(&self, record: &ChecksumRecord) -> Result<()> {
        let object = record.object();
        let key = object.storage_key();

        // A corrupt previous value is overwritten rather than blocking the write
        let before = match self.find(object).await {
            Ok(before) => before,
            Err(Error::StorageIo { source, .. }) if source.is::<serde_json::Error>() => None,
            Err(e) => return Err(e),
        };

        let bytes = serde_json::to_vec(record)
            .map_err(|e| Error::storage(format!("encoding ledger record {key}"), e))?;
        self.backend
            .put(&key, bytes)
            .await
            .storage_context(format!("ledger put {key}"))?;

        tracing::debug!(
            container = object.container(),
            key = object.key(),
            success = record.is_ok(),
            "Ledger record written"
        );

        self.publish(RecordChange {
            object: object.clone(),
            before,
            after: Some(record.clone()),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Removes the record for `object`. Missing records are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageIo`] if the backend fails.
    pub async fn delete(&self, object: &ObjectRef) -> Result<()> {
        let key = object.storage_key();
        let removed = self
            .backend
            .delete(&key)
            .await
            .storage_context(format!("ledger delete {key}"))?;

        if let Some(bytes) = removed {
            let before = serde_json::from_slice(&bytes).ok();
            self.publish(RecordChange {
                object: object.clone(),
                before,
                after: None,
                at: Utc::now(),
            });
        }
        Ok(())
    }

    /// Returns up to `limit` records after `cursor`, in storage-key order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageIo`] if the backend fails.
    pub async fn scan(&self, cursor: Option<&LedgerCursor>, limit: usize) -> Result<LedgerPage> {
        let page = self
            .backend
            .scan(cursor.map(LedgerCursor::as_str), limit)
            .await
            .storage_context("ledger scan")?;

        let mut records = Vec::with_capacity(page.entries.len());
        let mut corrupt = Vec::new();
        for (key, bytes) in page.entries {
            match decode(&key, &bytes) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping undecodable ledger record");
                    corrupt.push(key);
                },
            }
        }

        Ok(LedgerPage {
            records,
            corrupt,
            next: page.next.map(LedgerCursor),
        })
    }

    fn publish(&self, change: RecordChange) {
        // No subscribers is fine
        let _ = self.changes.send(change);
    }
}

fn decode(key: &str, bytes: &[u8]) -> Result<ChecksumRecord> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::storage(format!("decoding ledger record {key}"), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn obj(key: &str) -> ObjectRef {
        ObjectRef::new("bucket", key).unwrap()
    }

    fn record(key: &str) -> ChecksumRecord {
        let now = Utc::now();
        ChecksumRecord::new(obj(key), "d41d8cd98f00b204e9800998ecf8427e", now, now + Duration::days(1))
    }

    #[tokio::test]
    async fn test_get_missing_is_record_not_found() {
        let ledger = Ledger::memory();
        let err = ledger.get(&obj("missing")).await.unwrap_err();
        assert!(matches!(err, Error::RecordNotFound { .. }), "got {err:?}");
        assert!(ledger.find(&obj("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let ledger = Ledger::memory();
        let mut rec = record("a");
        ledger.put(&rec).await.unwrap();

        rec.mark_failed("Checksum mismatch");
        ledger.put(&rec).await.unwrap();

        let stored = ledger.get(&obj("a")).await.unwrap();
        assert!(!stored.is_ok());
        assert_eq!(stored.message(), "Checksum mismatch");
    }

    #[tokio::test]
    async fn test_delete_is_unconditional() {
        let ledger = Ledger::memory();
        ledger.delete(&obj("never-written")).await.unwrap();

        ledger.put(&record("a")).await.unwrap();
        ledger.delete(&obj("a")).await.unwrap();
        ledger.delete(&obj("a")).await.unwrap();
        assert!(ledger.find(&obj("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_change_feed_carries_before_and_after() {
        let ledger = Ledger::memory();
        let mut rx = ledger.subscribe();

        let mut rec = record("a");
        ledger.put(&rec).await.unwrap();
        rec.mark_failed("boom");
        ledger.put(&rec).await.unwrap();
        ledger.delete(&obj("a")).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(first.before.is_none());
        assert!(first.after.as_ref().unwrap().is_ok());

        let second = rx.recv().await.unwrap();
        assert!(second.before.as_ref().unwrap().is_ok());
        assert!(!second.after.as_ref().unwrap().is_ok());

        let third = rx.recv().await.unwrap();
        assert!(third.after.is_none());
        assert_eq!(third.object, obj("a"));
    }

    #[tokio::test]
    async fn test_scan_pages_through_redb() {
        let tmp = TempDir::new().unwrap();
        let ledger = Ledger::open(tmp.path().join("ledger.redb")).unwrap();
        for i in 0..5 {
            ledger.put(&record(&format!("k{i}"))).await.unwrap();
        }

        let first = ledger.scan(None, 2).await.unwrap();
        assert_eq!(first.records.len(), 2);
        let second = ledger.scan(first.next.as_ref(), 2).await.unwrap();
        assert_eq!(second.records[0].key(), "k2");
        let third = ledger.scan(second.next.as_ref(), 2).await.unwrap();
        assert_eq!(third.records.len(), 1);
        assert!(third.next.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_values_are_reported_not_fatal() {
        let backend = Arc::new(MemoryBackend::new());
        backend.put("bucket/bad", b"not json".to_vec()).await.unwrap();
        let ledger = Ledger::new(backend);
        ledger.put(&record("good")).await.unwrap();

        let page = ledger.scan(None, 10).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.corrupt, vec!["bucket/bad".to_string()]);

        // A corrupt value can still be overwritten
        ledger.put(&record("bad")).await.unwrap();
        assert!(ledger.get(&obj("bad")).await.unwrap().is_ok());
    }
}
