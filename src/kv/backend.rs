//! Backend trait for ordered key-value storage.

use anyhow::Result;
use async_trait::async_trait;

/// One page of an ordered scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvPage {
    /// Entries in ascending key order.
    pub entries: Vec<(String, Vec<u8>)>,
    /// Last key of this page when more entries may follow.
    pub next: Option<String>,
}

/// Backend trait for key-value storage.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Writes are full overwrites; there is no compare-and-swap.
#[async_trait]
pub trait KvBackend: Send + Sync + 'static {
    /// Retrieves a value by key, `Ok(None)` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores a value, overwriting any existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Deletes a key.
    ///
    /// Returns the previous value if the key existed. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn delete(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Returns up to `limit` entries with keys strictly greater than `start_after`.
    ///
    /// `next` is set when the page is full, so a short page ends the scan.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn scan(&self, start_after: Option<&str>, limit: usize) -> Result<KvPage>;
}

impl KvPage {
    /// Builds a page from an ordered entry list, setting `next` when full.
    pub(crate) fn from_entries(entries: Vec<(String, Vec<u8>)>, limit: usize) -> Self {
        let next = if limit > 0 && entries.len() == limit {
            entries.last().map(|(k, _)| k.clone())
        } else {
            None
        };
        Self { entries, next }
    }
}
