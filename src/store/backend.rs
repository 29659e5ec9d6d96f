//! Backend trait for object stores.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::object::ObjectRef;

/// Byte stream over an object's content.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Object metadata returned by [`ObjectStore::head`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHead {
    /// Size in bytes.
    pub size: u64,
    /// Integrity tag the store computed at write time, if it keeps one.
    ///
    /// Read as the expected MD5 of a deposit that carries no tag of its own.
    pub etag: Option<String>,
    /// Last modification time, if known.
    pub modified_at: Option<DateTime<Utc>>,
}

/// Read-side contract the fixity engine needs from an object store.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Retrieves object metadata without reading content.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata lookup itself fails.
    async fn head(&self, object: &ObjectRef) -> Result<Option<ObjectHead>>;

    /// Opens a byte stream over the object's content.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be opened.
    async fn open(&self, object: &ObjectRef) -> Result<Option<ObjectReader>>;
}
