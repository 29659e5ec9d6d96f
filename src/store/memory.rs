//! In-memory object store.
//!
//! Provides a fast, non-persistent object store using DashMap for
//! concurrent access. Ideal for testing, development, and embedded use cases.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use std::io::Cursor;

use super::backend::{ObjectHead, ObjectReader, ObjectStore};
use crate::checksum::DigestAlgorithm;
use crate::object::ObjectRef;

#[derive(Clone)]
struct MemoryObject {
    data: Bytes,
    head: ObjectHead,
}

/// In-memory object store using DashMap.
///
/// Every `put` records an MD5 integrity tag, the way single-part uploads
/// to S3-compatible stores report their ETag.
///
/// # Example
///
/// ```ignore
/// use fixity::store::MemoryObjectStore;
///
/// let store = MemoryObjectStore::new();
/// let head = store.put(&object, b"hello world".as_slice());
/// assert_eq!(head.size, 11);
/// ```
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<ObjectRef, MemoryObject>,
}

impl MemoryObjectStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object, replacing any previous content.
    pub fn put(&self, object: &ObjectRef, data: impl Into<Bytes>) -> ObjectHead {
        let data = data.into();
        let head = ObjectHead {
            size: data.len() as u64,
            etag: Some(DigestAlgorithm::Md5.digest_bytes(&data)),
            modified_at: Some(Utc::now()),
        };
        self.objects.insert(
            object.clone(),
            MemoryObject {
                data,
                head: head.clone(),
            },
        );
        head
    }

    /// Removes an object. Returns `true` if it existed.
    pub fn delete(&self, object: &ObjectRef) -> bool {
        self.objects.remove(object).is_some()
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn head(&self, object: &ObjectRef) -> Result<Option<ObjectHead>> {
        Ok(self.objects.get(object).map(|entry| entry.head.clone()))
    }

    async fn open(&self, object: &ObjectRef) -> Result<Option<ObjectReader>> {
        Ok(self.objects.get(object).map(|entry| {
            let reader: ObjectReader = Box::new(Cursor::new(entry.data.clone()));
            reader
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn obj(key: &str) -> ObjectRef {
        ObjectRef::new("bucket", key).unwrap()
    }

    #[tokio::test]
    async fn test_put_and_head() {
        let store = MemoryObjectStore::new();
        let head = store.put(&obj("hello.txt"), b"hello world".as_slice());

        assert_eq!(head.size, 11);
        assert_eq!(
            head.etag.as_deref(),
            Some("5eb63bbbe01eeed093cb22bb8f5acdc3")
        );
        assert_eq!(store.head(&obj("hello.txt")).await.unwrap(), Some(head));
    }

    #[tokio::test]
    async fn test_open_streams_content() {
        let store = MemoryObjectStore::new();
        store.put(&obj("a.bin"), vec![1u8, 2, 3, 4]);

        let mut reader = store.open(&obj("a.bin")).await.unwrap().unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_missing_object() {
        let store = MemoryObjectStore::new();
        assert!(store.head(&obj("missing")).await.unwrap().is_none());
        assert!(store.open(&obj("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_and_delete() {
        let store = MemoryObjectStore::new();
        store.put(&obj("f"), b"original".as_slice());
        store.put(&obj("f"), b"updated".as_slice());
        assert_eq!(store.head(&obj("f")).await.unwrap().unwrap().size, 7);
        assert_eq!(store.len(), 1);

        assert!(store.delete(&obj("f")));
        assert!(!store.delete(&obj("f")));
        assert!(store.is_empty());
    }
}
