//! Filesystem-backed object store.
//!
//! Objects live at `<root>/<container>/<key>`. The filesystem keeps no
//! integrity tag, so [`ObjectHead::etag`] is always `None` here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::backend::{ObjectHead, ObjectReader, ObjectStore};
use super::validation::object_path;
use crate::object::ObjectRef;

/// Filesystem-backed object store.
///
/// `FilesystemObjectStore` is `Clone` and can be shared across tasks.
#[derive(Debug, Clone)]
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    /// Opens the store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create object root: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes an object, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the write fails.
    pub async fn put(&self, object: &ObjectRef, data: &[u8]) -> Result<ObjectHead> {
        let path = object_path(&self.root, object)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create parent directories for: {object}"))?;
        }
        fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write object: {object}"))?;

        Ok(ObjectHead {
            size: data.len() as u64,
            etag: None,
            modified_at: Some(Utc::now()),
        })
    }

    /// Removes an object. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or removal fails.
    pub async fn delete(&self, object: &ObjectRef) -> Result<bool> {
        let path = object_path(&self.root, object)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete object: {object}")),
        }
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn head(&self, object: &ObjectRef) -> Result<Option<ObjectHead>> {
        let path = object_path(&self.root, object)?;
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to get object metadata: {object}"));
            },
        };

        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(ObjectHead {
            size: metadata.len(),
            etag: None,
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        }))
    }

    async fn open(&self, object: &ObjectRef) -> Result<Option<ObjectReader>> {
        let path = object_path(&self.root, object)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to open object: {object}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_put_head_open() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemObjectStore::open(tmp.path()).unwrap();
        let object = ObjectRef::new("archive", "nested/dir/file.txt").unwrap();

        store.put(&object, b"hello world").await.unwrap();
        assert!(tmp.path().join("archive/nested/dir/file.txt").exists());

        let head = store.head(&object).await.unwrap().unwrap();
        assert_eq!(head.size, 11);
        assert!(head.etag.is_none());
        assert!(head.modified_at.is_some());

        let mut reader = store.open(&object).await.unwrap().unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "hello world");
    }

    #[tokio::test]
    async fn test_missing_and_delete() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemObjectStore::open(tmp.path()).unwrap();
        let object = ObjectRef::new("archive", "gone.txt").unwrap();

        assert!(store.head(&object).await.unwrap().is_none());
        assert!(store.open(&object).await.unwrap().is_none());
        assert!(!store.delete(&object).await.unwrap());

        store.put(&object, b"x").await.unwrap();
        assert!(store.delete(&object).await.unwrap());
        assert!(store.head(&object).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_directory_is_not_an_object() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemObjectStore::open(tmp.path()).unwrap();
        store
            .put(&ObjectRef::new("archive", "dir/file").unwrap(), b"x")
            .await
            .unwrap();

        let dir = ObjectRef::new("archive", "dir").unwrap();
        assert!(store.head(&dir).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemObjectStore::open(tmp.path()).unwrap();
        let attack = ObjectRef::new("archive", "../../etc/passwd").unwrap();
        assert!(store.head(&attack).await.is_err());
        assert!(store.put(&attack, b"x").await.is_err());
    }
}
