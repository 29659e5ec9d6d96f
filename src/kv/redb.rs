//! Redb-backed KV storage backend.
//!
//! Provides persistent key-value storage using redb with ACID guarantees.

use super::backend::{KvBackend, KvPage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redb::{Database, ReadableDatabase, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const RECORDS_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("records");

/// Redb-backed key-value storage backend.
///
/// `RedbBackend` is `Clone` and can be shared across threads. Every call runs
/// its transaction on the blocking pool.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Opens or creates a redb database at the given path.
    ///
    /// Creates parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created, or if
    /// the initialization transaction fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create ledger directory: {}", parent.display())
            })?;
        }

        let db = Database::create(path)
            .with_context(|| format!("Failed to open ledger database: {}", path.display()))?;

        // Create the table up front so read transactions never see it missing
        let write_txn = db
            .begin_write()
            .context("Failed to begin initialization transaction")?;
        {
            let _table = write_txn
                .open_table(RECORDS_TABLE)
                .context("Failed to initialize records table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initialization transaction")?;

        Ok(Self { db: Arc::new(db) })
    }

    fn get_sync(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(RECORDS_TABLE)
            .context("Failed to open records table")?;

        let value = table
            .get(key)
            .with_context(|| format!("Failed to read key '{key}'"))?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    fn put_sync(&self, key: &str, value: &[u8]) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(RECORDS_TABLE)
                .context("Failed to open records table")?;
            table
                .insert(key, value)
                .with_context(|| format!("Failed to insert key '{key}'"))?;
        }
        write_txn
            .commit()
            .context("Failed to commit put transaction")?;
        Ok(())
    }

    fn delete_sync(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        let removed = {
            let mut table = write_txn
                .open_table(RECORDS_TABLE)
                .context("Failed to open records table")?;
            table
                .remove(key)
                .with_context(|| format!("Failed to remove key '{key}'"))?
                .map(|guard| guard.value().to_vec())
        };
        write_txn
            .commit()
            .context("Failed to commit delete transaction")?;
        Ok(removed)
    }

    fn scan_sync(&self, start_after: Option<&str>, limit: usize) -> Result<KvPage> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(RECORDS_TABLE)
            .context("Failed to open records table")?;

        let start = start_after.unwrap_or("");
        let mut entries = Vec::with_capacity(limit.min(1024));
        for item in table
            .range::<&str>(start..)
            .context("Failed to scan records table")?
        {
            if entries.len() >= limit {
                break;
            }
            let (key, value) = item.context("Failed to read record entry")?;
            let key = key.value();
            if start_after == Some(key) {
                continue;
            }
            entries.push((key.to_string(), value.value().to_vec()));
        }

        Ok(KvPage::from_entries(entries, limit))
    }
}

#[async_trait]
impl KvBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.get_sync(&key))
            .await
            .context("Task join error")?
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.put_sync(&key, &value))
            .await
            .context("Task join error")?
    }

    async fn delete(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.delete_sync(&key))
            .await
            .context("Task join error")?
    }

    async fn scan(&self, start_after: Option<&str>, limit: usize) -> Result<KvPage> {
        let backend = self.clone();
        let start_after = start_after.map(str::to_string);
        tokio::task::spawn_blocking(move || backend.scan_sync(start_after.as_deref(), limit))
            .await
            .context("Task join error")?
    }
}
