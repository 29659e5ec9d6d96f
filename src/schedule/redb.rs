//! Redb-backed schedule store.
//!
//! Entries live in one table keyed by `container/key`. A second table indexes
//! them by expiry with keys of the form `{expiry_millis:020}/{container/key}`,
//! so a range scan up to `now` yields exactly the expired entries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;
use std::sync::Arc;

use super::entry::ScheduleEntry;
use super::store::ScheduleStore;
use crate::object::ObjectRef;

const ENTRIES_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("schedule");
const DUE_TABLE: TableDefinition<'static, &'static str, &'static str> =
    TableDefinition::new("schedule_due");

fn due_millis(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp_millis()).unwrap_or(0)
}

fn due_key(expiry: DateTime<Utc>, storage_key: &str) -> String {
    format!("{:020}/{storage_key}", due_millis(expiry))
}

/// Persistent schedule store using redb.
#[derive(Clone)]
pub struct RedbScheduleStore {
    db: Arc<Database>,
}

impl RedbScheduleStore {
    /// Opens or creates a schedule database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created, or if
    /// the initialization transaction fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create schedule directory: {}", parent.display())
            })?;
        }

        let db = Database::create(path)
            .with_context(|| format!("Failed to open schedule database: {}", path.display()))?;

        let write_txn = db
            .begin_write()
            .context("Failed to begin initialization transaction")?;
        {
            write_txn
                .open_table(ENTRIES_TABLE)
                .context("Failed to initialize schedule table")?;
            write_txn
                .open_table(DUE_TABLE)
                .context("Failed to initialize schedule due index")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initialization transaction")?;

        Ok(Self { db: Arc::new(db) })
    }

    fn put_sync(&self, entry: &ScheduleEntry) -> Result<()> {
        let key = entry.object().storage_key();
        let json = serde_json::to_vec(entry).context("Failed to serialize schedule entry")?;

        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut entries = write_txn
                .open_table(ENTRIES_TABLE)
                .context("Failed to open schedule table")?;
            let mut due = write_txn
                .open_table(DUE_TABLE)
                .context("Failed to open schedule due index")?;

            let previous = entries
                .insert(key.as_str(), json.as_slice())
                .with_context(|| format!("Failed to insert schedule entry '{key}'"))?
                .map(|guard| guard.value().to_vec());
            if let Some(previous) = previous
                && let Ok(old) = serde_json::from_slice::<ScheduleEntry>(&previous)
            {
                due.remove(due_key(old.expiry(), &key).as_str())
                    .context("Failed to remove stale due index entry")?;
            }

            due.insert(due_key(entry.expiry(), &key).as_str(), key.as_str())
                .context("Failed to insert due index entry")?;
        }
        write_txn
            .commit()
            .context("Failed to commit schedule put")?;
        Ok(())
    }

    fn get_sync(&self, key: &str) -> Result<Option<ScheduleEntry>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let entries = read_txn
            .open_table(ENTRIES_TABLE)
            .context("Failed to open schedule table")?;

        entries
            .get(key)
            .with_context(|| format!("Failed to read schedule entry '{key}'"))?
            .map(|guard| {
                serde_json::from_slice(guard.value())
                    .with_context(|| format!("Failed to deserialize schedule entry '{key}'"))
            })
            .transpose()
    }

    fn delete_sync(&self, key: &str) -> Result<bool> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        let removed = {
            let mut entries = write_txn
                .open_table(ENTRIES_TABLE)
                .context("Failed to open schedule table")?;
            let mut due = write_txn
                .open_table(DUE_TABLE)
                .context("Failed to open schedule due index")?;

            let previous = entries
                .remove(key)
                .with_context(|| format!("Failed to remove schedule entry '{key}'"))?
                .map(|guard| guard.value().to_vec());
            match previous {
                Some(previous) => {
                    if let Ok(old) = serde_json::from_slice::<ScheduleEntry>(&previous) {
                        due.remove(due_key(old.expiry(), key).as_str())
                            .context("Failed to remove due index entry")?;
                    }
                    true
                },
                None => false,
            }
        };
        write_txn
            .commit()
            .context("Failed to commit schedule delete")?;
        Ok(removed)
    }

    fn take_expired_sync(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduleEntry>> {
        // Every index key with expiry <= now sorts below this bound
        let upper = format!("{:020}", due_millis(now).saturating_add(1));

        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        let expired = {
            let mut entries = write_txn
                .open_table(ENTRIES_TABLE)
                .context("Failed to open schedule table")?;
            let mut due = write_txn
                .open_table(DUE_TABLE)
                .context("Failed to open schedule due index")?;

            let mut due_keys = Vec::new();
            for item in due
                .range::<&str>(..upper.as_str())
                .context("Failed to scan due index")?
                .take(limit)
            {
                let (index_key, storage_key) = item.context("Failed to read due index entry")?;
                due_keys.push((index_key.value().to_string(), storage_key.value().to_string()));
            }

            let mut expired = Vec::with_capacity(due_keys.len());
            for (index_key, storage_key) in due_keys {
                due.remove(index_key.as_str())
                    .context("Failed to remove due index entry")?;
                let raw = entries
                    .remove(storage_key.as_str())
                    .with_context(|| format!("Failed to remove schedule entry '{storage_key}'"))?
                    .map(|guard| guard.value().to_vec());
                match raw.map(|bytes| serde_json::from_slice::<ScheduleEntry>(&bytes)) {
                    Some(Ok(entry)) => expired.push(entry),
                    Some(Err(e)) => {
                        tracing::warn!(key = %storage_key, error = %e, "Dropping undecodable schedule entry");
                    },
                    None => {},
                }
            }
            expired
        };
        write_txn
            .commit()
            .context("Failed to commit expiry transaction")?;
        Ok(expired)
    }

    fn len_sync(&self) -> Result<usize> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let entries = read_txn
            .open_table(ENTRIES_TABLE)
            .context("Failed to open schedule table")?;
        let len = entries.len().context("Failed to count schedule entries")?;
        Ok(usize::try_from(len).unwrap_or(usize::MAX))
    }
}

#[async_trait]
impl ScheduleStore for RedbScheduleStore {
    async fn put(&self, entry: ScheduleEntry) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.put_sync(&entry))
            .await
            .context("Task join error")?
    }

    async fn get(&self, object: &ObjectRef) -> Result<Option<ScheduleEntry>> {
        let store = self.clone();
        let key = object.storage_key();
        tokio::task::spawn_blocking(move || store.get_sync(&key))
            .await
            .context("Task join error")?
    }

    async fn delete(&self, object: &ObjectRef) -> Result<bool> {
        let store = self.clone();
        let key = object.storage_key();
        tokio::task::spawn_blocking(move || store.delete_sync(&key))
            .await
            .context("Task join error")?
    }

    async fn take_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduleEntry>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.take_expired_sync(now, limit))
            .await
            .context("Task join error")?
    }

    async fn len(&self) -> Result<usize> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.len_sync())
            .await
            .context("Task join error")?
    }
}
