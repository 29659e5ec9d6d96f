//! In-memory schedule store.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

use super::entry::ScheduleEntry;
use super::store::ScheduleStore;
use crate::object::ObjectRef;

#[derive(Default)]
struct Inner {
    entries: HashMap<ObjectRef, ScheduleEntry>,
    /// Due index ordered by expiry.
    due: BTreeSet<(DateTime<Utc>, ObjectRef)>,
}

/// Non-persistent schedule store for tests and embedding.
#[derive(Default)]
pub struct MemoryScheduleStore {
    inner: Mutex<Inner>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn put(&self, entry: ScheduleEntry) -> Result<()> {
        let mut inner = self.inner.lock();
        let object = entry.object().clone();
        if let Some(old) = inner.entries.remove(&object) {
            inner.due.remove(&(old.expiry(), object.clone()));
        }
        inner.due.insert((entry.expiry(), object.clone()));
        inner.entries.insert(object, entry);
        Ok(())
    }

    async fn get(&self, object: &ObjectRef) -> Result<Option<ScheduleEntry>> {
        Ok(self.inner.lock().entries.get(object).cloned())
    }

    async fn delete(&self, object: &ObjectRef) -> Result<bool> {
        let mut inner = self.inner.lock();
        match inner.entries.remove(object) {
            Some(old) => {
                inner.due.remove(&(old.expiry(), object.clone()));
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn take_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduleEntry>> {
        let mut inner = self.inner.lock();
        let due: Vec<_> = inner
            .due
            .iter()
            .take_while(|(expiry, _)| *expiry <= now)
            .take(limit)
            .cloned()
            .collect();

        let mut expired = Vec::with_capacity(due.len());
        for key in due {
            inner.due.remove(&key);
            if let Some(entry) = inner.entries.remove(&key.1) {
                expired.push(entry);
            }
        }
        Ok(expired)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.inner.lock().entries.len())
    }
}
