//! Delayed-delivery contract for schedule entries.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::entry::ScheduleEntry;
use crate::object::ObjectRef;

/// A store of expiring schedule entries.
///
/// There is at most one entry per object; `put` replaces it. Expiry is
/// delivered by [`ScheduleStore::take_expired`], which removes and returns
/// the entries whose expiry has passed so each one is handed out once.
///
/// A timer wheel, a managed TTL table or a broker with delayed delivery can
/// all satisfy this trait.
#[async_trait]
pub trait ScheduleStore: Send + Sync + 'static {
    /// Creates or overwrites the entry for the entry's object.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn put(&self, entry: ScheduleEntry) -> Result<()>;

    /// Returns the pending entry for `object`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn get(&self, object: &ObjectRef) -> Result<Option<ScheduleEntry>>;

    /// Removes the pending entry for `object`.
    ///
    /// Returns `Ok(true)` if an entry was removed. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn delete(&self, object: &ObjectRef) -> Result<bool>;

    /// Removes and returns up to `limit` entries with `expiry <= now`,
    /// earliest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn take_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduleEntry>>;

    /// Number of pending entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn len(&self) -> Result<usize>;
}
