//! Schedule entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::object::ObjectRef;

/// A "next due" marker for one object.
///
/// The entry disappears from its store at `expiry`; that disappearance is
/// what triggers re-verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    #[serde(flatten)]
    object: ObjectRef,
    next_checksum_date: DateTime<Utc>,
    expiry: DateTime<Utc>,
}

impl ScheduleEntry {
    /// Creates an entry expiring at its due date.
    pub fn new(object: ObjectRef, next_checksum_date: DateTime<Utc>) -> Self {
        Self {
            object,
            next_checksum_date,
            expiry: next_checksum_date,
        }
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub fn next_checksum_date(&self) -> DateTime<Utc> {
        self.next_checksum_date
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}
