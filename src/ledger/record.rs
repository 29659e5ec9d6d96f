//! Per-object checksum state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::object::ObjectRef;

/// Message stored on every successful check.
pub const OK_MESSAGE: &str = "ok";

/// Ledger entry for one object.
///
/// A record is successful exactly when its message is [`OK_MESSAGE`]; the
/// outcome is only changed through [`ChecksumRecord::mark_ok`] and
/// [`ChecksumRecord::mark_failed`] so the two fields cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumRecord {
    #[serde(flatten)]
    object: ObjectRef,
    /// Hex digest of the last computation, empty if it produced no output.
    pub checksum: String,
    pub last_checksum_date: DateTime<Utc>,
    last_checksum_success: bool,
    last_checksum_message: String,
    pub next_checksum_date: DateTime<Utc>,
}

impl ChecksumRecord {
    /// Creates a successful record.
    pub fn new(
        object: ObjectRef,
        checksum: impl Into<String>,
        checked_at: DateTime<Utc>,
        next_due: DateTime<Utc>,
    ) -> Self {
        Self {
            object,
            checksum: checksum.into(),
            last_checksum_date: checked_at,
            last_checksum_success: true,
            last_checksum_message: OK_MESSAGE.to_string(),
            next_checksum_date: next_due,
        }
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub fn container(&self) -> &str {
        self.object.container()
    }

    pub fn key(&self) -> &str {
        self.object.key()
    }

    pub fn is_ok(&self) -> bool {
        self.last_checksum_success
    }

    pub fn message(&self) -> &str {
        &self.last_checksum_message
    }

    pub fn mark_ok(&mut self) {
        self.last_checksum_success = true;
        self.last_checksum_message = OK_MESSAGE.to_string();
    }

    /// Records a failure. An empty message is replaced so it never reads as success.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.last_checksum_success = false;
        self.last_checksum_message = if message.is_empty() || message == OK_MESSAGE {
            format!("failed: {message:?}")
        } else {
            message
        };
    }

    /// Whether the record is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_checksum_date <= now
    }
}
