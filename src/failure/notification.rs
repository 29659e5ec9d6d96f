//! Failure notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::object::ObjectRef;

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A ledger record was written with a failed outcome.
    ChecksumFailure,
    /// A trigger could not be processed at all (ledger/schedule I/O, missing record).
    ProcessingFailure,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChecksumFailure => "checksum_failure",
            Self::ProcessingFailure => "processing_failure",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::ChecksumFailure => "Checksum Verification Failure",
            Self::ProcessingFailure => "Checksum Processing Failure",
        }
    }
}

/// One failure report. Consumers must tolerate duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub container: String,
    pub key: String,
    pub date: DateTime<Utc>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        object: &ObjectRef,
        date: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            container: object.container().to_string(),
            key: object.key().to_string(),
            date,
            message: message.into(),
            deployment: None,
        }
    }

    #[must_use]
    pub fn with_deployment(mut self, deployment: Option<String>) -> Self {
        self.deployment = deployment;
        self
    }

    /// e.g. `Checksum Verification Failure: archive/scans/001.tif`
    pub fn subject(&self) -> String {
        let prefix = self
            .deployment
            .as_deref()
            .map(|d| format!("[{d}] "))
            .unwrap_or_default();
        format!("{prefix}{}: {}/{}", self.kind.title(), self.container, self.key)
    }

    /// Plain-text body for human readers.
    pub fn body(&self) -> String {
        let mut body = String::with_capacity(256);
        let _ = writeln!(body, "{}", self.subject());
        let _ = writeln!(body);
        if let Some(deployment) = &self.deployment {
            let _ = writeln!(body, "Deployment: {deployment}");
        }
        let _ = writeln!(body, "Container:  {}", self.container);
        let _ = writeln!(body, "Key:        {}", self.key);
        let _ = writeln!(body, "Date:       {}", self.date.to_rfc3339());
        let _ = writeln!(body, "Message:    {}", self.message);
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn notification() -> Notification {
        Notification::new(
            NotificationKind::ChecksumFailure,
            &ObjectRef::new("archive", "scans/001.tif").unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
            "Checksum mismatch: calculated=aa, stored=bb",
        )
    }

    #[test]
    fn test_subject() {
        let n = notification();
        assert_eq!(n.subject(), "Checksum Verification Failure: archive/scans/001.tif");

        let n = n.with_deployment(Some("prod".to_string()));
        assert_eq!(
            n.subject(),
            "[prod] Checksum Verification Failure: archive/scans/001.tif"
        );
    }

    #[test]
    fn test_body_lists_fields() {
        let body = notification()
            .with_deployment(Some("prod".to_string()))
            .body();
        assert!(body.contains("Deployment: prod"));
        assert!(body.contains("Container:  archive"));
        assert!(body.contains("Key:        scans/001.tif"));
        assert!(body.contains("2024-06-01T08:00:00+00:00"));
        assert!(body.contains("Checksum mismatch: calculated=aa, stored=bb"));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(notification()).unwrap();
        assert_eq!(json["kind"], "checksum_failure");
        assert_eq!(json["container"], "archive");
        assert!(json.get("deployment").is_none());
    }
}
