//! Work items delivered to the daemon.

use serde::{Deserialize, Serialize};

use crate::object::ObjectRef;

/// A unit of work. Delivery is at-least-once, so handling must be idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// An object was uploaded; `tag` is the store-supplied integrity tag, if any.
    Deposited {
        object: ObjectRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
    },
    /// The object's schedule entry expired.
    VerificationDue { object: ObjectRef },
    /// The object was deleted from the store.
    Deleted { object: ObjectRef },
}

impl Trigger {
    pub fn object(&self) -> &ObjectRef {
        match self {
            Self::Deposited { object, .. }
            | Self::VerificationDue { object }
            | Self::Deleted { object } => object,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Deposited { .. } => "deposit",
            Self::VerificationDue { .. } => "verify",
            Self::Deleted { .. } => "delete",
        }
    }
}

/// How a trigger was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The state machine advanced (the recorded outcome may still be a failure).
    Processed,
    /// Filtered out before any work was done.
    Ignored(String),
    /// Failed, and re-delivery would not help.
    Dropped(String),
    /// Failed after exhausting re-delivery.
    Failed(String),
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Ignored(_) => "ignored",
            Self::Dropped(_) => "dropped",
            Self::Failed(_) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let trigger = Trigger::Deposited {
            object: ObjectRef::new("bucket", "a/b").unwrap(),
            tag: Some("\"abc\"".to_string()),
        };
        let json = serde_json::to_value(&trigger).unwrap();
        assert_eq!(json["type"], "deposited");
        assert_eq!(json["object"]["container"], "bucket");
        assert_eq!(json["tag"], "\"abc\"");

        let due: Trigger = serde_json::from_value(serde_json::json!({
            "type": "verification_due",
            "object": {"container": "bucket", "key": "a/b"}
        }))
        .unwrap();
        assert_eq!(due.kind(), "verify");
        assert_eq!(due.object().key(), "a/b");
    }
}
