//! Failure detection and notification.
//!
//! The [`FailureDetector`] watches the ledger's change feed and reports every
//! write that leaves a record failed. Delivery is at-least-once; notifiers
//! and their consumers must be idempotent.

mod detector;
mod notification;
mod notifier;

pub use detector::FailureDetector;
pub use notification::{Notification, NotificationKind};
pub use notifier::{ChannelNotifier, FanoutNotifier, LogNotifier, Notifier, WebhookNotifier};
