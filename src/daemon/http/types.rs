//! Request and response bodies for the trigger API.

use serde::{Deserialize, Serialize};

use crate::daemon::trigger::Trigger;
use crate::sweep::SweepFilter;

/// Error body returned by every failing route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Triggers waiting in the dispatch queue.
    pub queued: usize,
}

/// POST /v1/deposits
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub container: String,
    pub key: String,
    #[serde(default)]
    pub tag: Option<String>,
}

/// POST /v1/verifications
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub container: String,
    pub key: String,
}

/// Acknowledgement for an enqueued trigger.
#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub id: String,
    pub trigger: Trigger,
}

/// POST /v1/sweeps
#[derive(Debug, Default, Deserialize)]
pub struct SweepRequest {
    #[serde(default)]
    pub filter: SweepFilter,
    #[serde(default)]
    pub page_size: Option<usize>,
}
