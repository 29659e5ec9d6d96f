//! Route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

use super::types::{AcceptedResponse, DepositRequest, HealthResponse, SweepRequest, VerifyRequest};
use super::{AppError, SharedState};
use crate::daemon::trigger::Trigger;
use crate::ledger::ChecksumRecord;
use crate::object::ObjectRef;
use crate::sweep::SweepReport;

type Accepted = (StatusCode, Json<AcceptedResponse>);

/// GET /health
pub(crate) async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        queued: state.queue_capacity - state.triggers.capacity(),
    })
}

/// POST /v1/deposits - Enqueue a deposit trigger.
pub(crate) async fn deposit(
    State(state): State<SharedState>,
    Json(req): Json<DepositRequest>,
) -> Result<Accepted, AppError> {
    let object = ObjectRef::new(req.container, req.key)?;
    enqueue(&state, Trigger::Deposited {
        object,
        tag: req.tag,
    })
}

/// POST /v1/verifications - Enqueue a verification trigger.
pub(crate) async fn verify(
    State(state): State<SharedState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Accepted, AppError> {
    let object = ObjectRef::new(req.container, req.key)?;
    enqueue(&state, Trigger::VerificationDue { object })
}

/// DELETE /v1/records/{container}/{*key} - Enqueue a delete trigger.
pub(crate) async fn delete_record(
    State(state): State<SharedState>,
    Path((container, key)): Path<(String, String)>,
) -> Result<Accepted, AppError> {
    let object = ObjectRef::new(container, key)?;
    enqueue(&state, Trigger::Deleted { object })
}

/// GET /v1/records/{container}/{*key} - Read a ledger record.
pub(crate) async fn get_record(
    State(state): State<SharedState>,
    Path((container, key)): Path<(String, String)>,
) -> Result<Json<ChecksumRecord>, AppError> {
    let object = ObjectRef::new(container, key)?;
    let record = state.engine.verifier().ledger().get(&object).await?;
    Ok(Json(record))
}

/// POST /v1/sweeps - Run a sweep to completion and return its report.
pub(crate) async fn sweep(
    State(state): State<SharedState>,
    Json(req): Json<SweepRequest>,
) -> Result<Json<SweepReport>, AppError> {
    let page_size = req.page_size.unwrap_or(state.sweep_page_size);
    if page_size == 0 {
        return Err(AppError::BadRequest("page_size must be positive".to_string()));
    }
    let report = state.engine.sweeper(page_size).run(req.filter).await?;
    Ok(Json(report))
}

fn enqueue(state: &SharedState, trigger: Trigger) -> Result<Accepted, AppError> {
    let id = Uuid::new_v4().to_string();
    debug!(
        id = %id,
        kind = trigger.kind(),
        container = trigger.object().container(),
        key = trigger.object().key(),
        "Enqueueing trigger"
    );

    match state.triggers.try_send(trigger.clone()) {
        Ok(()) => Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { id, trigger }))),
        Err(TrySendError::Full(_)) => Err(AppError::ServiceUnavailable(
            "Trigger queue is full, retry later".to_string(),
        )),
        Err(TrySendError::Closed(_)) => Err(AppError::ServiceUnavailable(
            "Daemon is shutting down".to_string(),
        )),
    }
}
