//! HTTP trigger API.
//!
//! Deposit, verification and delete requests are only enqueued here; the
//! [`Dispatcher`](super::dispatcher::Dispatcher) does the work. Record lookups
//! and sweeps run inline.

mod routes;
pub mod types;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::sync::mpsc;

use super::trigger::Trigger;
use crate::engine::Engine;
use crate::error::Error;
use types::ErrorResponse;

/// State shared by all handlers.
pub struct AppState {
    pub(crate) engine: Engine,
    pub(crate) triggers: mpsc::Sender<Trigger>,
    pub(crate) queue_capacity: usize,
    pub(crate) sweep_page_size: usize,
    pub(crate) started_at: Instant,
}

impl AppState {
    pub fn new(engine: Engine, triggers: mpsc::Sender<Trigger>, sweep_page_size: usize) -> Self {
        Self {
            queue_capacity: triggers.max_capacity(),
            engine,
            triggers,
            sweep_page_size,
            started_at: Instant::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Builds the router for the trigger API.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/v1/deposits", post(routes::deposit))
        .route("/v1/verifications", post(routes::verify))
        .route(
            "/v1/records/{container}/{*key}",
            get(routes::get_record).delete(routes::delete_record),
        )
        .route("/v1/sweeps", post(routes::sweep))
        .with_state(state)
}

/// Application error type for HTTP responses.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            },
        };

        let body = Json(ErrorResponse {
            error: message,
            status: status.as_u16(),
        });
        (status, body).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidObject(_) | Error::Config(_) => Self::BadRequest(err.to_string()),
            Error::RecordNotFound { .. } | Error::NotFound { .. } => {
                Self::NotFound(err.to_string())
            },
            Error::StorageIo { .. } => Self::ServiceUnavailable(err.to_string()),
            _ => Self::Internal(err.to_string()),
        }
    }
}
