//! Queue operation handlers.
//!
//! Each handler is a thin wrapper around one engine operation; all
//! precondition checks and error kinds come from the engine.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use std::sync::Arc;

use antrian_core::{EnrollRequest, Ticket};

use super::ApiError;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

/// Request body for calling the next patient
#[derive(Debug, Deserialize)]
pub struct CallNextBody {
    pub channel_id: String,
}

/// Request body for operations on a single ticket
#[derive(Debug, Deserialize)]
pub struct TicketBody {
    pub ticket_id: String,
}

/// Request body for cancelling a ticket
#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub ticket_id: String,
    /// Optional reason, recorded in the log
    pub reason: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Enroll a patient on a channel
pub async fn enroll(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<Ticket>), ApiError> {
    let ticket = state.engine().enroll(body).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// Call the highest-priority waiting ticket
pub async fn call_next(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CallNextBody>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.engine().call_next(&body.channel_id).await?))
}

pub async fn recall(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TicketBody>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.engine().recall(&body.ticket_id).await?))
}

pub async fn begin_service(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TicketBody>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.engine().begin_service(&body.ticket_id).await?))
}

pub async fn complete(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TicketBody>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.engine().complete(&body.ticket_id).await?))
}

pub async fn skip(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TicketBody>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.engine().skip(&body.ticket_id).await?))
}

/// Put a parked ticket back into the waiting set
pub async fn requeue(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TicketBody>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.engine().requeue(&body.ticket_id).await?))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CancelBody>,
) -> Result<Json<Ticket>, ApiError> {
    let ticket = state
        .engine()
        .cancel(&body.ticket_id, body.reason.as_deref())
        .await?;
    Ok(Json(ticket))
}
