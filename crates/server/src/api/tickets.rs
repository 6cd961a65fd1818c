//! Ticket API handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use antrian_core::Ticket;

use super::ApiError;
use crate::state::AppState;

/// Get a ticket by ID
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.engine().ticket(&id).await?))
}
