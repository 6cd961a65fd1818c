//! Channel API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use antrian_core::{Channel, ChannelView, NewChannel, OperatingStatus, Ticket};

use super::ApiError;
use crate::state::AppState;

/// Request body for changing a channel's operating status
#[derive(Debug, Deserialize)]
pub struct SetStatusBody {
    pub status: OperatingStatus,
}

/// Request body for toggling auto-call
#[derive(Debug, Deserialize)]
pub struct SetAutoCallBody {
    pub enabled: bool,
}

/// Response for listing channels
#[derive(Debug, Serialize)]
pub struct ListChannelsResponse {
    pub channels: Vec<ChannelView>,
}

/// Response for a channel's queue
#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub channel_id: String,
    pub tickets: Vec<Ticket>,
}

pub async fn list_channels(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListChannelsResponse>, ApiError> {
    let channels = state.engine().list_channels().await?;
    Ok(Json(ListChannelsResponse { channels }))
}

pub async fn register_channel(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewChannel>,
) -> Result<(StatusCode, Json<Channel>), ApiError> {
    let channel = state.engine().register_channel(body).await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

/// Channel view: current ticket, next ticket and counts
pub async fn get_channel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ChannelView>, ApiError> {
    Ok(Json(state.engine().channel_view(&id).await?))
}

/// Waiting tickets in service order, with wait estimates
pub async fn get_queue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<QueueResponse>, ApiError> {
    let tickets = state.engine().queue(&id).await?;
    Ok(Json(QueueResponse {
        channel_id: id,
        tickets,
    }))
}

pub async fn set_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SetStatusBody>,
) -> Result<Json<Channel>, ApiError> {
    Ok(Json(state.engine().set_operating_status(&id, body.status).await?))
}

pub async fn set_auto_call(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SetAutoCallBody>,
) -> Result<Json<Channel>, ApiError> {
    Ok(Json(state.engine().set_auto_call(&id, body.enabled).await?))
}
