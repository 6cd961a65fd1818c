use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::middleware::metrics_middleware;
use super::{channels, handlers, queue, tickets, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Queue operations
        .route("/enroll", post(queue::enroll))
        .route("/call-next", post(queue::call_next))
        .route("/recall", post(queue::recall))
        .route("/begin-service", post(queue::begin_service))
        .route("/complete", post(queue::complete))
        .route("/skip", post(queue::skip))
        .route("/requeue", post(queue::requeue))
        .route("/cancel", post(queue::cancel))
        // Channels
        .route(
            "/channels",
            get(channels::list_channels).post(channels::register_channel),
        )
        .route("/channels/{id}", get(channels::get_channel))
        .route("/channels/{id}/queue", get(channels::get_queue))
        .route("/channels/{id}/status", put(channels::set_status))
        .route("/channels/{id}/auto-call", put(channels::set_auto_call))
        // Tickets
        .route("/tickets/{id}", get(tickets::get_ticket))
        // Event stream
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
