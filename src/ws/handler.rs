use crate::ws::connection::handle_connection;
use crate::ws::hub::Hub;
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

/// Build the HTTP surface: banner, health check and the subscriber
/// WebSocket endpoint. The dashboard is served elsewhere, so CORS is
/// wide open.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health_check))
        .route("/ws/power", get(ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Handle WebSocket upgrade request for the live power feed
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_connection(socket, hub))
}

/// Service banner
pub async fn banner() -> &'static str {
    "Solar relay is running"
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_shares_hub() {
        let hub = Arc::new(Hub::new());
        let state = AppState::new(Arc::clone(&hub));

        let (_id, _rx) = state.hub.register();
        assert_eq!(hub.connection_count(), 1);
    }
}
