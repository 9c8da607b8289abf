//! Axum router construction for the viewer API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /latest` -- latest raw payload as plain text
/// - `GET /ws` -- `WebSocket` payload stream
/// - `GET /api/readings` -- all stored readings
/// - `GET /api/readings/{day}` -- stored readings for one weekday
/// - `GET /api/summary` -- last recorded reading
/// - `GET /api/averages/{day}` -- three-hour block averages
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        .route("/latest", get(handlers::latest))
        // WebSocket
        .route("/ws", get(ws::ws_viewer))
        // REST API
        .route("/api/readings", get(handlers::list_readings))
        .route("/api/readings/{day}", get(handlers::readings_by_day))
        .route("/api/summary", get(handlers::summary))
        .route("/api/averages/{day}", get(handlers::averages))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
