//! Router assembly.
//!
//! `/healthz` reports liveness. Every other path upgrades to a websocket and
//! joins the room named by the path; `/` joins the default room.

pub mod ws;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/", get(ws::handle_default_room))
        .route("/{*room}", get(ws::handle_room))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "rooms": state.room_count().await,
        "clients": state.client_count().await,
    }))
}
