// src/routes/health.rs
//! Liveness endpoint for the conservation monitor.
//!
//! Follows the Explicit Module Boundary Pattern (EMBP): the handler and its
//! response type stay private, the gateway (`mod.rs`) only sees `router()`.
//! The check never touches the database, so it stays green while storage is
//! degraded; evaluation failures show up on `/measurements` instead.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    /// Delivery channel the dispatcher uses (e.g. "webhook", "log").
    notification_channel: String,
}

/// Handle `GET /health`.
async fn health(State((_, dispatcher)): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        notification_channel: dispatcher.channel_name().to_string(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
