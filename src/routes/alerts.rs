use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use super::AppState;
use crate::engine::Dismissal;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/alerts", get(list_active))
        .route("/alerts/{id}", get(get_alert))
        .route("/alerts/{id}/dismiss", post(dismiss))
}

#[derive(Serialize)]
struct DismissResponse {
    dismissed: bool,
}

/// Active alerts grouped by artifact id.
async fn list_active(State((engine, _)): State<AppState>) -> impl IntoResponse {
    // ---
    match engine.active_alerts().await {
        Ok(grouped) => (StatusCode::OK, Json(grouped)).into_response(),
        Err(e) => {
            error!("Failed to list active alerts: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json("Failed to list alerts")).into_response()
        }
    }
}

async fn get_alert(Path(id): Path<Uuid>, State((engine, _)): State<AppState>) -> impl IntoResponse {
    // ---
    match engine.alert(id).await {
        Ok(Some(alert)) => (StatusCode::OK, Json(alert)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json("Alert not found")).into_response(),
        Err(e) => {
            error!("Failed to load alert {}: {}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json("Failed to load alert")).into_response()
        }
    }
}

/// Dismiss an alert. Dismissing twice answers `{"dismissed": false}`.
async fn dismiss(Path(id): Path<Uuid>, State((engine, _)): State<AppState>) -> impl IntoResponse {
    // ---
    match engine.dismiss(id).await {
        Ok(Dismissal::NotFound) => {
            (StatusCode::NOT_FOUND, Json("Alert not found")).into_response()
        }
        Ok(outcome) => {
            let dismissed = outcome.is_dismissed();
            info!("POST /alerts/{}/dismiss - dismissed={}", id, dismissed);
            (StatusCode::OK, Json(DismissResponse { dismissed })).into_response()
        }
        Err(e) => {
            error!("Failed to dismiss alert {}: {}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json("Failed to dismiss alert")).into_response()
        }
    }
}
